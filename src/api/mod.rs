//! JSON HTTP surface under `/api/v1`
//!
//! Mutating calls name their caller in the `x-actor-id` header; the value is
//! written to the selection audit trail and batch records. Errors are answered
//! with the status from [`PayoutError::http_status`] and the error body in
//! the `error` field of [`ApiResponse`].

pub mod client;
mod handlers;

pub use client::HttpStatusClient;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::app::PayoutEngine;
use crate::error::{ErrorBody, PayoutError};

pub const ACTOR_HEADER: &str = "x-actor-id";

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(body: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(body),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

/// A [`PayoutError`] on its way to the wire
#[derive(Debug)]
pub struct ApiError(PayoutError);

impl From<PayoutError> for ApiError {
    fn from(err: PayoutError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        debug!("Request failed with {}: {}", status, self.0);

        let retry_after = match &self.0 {
            PayoutError::RateLimited { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };
        let mut response =
            (status, Json(ApiResponse::<()>::error(self.0.to_body()))).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Caller identity from the `x-actor-id` header
#[derive(Debug, Clone)]
pub struct Actor(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|actor| !actor.is_empty())
            .map(|actor| Actor(actor.to_string()))
            .ok_or_else(|| {
                ApiError(PayoutError::InvalidRequest(format!(
                    "missing {} header",
                    ACTOR_HEADER
                )))
            })
    }
}

/// JSON request body; a body that does not parse is answered like any other
/// [`PayoutError`], as `InvalidRequest` with an error body
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(rejected_body(rejection))),
        }
    }
}

fn rejected_body(rejection: JsonRejection) -> PayoutError {
    debug!("Rejected request body ({}): {}", rejection.status(), rejection.body_text());
    PayoutError::InvalidRequest(rejection.body_text())
}

/// Build the API router over `engine`
pub fn router(engine: PayoutEngine) -> Router {
    use handlers::*;

    Router::new()
        .route("/api/v1/health", get(health_check))
        .route("/api/v1/cycles", get(list_cycles).post(create_cycle))
        .route("/api/v1/cycles/active", get(active_cycle))
        .route("/api/v1/cycles/{id}", get(get_cycle))
        .route("/api/v1/cycles/{id}/activate", post(activate_cycle))
        .route("/api/v1/cycles/{id}/roster", put(import_roster))
        .route("/api/v1/cycles/{id}/reward-pool", get(reward_pool))
        .route(
            "/api/v1/cycles/{id}/selection",
            get(get_selection).delete(clear_selection),
        )
        .route("/api/v1/cycles/{id}/selection/run", post(run_selection))
        .route("/api/v1/cycles/{id}/selection/save", post(save_selection))
        .route("/api/v1/cycles/{id}/selection/seal", post(seal_selection))
        .route("/api/v1/cycles/{id}/selection/unseal", post(unseal_selection))
        .route(
            "/api/v1/cycles/{id}/selection/tiers/{tier}",
            put(update_tier_settings),
        )
        .route(
            "/api/v1/cycles/{id}/selection/winners/{winner_id}",
            axum::routing::delete(remove_winner),
        )
        .route(
            "/api/v1/cycles/{id}/selection/winners/{winner_id}/override",
            put(update_override),
        )
        .route("/api/v1/cycles/{id}/eligible-count", get(eligible_count))
        .route(
            "/api/v1/cycles/{id}/batches",
            get(list_batches).post(create_batch),
        )
        .route("/api/v1/cycles/{id}/batches/active", get(active_batch))
        .route("/api/v1/cycles/{id}/batches/latest", get(latest_batch))
        .route("/api/v1/batches/{id}", get(batch_status))
        .route("/api/v1/batches/{id}/summary", get(batch_summary))
        .route("/api/v1/batches/{id}/retry", post(retry_failed))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(engine: PayoutEngine, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Serving API on {}", listener.local_addr()?);
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
