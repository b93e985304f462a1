//! Disbursement provider speaking JSON over HTTP
//!
//! `POST {base_url}/v1/payouts` carries the pending items of one chunk. The
//! provider answers with one entry per item, keyed by idempotency key; an
//! item it has seen before is answered with its original outcome. The
//! request-level key covers the exact set of item keys, so a retry of a
//! smaller remainder is never answered with the cached reply of the full call.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChunkSubmission, DisbursementProvider, ItemReceipt, ProviderError};
use crate::error::{PayoutError, PayoutResult};
use crate::model::ItemOutcome;

#[derive(Debug, Serialize)]
struct PayoutRequest<'a> {
    sender_batch_id: String,
    currency: &'a str,
    items: Vec<PayoutRequestItem<'a>>,
}

#[derive(Debug, Serialize)]
struct PayoutRequestItem<'a> {
    idempotency_key: &'a str,
    receiver: &'a str,
    amount: i64,
    note: String,
}

#[derive(Debug, Deserialize)]
struct PayoutResponse {
    items: Vec<PayoutResponseItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Deserialize)]
struct PayoutResponseItem {
    idempotency_key: String,
    status: ResponseStatus,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP adapter for the payment processor
pub struct HttpDisbursementProvider {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpDisbursementProvider {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> PayoutResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PayoutError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Transient(format!("request timed out: {}", err))
    } else if err.is_connect() {
        ProviderError::Unavailable(format!("connection failed: {}", err))
    } else {
        ProviderError::Transient(err.to_string())
    }
}

/// Request key over the sorted item keys of a submission
fn request_key(submission: &ChunkSubmission) -> String {
    let mut keys: Vec<&str> = submission
        .items
        .iter()
        .map(|item| item.idempotency_key.as_str())
        .collect();
    keys.sort_unstable();

    let mut hasher = Sha256::new();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());
    format!(
        "{}:{}:{}",
        submission.batch_id,
        submission.chunk_index,
        &digest[..16]
    )
}

/// A success without a reference is no receipt; the worker retries the item
fn into_receipt(item: PayoutResponseItem) -> Option<ItemReceipt> {
    let outcome = match item.status {
        ResponseStatus::Success => match item.reference.filter(|r| !r.trim().is_empty()) {
            Some(reference) => ItemOutcome::Success { reference },
            None => {
                warn!(
                    "Provider reported success without a reference for {}",
                    item.idempotency_key
                );
                return None;
            }
        },
        ResponseStatus::Failed => ItemOutcome::Failed {
            error: item
                .error
                .unwrap_or_else(|| "rejected by provider".to_string()),
        },
    };
    Some(ItemReceipt {
        idempotency_key: item.idempotency_key,
        outcome,
    })
}

fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl DisbursementProvider for HttpDisbursementProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::Unavailable(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }

    async fn submit(&self, submission: &ChunkSubmission) -> Result<Vec<ItemReceipt>, ProviderError> {
        let key = request_key(submission);
        let body = PayoutRequest {
            sender_batch_id: key.replace(':', "-"),
            currency: &submission.currency,
            items: submission
                .items
                .iter()
                .map(|item| PayoutRequestItem {
                    idempotency_key: &item.idempotency_key,
                    receiver: &item.destination,
                    amount: item.amount,
                    note: format!("Reward payout for {}", item.user_id),
                })
                .collect(),
        };

        debug!(
            "Submitting chunk {} of batch {} ({} items)",
            submission.chunk_index,
            submission.batch_id,
            submission.items.len()
        );
        let url = format!("{}/v1/payouts", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .header("Idempotency-Key", &key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let parsed: PayoutResponse = response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Transient(format!("Failed to parse response: {}", e)))?;
                Ok(parsed.items.into_iter().filter_map(into_receipt).collect())
            }
            StatusCode::TOO_MANY_REQUESTS => Err(ProviderError::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            }),
            StatusCode::SERVICE_UNAVAILABLE => Err(ProviderError::Unavailable(
                response.text().await.unwrap_or_default(),
            )),
            status if status.is_server_error() => {
                let error_text = response.text().await.unwrap_or_default();
                Err(ProviderError::Transient(format!(
                    "provider error {}: {}",
                    status, error_text
                )))
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(ProviderError::Rejected(format!(
                    "provider error {}: {}",
                    status, error_text
                )))
            }
        }
    }
}
