//! Batch status over the HTTP API, for pollers running outside the server

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::trace;

use super::ApiResponse;
use crate::disbursement::BatchStatusSource;
use crate::error::{ErrorKind, PayoutError, PayoutResult};
use crate::model::{BatchId, BatchStatusView, BatchSummary, CycleId};

pub struct HttpStatusClient {
    client: Client,
    base_url: String,
}

impl HttpStatusClient {
    pub fn new(base_url: &str, timeout: Duration) -> PayoutResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PayoutError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> PayoutResult<ApiResponse<T>> {
        let url = format!("{}/api/v1{}", self.base_url, path);
        trace!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PayoutError::StatusUnavailable(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        response.json().await.map_err(|e| {
            PayoutError::StatusUnavailable(format!(
                "unreadable response from {} ({}): {}",
                url, status, e
            ))
        })
    }

    async fn get_batch<T: DeserializeOwned>(&self, batch_id: &BatchId, path: &str) -> PayoutResult<T> {
        let body = self.get::<T>(path).await?;
        match (body.data, body.error) {
            (_, Some(error)) if error.kind == ErrorKind::BatchNotFound => {
                Err(PayoutError::BatchNotFound(batch_id.clone()))
            }
            (_, Some(error)) => Err(PayoutError::StatusUnavailable(error.message)),
            (Some(data), None) => Ok(data),
            (None, None) => Err(PayoutError::StatusUnavailable(format!(
                "empty response for {}",
                path
            ))),
        }
    }

    async fn get_cycle_batch(&self, path: &str) -> PayoutResult<Option<BatchStatusView>> {
        let body = self.get::<Option<BatchStatusView>>(path).await?;
        match body.error {
            Some(error) if error.kind == ErrorKind::InvalidCycle => {
                Err(PayoutError::InvalidCycle(error.message))
            }
            Some(error) => Err(PayoutError::StatusUnavailable(error.message)),
            None => Ok(body.data.flatten()),
        }
    }
}

#[async_trait]
impl BatchStatusSource for HttpStatusClient {
    async fn active_batch(&self, cycle_id: &CycleId) -> PayoutResult<Option<BatchStatusView>> {
        self.get_cycle_batch(&format!("/cycles/{}/batches/active", cycle_id))
            .await
    }

    async fn latest_batch(&self, cycle_id: &CycleId) -> PayoutResult<Option<BatchStatusView>> {
        self.get_cycle_batch(&format!("/cycles/{}/batches/latest", cycle_id))
            .await
    }

    async fn batch_status(&self, batch_id: &BatchId) -> PayoutResult<BatchStatusView> {
        self.get_batch(batch_id, &format!("/batches/{}", batch_id))
            .await
    }

    async fn batch_summary(&self, batch_id: &BatchId) -> PayoutResult<BatchSummary> {
        self.get_batch(batch_id, &format!("/batches/{}/summary", batch_id))
            .await
    }
}
