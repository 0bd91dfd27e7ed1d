//! HTTP client for the ledger service.
//!
//! Implements [`LedgerStore`] against `GET`/`POST /api/plazas`, so a
//! [`SyncController`](parking_core::SyncController) can sit on top of a
//! remote service. Transport failures, timeouts and 5xx answers are
//! `StoreUnavailable` (retryable); a 400 answer is a `Validation` error.

use std::time::Duration;

use async_trait::async_trait;
use parking_core::config::ClientConfig;
use parking_core::errors::{LedgerError, Result};
use parking_core::{LedgerStore, SpotPatch, SpotRecord};
use reqwest::StatusCode;
use reqwest::header::CACHE_CONTROL;

use crate::http::{ErrorBody, SPOTS_PATH};

#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    http: reqwest::Client,
    spots_url: String,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::config_with_source("failed to build HTTP client", e))?;
        Ok(Self {
            http,
            spots_url: format!("{}{SPOTS_PATH}", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn spots_url(&self) -> &str {
        &self.spots_url
    }
}

/// Turn a non-success answer into a ledger error, preferring the server's
/// `{"error": ..}` message.
async fn error_from_response(resp: reqwest::Response, action: &str) -> LedgerError {
    let status = resp.status();
    let message = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
    };

    if status == StatusCode::BAD_REQUEST {
        LedgerError::validation(message)
    } else {
        LedgerError::store_unavailable(format!("{action} failed with HTTP {status}: {message}"))
    }
}

#[async_trait]
impl LedgerStore for HttpLedgerClient {
    async fn get_all(&self) -> Result<Vec<SpotRecord>> {
        let resp = self
            .http
            .get(&self.spots_url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| LedgerError::store_unavailable_with_source("snapshot request failed", e))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "snapshot").await);
        }

        resp.json::<Vec<SpotRecord>>().await.map_err(|e| {
            LedgerError::store_unavailable_with_source("snapshot response was not a record list", e)
        })
    }

    async fn upsert(&self, patch: &SpotPatch) -> Result<()> {
        let resp = self
            .http
            .post(&self.spots_url)
            .json(patch)
            .send()
            .await
            .map_err(|e| LedgerError::store_unavailable_with_source("upsert request failed", e))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "upsert").await);
        }

        tracing::debug!(spot = %patch.id, "upsert acknowledged");
        Ok(())
    }
}
