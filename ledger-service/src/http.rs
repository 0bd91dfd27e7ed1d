//! HTTP surface of the ledger.
//!
//! - `GET /api/plazas`: full snapshot, never cacheable
//! - `POST /api/plazas`: partial upsert keyed by `id_plaza`
//! - `GET /healthz`
//!
//! The write endpoint is the store boundary. It validates the payload shape
//! and merges exactly what it is given; occupancy transitions happen on the
//! caller side.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_core::errors::LedgerError;
use parking_core::{LedgerStore, SpotPatch, registry};
use serde::{Deserialize, Serialize};

pub const SPOTS_PATH: &str = "/api/plazas";
pub const HEALTH_PATH: &str = "/healthz";

/// Snapshot responses must never be served from a cache.
pub const NO_STORE: &str = "no-store, no-cache, must-revalidate";

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn LedgerStore>,
    enforce_registry: bool,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, enforce_registry: bool) -> Self {
        Self {
            store,
            enforce_registry,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire bodies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessBody {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthBody {
    pub status: String,
    pub version: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum HttpApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl From<LedgerError> for HttpApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation { message } => Self::BadRequest(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl HttpApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
        response
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(SPOTS_PATH, get(list_spots).post(upsert_spot))
        .route(HEALTH_PATH, get(healthz))
        .with_state(state)
}

async fn list_spots(State(state): State<AppState>) -> Result<Response, HttpApiError> {
    let records = state.store.get_all().await.map_err(|err| {
        tracing::error!(
            error = %err,
            category = err.category().as_str(),
            "snapshot read failed"
        );
        HttpApiError::from(err)
    })?;

    Ok((
        [(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE))],
        Json(records),
    )
        .into_response())
}

async fn upsert_spot(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SuccessBody>, HttpApiError> {
    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "rejected malformed upsert body");
        HttpApiError::BadRequest(format!("malformed JSON body: {e}"))
    })?;

    let patch = SpotPatch::from_wire(payload).map_err(|err| {
        tracing::warn!(error = %err, "rejected upsert payload");
        HttpApiError::from(err)
    })?;

    if state.enforce_registry && !registry::is_registered(patch.id.as_str()) {
        tracing::warn!(spot = %patch.id, "rejected upsert for unregistered spot");
        return Err(HttpApiError::BadRequest(format!(
            "unknown spot identifier: {}",
            patch.id
        )));
    }

    state.store.upsert(&patch).await.map_err(|err| {
        tracing::error!(
            spot = %patch.id,
            error = %err,
            category = err.category().as_str(),
            "upsert failed"
        );
        HttpApiError::from(err)
    })?;

    tracing::debug!(spot = %patch.id, "upserted spot");
    Ok(Json(SuccessBody { success: true }))
}

async fn healthz() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        version: parking_core::VERSION.to_string(),
    })
}
