//! HTTP request handlers for the Locations Transformer.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{Entity, IdRecord};
use crate::error::{FetcherError, Result};
use crate::state::AppState;
use crate::store::{Links, LoadStatus};

/// Body of the reload trigger and cancel responses.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One entry of the health report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub ok: bool,
    pub business_impact: String,
    pub technical_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_output: Option<String>,
}

/// Health report.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub name: String,
    pub ok: bool,
    pub status: LoadStatus,
    pub generation: u64,
    pub entities: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub checks: Vec<HealthCheck>,
}

/// Build information.
#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// GET /transformers/locations
///
/// Lists a link for every published location. 404 until something is published.
pub async fn get_locations(State(state): State<Arc<AppState>>) -> Result<Json<Links>> {
    let links = state
        .store
        .get_all()
        .ok_or_else(|| FetcherError::NotFound("No locations loaded".to_string()))?;

    tracing::debug!(count = links.len(), "Returning location links");
    Ok(Json(links))
}

/// GET /transformers/locations/{uuid}
pub async fn get_location_by_uuid(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
) -> Result<Json<Entity>> {
    let not_found = || FetcherError::NotFound(format!("Location {uuid} not found"));

    let id = Uuid::parse_str(&uuid).map_err(|_| not_found())?;
    let entity = state.store.get_by_id(&id).ok_or_else(not_found)?;

    Ok(Json(entity))
}

/// GET /transformers/locations/__count
pub async fn get_count(State(state): State<Arc<AppState>>) -> String {
    state.store.count().to_string()
}

/// GET /transformers/locations/__ids
///
/// One `{"id": "<uuid>"}` object per line, empty body when nothing is loaded.
pub async fn get_ids(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let mut body = String::new();
    for id in state.store.ids() {
        let line = serde_json::to_string(&IdRecord { id })?;
        let _ = writeln!(body, "{line}");
    }

    Ok(([(header::CONTENT_TYPE, "text/plain")], body))
}

/// POST /transformers/locations/__reload
///
/// Starts a background reload and answers before it completes.
pub async fn trigger_reload(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let ticket = state.store.begin_reload()?;

    tokio::spawn(async move {
        // Outcome is logged and counted by the reload itself.
        let _ = ticket.run().await;
    });

    tracing::info!("Reload triggered");
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Reloading locations")),
    ))
}

/// DELETE /transformers/locations/__reload
pub async fn cancel_reload(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    state.store.cancel_reload()?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Reload cancellation requested")),
    ))
}

/// GET /__health
///
/// 503 while the most recent reload has failed.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = &state.store;
    let status = store.status();
    let snapshot = store.snapshot();
    let ok = status != LoadStatus::Failed;

    let check = HealthCheck {
        name: "TME authority file".to_string(),
        ok,
        business_impact: "Location data may be stale or unavailable".to_string(),
        technical_summary: format!(
            "Loads {} terms from {}",
            state.config.taxonomy, state.config.tme_base_url
        ),
        check_output: store.last_error(),
    };

    if !ok {
        tracing::warn!(error = ?check.check_output, "Health check failing");
    }

    let response = HealthResponse {
        name: "locations-transformer".to_string(),
        ok,
        status,
        generation: snapshot.as_ref().map_or(0, |s| s.generation()),
        entities: snapshot.as_ref().map_or(0, |s| s.len()),
        skipped: snapshot.as_ref().map_or(0, |s| s.skipped()),
        published_at: snapshot.as_ref().map(|s| s.published_at()),
        checks: vec![check],
    };

    let code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

/// GET /__gtg
pub async fn gtg(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.store.count() > 0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "No locations loaded")
    }
}

/// GET /__ping
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /__build-info
pub async fn build_info() -> Json<BuildInfo> {
    Json(BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /metrics
///
/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "Metrics recorder not installed".to_string(),
        ),
    }
}
