//! Error types for the Locations Transformer.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for the transformer.
pub type Result<T> = std::result::Result<T, FetcherError>;

/// Errors that can occur while loading, caching or serving locations.
#[derive(Error, Debug)]
pub enum FetcherError {
    /// The upstream authority-file service could not be reached.
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(#[from] reqwest::Error),

    /// The upstream answered a page request with a non-2xx status.
    #[error("Upstream returned status {status}")]
    UpstreamBadStatus { status: u16 },

    /// A whole upstream page could not be decoded.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A single record was unusable and has been left out of the snapshot.
    #[error("Record skipped: {reason}")]
    RecordSkipped { reason: String },

    /// Lookup miss in the published snapshot.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Another reload currently holds the reload slot.
    #[error("A reload is already in progress")]
    ReloadAlreadyInProgress,

    /// No reload has ever been started on this store.
    #[error("Store has not been initialised yet")]
    NotYetInitialized,

    /// The in-flight reload was cancelled before it could publish.
    #[error("Reload cancelled")]
    ReloadCancelled,

    /// Cancellation was requested while nothing was loading.
    #[error("No reload in progress")]
    NoReloadInProgress,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Server startup error.
    #[error("Server error: {0}")]
    Server(String),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FetcherError {
    /// Whether this error came from talking to the upstream service.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnreachable(_) | Self::UpstreamBadStatus { .. } | Self::MalformedPayload(_)
        )
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::UpstreamBadStatus { .. } => "upstream_bad_status",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::RecordSkipped { .. } => "record_skipped",
            Self::NotFound(_) => "not_found",
            Self::ReloadAlreadyInProgress => "reload_in_progress",
            Self::NotYetInitialized => "not_initialized",
            Self::ReloadCancelled => "cancelled",
            Self::NoReloadInProgress => "no_reload",
            Self::Configuration(_) => "configuration",
            Self::Server(_) => "server",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

/// Error response body for HTTP endpoints.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for FetcherError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::UpstreamUnreachable(e) => {
                tracing::error!(error = %e, "Upstream unreachable");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_UNREACHABLE",
                    "The upstream service could not be reached".to_string(),
                    None,
                )
            }
            Self::UpstreamBadStatus { status } => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_BAD_STATUS",
                self.to_string(),
                Some(status.to_string()),
            ),
            Self::MalformedPayload(msg) => (
                StatusCode::BAD_GATEWAY,
                "MALFORMED_PAYLOAD",
                "The upstream payload could not be decoded".to_string(),
                Some(msg.clone()),
            ),
            Self::RecordSkipped { reason } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "RECORD_SKIPPED",
                reason.clone(),
                None,
            ),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, "NOT_FOUND", what.clone(), None),
            Self::ReloadAlreadyInProgress => (
                StatusCode::CONFLICT,
                "RELOAD_IN_PROGRESS",
                "Currently loading data".to_string(),
                None,
            ),
            Self::NotYetInitialized => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NOT_INITIALIZED",
                "Service unavailable".to_string(),
                None,
            ),
            Self::ReloadCancelled => (
                StatusCode::CONFLICT,
                "RELOAD_CANCELLED",
                self.to_string(),
                None,
            ),
            Self::NoReloadInProgress => (
                StatusCode::NOT_FOUND,
                "NO_RELOAD_IN_PROGRESS",
                self.to_string(),
                None,
            ),
            Self::Configuration(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                msg.clone(),
                None,
            ),
            Self::Server(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERVER_ERROR",
                msg.clone(),
                None,
            ),
            Self::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SERIALIZATION_ERROR",
                    "Failed to serialize response".to_string(),
                    Some(e.to_string()),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(message = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
