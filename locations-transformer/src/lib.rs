//! # Locations Transformer
//!
//! Loads location terms from the TME authority-file service, turns each one into a
//! canonical entity with a stable UUID, and serves the whole set from memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  TME (GL terms) │────►│  RecordSource   │────►│ SnapshotBuilder │
//! └─────────────────┘     │  sliced paging  │     │  + Transformer  │
//!                         └─────────────────┘     └────────┬────────┘
//!                                                          │ publish
//!                         ┌─────────────────┐     ┌────────▼────────┐
//!              HTTP ◄─────│  axum handlers  │◄────│   CacheStore    │
//!                         └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Endpoints
//!
//! - `GET /transformers/locations` - Links to every location
//! - `GET /transformers/locations/{uuid}` - One location
//! - `GET /transformers/locations/__count` - Number of locations, plain text
//! - `GET /transformers/locations/__ids` - Newline-delimited `{"id": ...}` objects
//! - `POST /transformers/locations/__reload` - Start a background reload
//! - `DELETE /transformers/locations/__reload` - Cancel the running reload
//! - `GET /__health`, `GET /__gtg`, `GET /__ping`, `GET /__build-info`, `GET /metrics`
//!
//! ## Reloads
//!
//! A reload re-fetches everything and swaps the new snapshot in atomically. Reads keep
//! serving the previous snapshot while a reload runs and after one fails.

pub mod entities;
pub mod error;
pub mod handlers;
pub mod record;
pub mod routes;
pub mod server;
pub mod snapshot;
pub mod source;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod transform;

pub use error::FetcherError;
pub use server::TransformerServer;
pub use state::{AppState, FetcherConfig};
pub use store::{CacheStore, LoadStatus};
