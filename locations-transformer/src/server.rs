//! Server setup and lifecycle for the Locations Transformer.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use crate::error::{FetcherError, Result};
use crate::routes::create_router;
use crate::state::{AppState, FetcherConfig};

/// The Locations Transformer server.
pub struct TransformerServer {
    state: Arc<AppState>,
    initial_load: Option<JoinHandle<()>>,
}

impl TransformerServer {
    /// Creates a new server instance with the given configuration.
    ///
    /// Installs the global Prometheus recorder.
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            FetcherError::Configuration(format!("Failed to install metrics recorder: {e}"))
        })?;

        let state = AppState::new(config)?.with_metrics(handle);
        Ok(Self::with_state(Arc::new(state)))
    }

    /// Creates a server instance from an existing `AppState`.
    pub fn with_state(state: Arc<AppState>) -> Self {
        Self {
            state,
            initial_load: None,
        }
    }

    /// Spawns the first load in the background.
    pub fn start_initial_load(&mut self) {
        let store = Arc::clone(&self.state.store);
        let handle = tokio::spawn(async move {
            if let Err(e) = store.reload().await {
                tracing::warn!(error = %e, "Initial load did not complete");
            }
        });

        self.initial_load = Some(handle);
        tracing::info!("Initial load started");
    }

    /// Runs the HTTP server.
    ///
    /// This method blocks until the server is shut down (e.g., via Ctrl+C).
    pub async fn run(mut self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.state.config.host, self.state.config.port)
            .parse()
            .map_err(|e| FetcherError::Configuration(format!("Invalid address: {e}")))?;

        let router = create_router(self.state.clone());

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| FetcherError::Server(format!("Failed to bind to {addr}: {e}")))?;

        self.start_initial_load();

        tracing::info!(
            %addr,
            taxonomy = %self.state.config.taxonomy,
            slices = self.state.config.slices,
            max_records = self.state.config.max_records,
            "Locations Transformer starting"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| FetcherError::Server(format!("Server error: {e}")))?;

        // Stop any reload still running.
        let _ = self.state.store.cancel_reload();
        if let Some(handle) = self.initial_load.take() {
            handle.abort();
        }

        tracing::info!("Locations Transformer stopped");
        Ok(())
    }

    /// Returns a reference to the application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

/// Signal handler for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        () = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

/// Entry point for running the server from configuration.
pub async fn run_server(config: FetcherConfig) -> Result<()> {
    let server = TransformerServer::new(config)?;
    server.run().await
}

/// Entry point for running the server from environment variables.
///
/// `LOG_FORMAT=json` switches to JSON log lines.
pub async fn run_from_env() -> Result<()> {
    init_tracing(std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")));

    let config = FetcherConfig::from_env()?;
    run_server(config).await
}

fn init_tracing(json: bool) {
    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// `RUST_LOG` directives when present and valid, otherwise `info`.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
