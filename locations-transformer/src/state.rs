//! Configuration and application state for the Locations Transformer.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::error::{FetcherError, Result};
use crate::snapshot::SnapshotBuilder;
use crate::source::{FetchPlan, RecordSource, TmeClient};
use crate::store::CacheStore;
use crate::transform::LocationTransformer;

/// Configuration for the Locations Transformer server.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// TME base URL, without the authority-file path.
    pub tme_base_url: String,
    /// TME basic-auth user name.
    pub tme_username: String,
    /// TME basic-auth password.
    pub tme_password: String,
    /// Sent as `X-Coco-Auth` when set.
    pub token: Option<String>,
    /// Prefix of every `apiUrl` link.
    pub base_url: String,
    /// Host to bind the server to.
    pub host: String,
    /// Port to bind the server to.
    pub port: u16,
    /// Records requested per parallel round.
    pub max_records: usize,
    /// Number of parallel slice workers.
    pub slices: usize,
    /// Taxonomy namespace, e.g. `GL` for locations.
    pub taxonomy: String,
    /// Per-request transport timeout.
    pub request_timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            tme_base_url: "https://tme.ft.com".to_string(),
            tme_username: String::new(),
            tme_password: String::new(),
            token: None,
            base_url: "http://localhost:8080/transformers/locations/".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_records: 10000,
            slices: 10,
            taxonomy: "GL".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl FetcherConfig {
    /// Creates a new configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Self::builder()
            .tme_base_url(env_or("TME_BASE_URL", &defaults.tme_base_url))
            .tme_username(env_or("TME_USERNAME", ""))
            .tme_password(env_or("TME_PASSWORD", ""))
            .base_url(env_or("BASE_URL", &defaults.base_url))
            .host(env_or("HOST", &defaults.host))
            .taxonomy(env_or("TAXONOMY", &defaults.taxonomy));

        if let Ok(token) = std::env::var("TOKEN") {
            builder = builder.token(token);
        }
        if let Some(port) = env_parse("PORT")? {
            builder = builder.port(port);
        }
        if let Some(max) = env_parse("MAX_RECORDS")? {
            builder = builder.max_records(max);
        }
        if let Some(slices) = env_parse("SLICES")? {
            builder = builder.slices(slices);
        }
        if let Some(secs) = env_parse("REQUEST_TIMEOUT_SECS")? {
            builder = builder.request_timeout_secs(secs);
        }

        builder.build()
    }

    /// Creates a builder for configuration.
    #[must_use]
    pub fn builder() -> FetcherConfigBuilder {
        FetcherConfigBuilder::default()
    }

    /// Paging plan derived from `max_records` and `slices`.
    #[must_use]
    pub fn fetch_plan(&self) -> FetchPlan {
        FetchPlan::from_max_records(self.max_records, self.slices)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| FetcherError::Configuration(format!("{key} is not valid: {raw}"))),
        Err(_) => Ok(None),
    }
}

/// Builder for `FetcherConfig`.
#[derive(Default)]
pub struct FetcherConfigBuilder {
    tme_base_url: Option<String>,
    tme_username: Option<String>,
    tme_password: Option<String>,
    token: Option<String>,
    base_url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    max_records: Option<usize>,
    slices: Option<usize>,
    taxonomy: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl FetcherConfigBuilder {
    #[must_use]
    pub fn tme_base_url(mut self, url: impl Into<String>) -> Self {
        self.tme_base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn tme_username(mut self, username: impl Into<String>) -> Self {
        self.tme_username = Some(username.into());
        self
    }

    #[must_use]
    pub fn tme_password(mut self, password: impl Into<String>) -> Self {
        self.tme_password = Some(password.into());
        self
    }

    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the prefix used for `apiUrl` links.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the host to bind to.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port to bind to.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }

    #[must_use]
    pub fn slices(mut self, slices: usize) -> Self {
        self.slices = Some(slices);
        self
    }

    #[must_use]
    pub fn taxonomy(mut self, taxonomy: impl Into<String>) -> Self {
        self.taxonomy = Some(taxonomy.into());
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<FetcherConfig> {
        let defaults = FetcherConfig::default();

        let max_records = self.max_records.unwrap_or(defaults.max_records);
        if max_records == 0 {
            return Err(FetcherError::Configuration(
                "max_records must be greater than zero".to_string(),
            ));
        }

        let slices = self.slices.unwrap_or(defaults.slices);
        if slices == 0 {
            return Err(FetcherError::Configuration(
                "slices must be greater than zero".to_string(),
            ));
        }

        let taxonomy = self.taxonomy.unwrap_or(defaults.taxonomy);
        if taxonomy.trim().is_empty() {
            return Err(FetcherError::Configuration(
                "taxonomy is required".to_string(),
            ));
        }

        Ok(FetcherConfig {
            tme_base_url: self.tme_base_url.unwrap_or(defaults.tme_base_url),
            tme_username: self.tme_username.unwrap_or_default(),
            tme_password: self.tme_password.unwrap_or_default(),
            token: self.token.filter(|t| !t.is_empty()),
            base_url: self.base_url.unwrap_or(defaults.base_url),
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            max_records,
            slices,
            taxonomy,
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        })
    }
}

/// Shared application state for Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The location cache.
    pub store: Arc<CacheStore>,
    /// Server configuration.
    pub config: Arc<FetcherConfig>,
    /// Prometheus render handle, absent when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates application state backed by the live TME client.
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let source = Arc::new(TmeClient::new(&config)?);
        Ok(Self::with_source(source, config))
    }

    /// Creates application state over any record source (useful for testing).
    #[must_use]
    pub fn with_source(source: Arc<dyn RecordSource>, config: FetcherConfig) -> Self {
        let builder = SnapshotBuilder::new(
            Arc::new(LocationTransformer),
            config.taxonomy.clone(),
            config.base_url.clone(),
        );
        let store = CacheStore::new(source, builder, config.fetch_plan());

        Self {
            store: Arc::new(store),
            config: Arc::new(config),
            metrics: None,
        }
    }

    /// Attaches a Prometheus handle for the `/metrics` endpoint.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
