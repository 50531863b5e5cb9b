//! Paginated retrieval of raw terms from the authority-file service.
//!
//! [`RecordSource::fetch_page`] is the only operation a source has to provide.
//! [`RecordSource::fetch_all`] drives it with `slices` concurrent workers: worker `i`
//! reads pages `i, i + slices, i + 2 * slices, ...` and stops at the first page shorter
//! than the page size. Once any page is short every later page is empty, so each worker
//! stops at or past the end of the data and together they cover every record exactly
//! once. The first worker error drops all remaining workers and is returned as is.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use parking_lot::RwLock;
use reqwest::{Client, header::ACCEPT};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FetcherError, Result};
use crate::record::{RawRecord, parse_page};
use crate::state::FetcherConfig;
use crate::telemetry::Telemetry;

/// Page size and parallelism of one full fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    pub page_size: usize,
    pub slices: usize,
}

impl FetchPlan {
    #[must_use]
    pub fn new(page_size: usize, slices: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            slices: slices.max(1),
        }
    }

    /// Splits `max_records` per round evenly across `slices` workers.
    #[must_use]
    pub fn from_max_records(max_records: usize, slices: usize) -> Self {
        let slices = slices.max(1);
        Self::new(max_records / slices, slices)
    }

    /// Single worker, plain sequential paging.
    #[must_use]
    pub fn sequential(page_size: usize) -> Self {
        Self::new(page_size, 1)
    }
}

/// A paginated source of raw records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches up to `limit` records starting at `offset`. One network call.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<RawRecord>>;

    /// Fetches every record. Result order is unspecified.
    async fn fetch_all(
        &self,
        plan: FetchPlan,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRecord>> {
        fetch_sliced(self, plan, cancel).await
    }
}

/// Sliced pagination over any source.
pub async fn fetch_sliced<S>(
    source: &S,
    plan: FetchPlan,
    cancel: &CancellationToken,
) -> Result<Vec<RawRecord>>
where
    S: RecordSource + ?Sized,
{
    let workers = (0..plan.slices).map(|slice| paginate_slice(source, plan, slice));

    let slices = tokio::select! {
        () = cancel.cancelled() => return Err(FetcherError::ReloadCancelled),
        slices = try_join_all(workers) => slices?,
    };

    Ok(slices.into_iter().flatten().collect())
}

async fn paginate_slice<S>(source: &S, plan: FetchPlan, slice: usize) -> Result<Vec<RawRecord>>
where
    S: RecordSource + ?Sized,
{
    let stride = plan.page_size * plan.slices;
    let mut offset = slice * plan.page_size;
    let mut records = Vec::new();

    loop {
        let page = source.fetch_page(offset, plan.page_size).await?;
        let received = page.len();
        debug!(slice, offset, received, "Fetched page");
        Telemetry::record_page(received);

        records.extend(page);
        if received < plan.page_size {
            break;
        }
        offset += stride;
    }

    Ok(records)
}

// ============================================================================
// Live TME client
// ============================================================================

/// Reads terms from the TME authority-file REST API.
pub struct TmeClient {
    client: Client,
    endpoint: String,
    username: String,
    password: String,
    token: Option<String>,
}

impl TmeClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FetcherError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/rs/authorityfiles/{}/terms",
                config.tme_base_url.trim_end_matches('/'),
                config.taxonomy
            ),
            username: config.tme_username.clone(),
            password: config.tme_password.clone(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl RecordSource for TmeClient {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<RawRecord>> {
        let url = format!(
            "{}?maximumRecords={limit}&startRecord={offset}",
            self.endpoint
        );

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/xml;charset=utf-8")
            .basic_auth(&self.username, Some(&self.password));
        if let Some(token) = &self.token {
            request = request.header("X-Coco-Auth", token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetcherError::UpstreamBadStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_page(&body)
    }
}

// ============================================================================
// In-memory source
// ============================================================================

/// In-memory source serving a fixed record list, used by tests and local runs.
///
/// Supports failure injection at a given offset, a per-page delay, and a gate that
/// holds every page request until permits are added.
#[derive(Default)]
pub struct InMemorySource {
    records: RwLock<Vec<RawRecord>>,
    fail_at: RwLock<Option<usize>>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl InMemorySource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            ..Default::default()
        }
    }

    /// Delays every page response.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every page request waits for a permit on `gate` before answering.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Replaces the served dataset.
    pub fn set_records(&self, records: Vec<RawRecord>) {
        *self.records.write() = records;
    }

    /// Makes the page starting at `offset` fail with a 500, or clears the failure.
    pub fn fail_at(&self, offset: Option<usize>) {
        *self.fail_at.write() = offset;
    }

    /// Number of `fetch_page` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSource for InMemorySource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<RawRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| FetcherError::Internal(e.to_string()))?;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_at.read() == Some(offset) {
            return Err(FetcherError::UpstreamBadStatus { status: 500 });
        }

        let records = self.records.read();
        Ok(records.iter().skip(offset).take(limit).cloned().collect())
    }
}
