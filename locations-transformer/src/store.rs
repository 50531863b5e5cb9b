//! The cache store: the published snapshot, its load status, and reload coordination.
//!
//! ## Thread Safety
//!
//! - **Reads** (`get_all`, `get_by_id`, `count`, `ids`, `status`) take a single atomic
//!   load of the current [`Snapshot`] or status cell. They never wait on the reload path.
//! - **Reloads** are serialized through a single slot. A second reload attempt while
//!   one is in flight fails immediately with [`FetcherError::ReloadAlreadyInProgress`].
//! - **Publish** is one atomic pointer swap at the end of a successful reload. Readers
//!   holding the previous generation keep it alive until they drop it.
//!
//! ## Status transitions
//!
//! ```text
//! Uninitialized ──► Loading ──► Ready ──► Loading ...
//!                      │                     ▲
//!                      └──► Failed ──────────┘
//! ```
//!
//! A cancelled reload goes back to `Ready` when a snapshot is published, else `Failed`.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::{Entity, Link};
use crate::error::{FetcherError, Result};
use crate::snapshot::{Snapshot, SnapshotBuilder};
use crate::source::{FetchPlan, RecordSource};
use crate::telemetry::{ReloadTimer, Telemetry};

/// Load state of a [`CacheStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LoadStatus {
    Uninitialized = 0,
    Loading = 1,
    Ready = 2,
    Failed = 3,
}

impl LoadStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Uninitialized,
        }
    }
}

/// Outcome of a successful reload.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub generation: u64,
    pub entities: usize,
    pub skipped: usize,
    pub elapsed_ms: u128,
}

/// The link list of one published snapshot.
///
/// Holds the snapshot alive for as long as the caller needs the links.
#[derive(Debug, Clone)]
pub struct Links(Arc<Snapshot>);

impl Deref for Links {
    type Target = [Link];

    fn deref(&self) -> &[Link] {
        self.0.links()
    }
}

impl Serialize for Links {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.links().serialize(serializer)
    }
}

/// Point-in-time-consistent cache of transformed locations.
pub struct CacheStore {
    source: Arc<dyn RecordSource>,
    builder: SnapshotBuilder,
    plan: FetchPlan,
    snapshot: ArcSwapOption<Snapshot>,
    status: AtomicU8,
    last_error: ArcSwapOption<String>,
    reload_slot: Arc<tokio::sync::Mutex<()>>,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl CacheStore {
    pub fn new(source: Arc<dyn RecordSource>, builder: SnapshotBuilder, plan: FetchPlan) -> Self {
        Self {
            source,
            builder,
            plan,
            snapshot: ArcSwapOption::empty(),
            status: AtomicU8::new(LoadStatus::Uninitialized as u8),
            last_error: ArcSwapOption::empty(),
            reload_slot: Arc::new(tokio::sync::Mutex::new(())),
            in_flight: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// The currently published snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.load_full()
    }

    /// All links of the published snapshot. `None` when nothing is published or the
    /// published snapshot is empty.
    pub fn get_all(&self) -> Option<Links> {
        self.snapshot()
            .filter(|snapshot| !snapshot.is_empty())
            .map(Links)
    }

    /// Looks the id up in the published snapshot. Never fetches.
    pub fn get_by_id(&self, id: &Uuid) -> Option<Entity> {
        self.snapshot()?.get(id).cloned()
    }

    /// Size of the published link list, 0 before the first successful load.
    pub fn count(&self) -> usize {
        self.snapshot().map_or(0, |s| s.len())
    }

    /// Distinct entity ids of the published snapshot.
    pub fn ids(&self) -> HashSet<Uuid> {
        self.snapshot()
            .map(|s| s.ids().copied().collect())
            .unwrap_or_default()
    }

    pub fn status(&self) -> LoadStatus {
        LoadStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Generation of the published snapshot, 0 before the first successful load.
    pub fn generation(&self) -> u64 {
        self.snapshot().map_or(0, |s| s.generation())
    }

    /// Skipped-record count of the published snapshot.
    pub fn last_skipped(&self) -> usize {
        self.snapshot().map_or(0, |s| s.skipped())
    }

    /// Message of the most recent failed reload, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.load_full().map(|e| e.as_ref().clone())
    }

    // ------------------------------------------------------------------------
    // Reload
    // ------------------------------------------------------------------------

    /// Runs a full reload to completion on the calling task.
    ///
    /// Allowed from any status, including `Uninitialized`; this is how the first load
    /// is driven.
    pub async fn reload(self: &Arc<Self>) -> Result<ReloadReport> {
        self.acquire(false)?.run().await
    }

    /// Claims the reload slot for a background reload.
    ///
    /// Fails with [`FetcherError::NotYetInitialized`] while the store has never begun a
    /// load, and with [`FetcherError::ReloadAlreadyInProgress`] while another reload
    /// holds the slot. On success the status is already `Loading` when this returns.
    pub fn begin_reload(self: &Arc<Self>) -> Result<ReloadTicket> {
        self.acquire(true)
    }

    /// Signals the in-flight reload to stop.
    ///
    /// Runs under the same lock as the final publish, so a reload either observes the
    /// cancel and keeps the previous snapshot, or has already published and this
    /// returns [`FetcherError::NoReloadInProgress`].
    pub fn cancel_reload(&self) -> Result<()> {
        match self.in_flight.lock().as_ref() {
            Some(token) => {
                token.cancel();
                info!("Reload cancellation requested");
                Ok(())
            }
            None => Err(FetcherError::NoReloadInProgress),
        }
    }

    fn acquire(self: &Arc<Self>, require_initialized: bool) -> Result<ReloadTicket> {
        let guard = Arc::clone(&self.reload_slot)
            .try_lock_owned()
            .map_err(|_| FetcherError::ReloadAlreadyInProgress)?;

        if require_initialized && self.status() == LoadStatus::Uninitialized {
            return Err(FetcherError::NotYetInitialized);
        }

        let cancel = CancellationToken::new();
        *self.in_flight.lock() = Some(cancel.clone());
        self.set_status(LoadStatus::Loading);

        Ok(ReloadTicket {
            store: Arc::clone(self),
            cancel,
            _slot: guard,
        })
    }

    fn set_status(&self, status: LoadStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// Status to fall back to when a reload ends without publishing.
    fn settle_without_publish(&self) -> LoadStatus {
        if self.snapshot().is_some() {
            LoadStatus::Ready
        } else {
            LoadStatus::Failed
        }
    }

    /// Publishes `snapshot` unless `cancel` has fired. Returns whether it published.
    fn publish_unless_cancelled(&self, snapshot: Snapshot, cancel: &CancellationToken) -> bool {
        let mut in_flight = self.in_flight.lock();
        if cancel.is_cancelled() {
            return false;
        }
        *in_flight = None;

        Telemetry::set_entities(snapshot.len());
        self.snapshot.store(Some(Arc::new(snapshot)));
        self.last_error.store(None);
        self.set_status(LoadStatus::Ready);
        true
    }
}

/// Exclusive right to run one reload. Holding it keeps other reloads out.
pub struct ReloadTicket {
    store: Arc<CacheStore>,
    cancel: CancellationToken,
    _slot: OwnedMutexGuard<()>,
}

impl ReloadTicket {
    /// Fetches, transforms and publishes a new generation.
    ///
    /// On any error the previously published snapshot stays in place.
    pub async fn run(self) -> Result<ReloadReport> {
        let store = &self.store;
        let generation = store.generation() + 1;
        let timer = ReloadTimer::new();

        info!(
            generation,
            slices = store.plan.slices,
            page_size = store.plan.page_size,
            namespace = store.builder.namespace(),
            "Reloading locations from TME"
        );

        let built = match store.source.fetch_all(store.plan, &self.cancel).await {
            Ok(records) => store
                .builder
                .build(records.into_iter().map(Ok), generation),
            Err(e) => Err(e),
        };

        let built = match built {
            Ok((snapshot, skipped)) => {
                let entities = snapshot.len();
                if store.publish_unless_cancelled(snapshot, &self.cancel) {
                    Ok((entities, skipped))
                } else {
                    Err(FetcherError::ReloadCancelled)
                }
            }
            Err(e) => Err(e),
        };

        match built {
            Ok((entities, skipped)) => {
                Telemetry::record_skipped(skipped);

                let report = ReloadReport {
                    generation,
                    entities,
                    skipped,
                    elapsed_ms: timer.elapsed_ms(),
                };
                timer.finish("success");
                info!(
                    generation,
                    entities,
                    skipped,
                    elapsed_ms = report.elapsed_ms as u64,
                    "Finished loading locations"
                );
                Ok(report)
            }
            Err(FetcherError::ReloadCancelled) => {
                let status = store.settle_without_publish();
                store.set_status(status);
                timer.finish("cancelled");
                warn!(generation, ?status, "Reload cancelled, previous snapshot retained");
                Err(FetcherError::ReloadCancelled)
            }
            Err(e) => {
                store.last_error.store(Some(Arc::new(e.to_string())));
                store.set_status(LoadStatus::Failed);
                timer.finish("failure");
                error!(generation, error = %e, kind = e.kind(), "Reload failed, previous snapshot retained");
                Err(e)
            }
        }
    }
}

impl Drop for ReloadTicket {
    fn drop(&mut self) {
        *self.store.in_flight.lock() = None;
        // Dropped mid-flight, e.g. its task was aborted.
        if self.store.status() == LoadStatus::Loading {
            let status = self.store.settle_without_publish();
            self.store.set_status(status);
            Telemetry::record_reload("aborted");
            warn!(?status, "Reload dropped before completion");
        }
    }
}
