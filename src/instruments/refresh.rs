//! Refresh lifecycle for the instrument store.
//!
//! One coordinator owns the cache state machine. A bootstrap moves the cache
//! from Uninitialized through Loading to Ready; after that the cache bounces
//! between Ready and Refreshing for the rest of its life, serving the
//! previous snapshots while a refresh runs. Failed is reachable only from a
//! bootstrap where not a single segment could be loaded.
//!
//! Every load path is single-flight: a flight flag elects one loader and a
//! watch channel lets everyone else park until the cycle settles. The
//! request path calls [`RefreshCoordinator::ensure_fresh`], which is a cheap
//! state read unless a segment has outlived its TTL.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::instruments::disk::InstrumentDb;
use crate::instruments::feed::{fetch_segments, InstrumentFeed};
use crate::instruments::store::InstrumentStore;
use crate::instruments::types::{ExchangeSegment, InitError};
use crate::models::InstrumentsConfig;

// ============================================================================
// Cache state
// ============================================================================

/// Lifecycle of the instrument cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No load has been attempted yet.
    Uninitialized,
    /// First load in progress; there is nothing to serve yet.
    Loading,
    /// At least one segment is loaded and lookups are being served.
    Ready,
    /// Serving current snapshots while a refresh cycle runs.
    Refreshing,
    /// Bootstrap could not load a single segment.
    Failed,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Refreshing => "refreshing",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one refresh cycle over the configured segments.
#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    pub segments_ok: usize,
    pub segments_failed: usize,
    /// One message per failed segment, for logs and admin output.
    pub failures: Vec<String>,
}

impl RefreshOutcome {
    pub fn all_ok(&self) -> bool {
        self.segments_failed == 0
    }
}

// ============================================================================
// Coordinator
// ============================================================================

pub struct RefreshCoordinator {
    store: Arc<InstrumentStore>,
    feed: Arc<dyn InstrumentFeed>,
    db: Option<InstrumentDb>,
    segments: Vec<ExchangeSegment>,
    ttl: chrono::Duration,
    /// True while any load or refresh cycle is running.
    flight: Mutex<bool>,
    /// Authoritative lifecycle state. Transitions go through `send_replace`,
    /// which stores the value even when no receiver is subscribed.
    state_tx: watch::Sender<CacheState>,
    last_error: Mutex<Option<String>>,
    last_outcome: Mutex<RefreshOutcome>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<InstrumentStore>,
        feed: Arc<dyn InstrumentFeed>,
        db: Option<InstrumentDb>,
        config: &InstrumentsConfig,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(CacheState::Uninitialized);
        Arc::new(Self {
            store,
            feed,
            db,
            segments: config.segments.clone(),
            ttl: config.refresh_ttl(),
            flight: Mutex::new(false),
            state_tx,
            last_error: Mutex::new(None),
            last_outcome: Mutex::new(RefreshOutcome::default()),
        })
    }

    #[inline]
    pub fn state(&self) -> CacheState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.state_tx.subscribe()
    }

    pub fn segments(&self) -> &[ExchangeSegment] {
        &self.segments
    }

    pub fn last_outcome(&self) -> RefreshOutcome {
        self.last_outcome.lock().clone()
    }

    /// A segment is stale when it has never loaded or its last refresh is
    /// older than the TTL.
    pub fn is_stale(&self, segment: &ExchangeSegment) -> bool {
        match self.store.last_refreshed(segment) {
            Some(at) => Utc::now() - at > self.ttl,
            None => true,
        }
    }

    pub fn stale_segments(&self) -> Vec<ExchangeSegment> {
        self.segments
            .iter()
            .filter(|segment| self.is_stale(segment))
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Bootstrap
    // ------------------------------------------------------------------

    /// Load the instrument master, blocking until the cache can serve.
    ///
    /// Safe to call from any number of tasks: one becomes the loader and
    /// the rest wait for it to settle. Succeeds when at least one segment
    /// loads; a partial bootstrap serves what it has and leaves the failed
    /// segments for the next `ensure_fresh` to retry. Errors only when
    /// nothing could be loaded at all.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), InitError> {
        loop {
            let become_loader = {
                let mut flight = self.flight.lock();
                match self.state() {
                    CacheState::Ready | CacheState::Refreshing => return Ok(()),
                    _ if *flight => false,
                    _ => {
                        *flight = true;
                        self.state_tx.send_replace(CacheState::Loading);
                        true
                    }
                }
            };

            if become_loader {
                return self.run_bootstrap().await;
            }

            match self.wait_for_settle().await {
                CacheState::Ready | CacheState::Refreshing => return Ok(()),
                CacheState::Failed => return Err(self.stored_init_error()),
                _ => {}
            }
        }
    }

    /// Runs the bootstrap on a spawned task so the cycle and its state
    /// bookkeeping complete even if the awaiting caller is cancelled.
    async fn run_bootstrap(self: &Arc<Self>) -> Result<(), InitError> {
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if let Some(db) = worker.db.clone() {
                worker.warm_start(&db).await;
            }
            let outcome = worker.load_cycle(true).await;
            let loaded = worker.store.has_data();
            worker.finish_cycle(loaded, &outcome);
            loaded
        });

        match handle.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.stored_init_error()),
            Err(e) => {
                // Loader task died before publishing a settled state.
                *self.flight.lock() = false;
                *self.last_error.lock() = Some(format!("bootstrap task failed: {e}"));
                self.state_tx.send_replace(CacheState::Failed);
                Err(InitError::TaskFailed(e.to_string()))
            }
        }
    }

    /// Seed the store from disk before touching the network. Segments whose
    /// persisted stamp is still within the TTL are then skipped by the
    /// bootstrap fetch.
    async fn warm_start(&self, db: &InstrumentDb) {
        for segment in &self.segments {
            match db.load_segment(segment).await {
                Ok((records, refreshed_at)) if !records.is_empty() => {
                    let count = self.store.load_segment(segment, records);
                    if let Some(at) = refreshed_at {
                        self.store.restore_refresh_time(segment, at);
                    }
                    info!(segment = %segment, count, "Warm start from disk");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(segment = %segment, error = %e, "Disk warm start failed, fetching from feed instead");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Freshness
    // ------------------------------------------------------------------

    /// Cheap freshness check for the request path.
    ///
    /// Bootstraps on the first call (and retries a failed bootstrap). Once
    /// Ready, a stale segment kicks off a background refresh and the call
    /// returns immediately; lookups keep serving the previous snapshots.
    /// Never blocks an already-initialized caller on a refetch.
    pub async fn ensure_fresh(self: &Arc<Self>) -> Result<(), InitError> {
        match self.state() {
            CacheState::Ready => {
                self.spawn_refresh_if_stale();
                Ok(())
            }
            CacheState::Refreshing => Ok(()),
            CacheState::Uninitialized | CacheState::Loading | CacheState::Failed => {
                self.initialize().await
            }
        }
    }

    /// Synchronous staleness kick for hot paths that must not await.
    /// Spawns a background refresh when Ready with a stale segment,
    /// otherwise does nothing. Callers that may hit an uninitialized cache
    /// use [`ensure_fresh`](Self::ensure_fresh) instead.
    pub fn refresh_if_stale(self: &Arc<Self>) {
        if self.state() == CacheState::Ready {
            self.spawn_refresh_if_stale();
        }
    }

    fn spawn_refresh_if_stale(self: &Arc<Self>) {
        if self.stale_segments().is_empty() {
            return;
        }
        {
            let mut flight = self.flight.lock();
            if *flight {
                return;
            }
            *flight = true;
            self.state_tx.send_replace(CacheState::Refreshing);
        }

        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = worker.load_cycle(true).await;
            worker.finish_cycle(worker.store.has_data(), &outcome);
        });
    }

    /// Refetch all configured segments now, ignoring the TTL.
    ///
    /// If a cycle is already in flight this joins it instead of starting a
    /// second one, and returns that cycle's outcome.
    pub async fn force_refresh(self: &Arc<Self>) -> Result<RefreshOutcome, InitError> {
        if !matches!(self.state(), CacheState::Ready | CacheState::Refreshing) {
            self.initialize().await?;
            return Ok(self.last_outcome());
        }

        let become_refresher = {
            let mut flight = self.flight.lock();
            if *flight {
                false
            } else {
                *flight = true;
                self.state_tx.send_replace(CacheState::Refreshing);
                true
            }
        };

        if !become_refresher {
            self.wait_for_settle().await;
            return Ok(self.last_outcome());
        }

        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = worker.load_cycle(false).await;
            worker.finish_cycle(worker.store.has_data(), &outcome);
            outcome
        });

        match handle.await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                *self.flight.lock() = false;
                self.state_tx.send_replace(CacheState::Ready);
                Err(InitError::TaskFailed(e.to_string()))
            }
        }
    }

    // ------------------------------------------------------------------
    // Cycle internals
    // ------------------------------------------------------------------

    /// One fetch-and-swap pass. With `stale_only`, segments still inside
    /// the TTL are skipped; a forced refresh passes false and refetches
    /// everything.
    async fn load_cycle(&self, stale_only: bool) -> RefreshOutcome {
        let targets = if stale_only {
            self.stale_segments()
        } else {
            self.segments.clone()
        };

        let mut outcome = RefreshOutcome::default();
        if targets.is_empty() {
            *self.last_outcome.lock() = outcome.clone();
            return outcome;
        }

        info!(segments = ?targets, "🔄 Instrument refresh started");
        let started = Instant::now();

        for (segment, result) in fetch_segments(&self.feed, &targets).await {
            match result {
                Ok(batch) => {
                    if batch.rows_skipped > 0 {
                        self.store
                            .metrics()
                            .rows_skipped
                            .fetch_add(batch.rows_skipped, Ordering::Relaxed);
                    }
                    self.store.load_segment(&segment, batch.records);
                    self.persist_segment(&segment).await;
                    outcome.segments_ok += 1;
                }
                Err(e) => {
                    self.store
                        .metrics()
                        .segment_load_failures
                        .fetch_add(1, Ordering::Relaxed);
                    error!(segment = %segment, error = %e, "Segment refresh failed, keeping previous snapshot");
                    outcome.segments_failed += 1;
                    outcome.failures.push(e.to_string());
                }
            }
        }

        info!(
            ok = outcome.segments_ok,
            failed = outcome.segments_failed,
            total_instruments = self.store.stats().instrument_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "✅ Instrument refresh complete"
        );

        *self.last_outcome.lock() = outcome.clone();
        outcome
    }

    /// Mirror the freshly swapped snapshot to disk. Persistence failures are
    /// logged and swallowed; the in-memory cache stays authoritative.
    async fn persist_segment(&self, segment: &ExchangeSegment) {
        let Some(db) = &self.db else { return };
        let Some(snapshot) = self.store.snapshot(segment) else { return };
        let refreshed_at = self.store.last_refreshed(segment).unwrap_or_else(Utc::now);
        if let Err(e) = db.replace_segment(segment, snapshot.records(), refreshed_at).await {
            warn!(segment = %segment, error = %e, "Failed to persist segment to disk");
        }
    }

    fn finish_cycle(&self, loaded: bool, outcome: &RefreshOutcome) {
        let mut flight = self.flight.lock();
        *flight = false;
        if loaded {
            *self.last_error.lock() = None;
            self.state_tx.send_replace(CacheState::Ready);
        } else {
            let detail = if outcome.failures.is_empty() {
                "no instrument segments configured".to_string()
            } else {
                outcome.failures.join("; ")
            };
            *self.last_error.lock() = Some(detail);
            self.state_tx.send_replace(CacheState::Failed);
        }
    }

    /// Park until the in-flight cycle publishes a settled state.
    async fn wait_for_settle(&self) -> CacheState {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                CacheState::Ready | CacheState::Refreshing | CacheState::Failed => return state,
                CacheState::Uninitialized | CacheState::Loading => {}
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    fn stored_init_error(&self) -> InitError {
        let detail = self
            .last_error
            .lock()
            .clone()
            .unwrap_or_else(|| "instrument bootstrap failed".to_string());
        InitError::NoSegmentLoaded { detail }
    }
}
