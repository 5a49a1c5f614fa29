//! Facade wiring the instrument engine together.
//!
//! One `InstrumentService` owns the store, the resolver, the reverse-symbol
//! overlay and the refresh coordinator, and is shared as an `Arc` from the
//! composition root. Construction picks the backend: in-memory only, or
//! disk-backed when a database path is configured (warm start from SQLite,
//! write-through after every refresh). Lookups always hit the in-memory
//! index either way.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::instruments::disk::InstrumentDb;
use crate::instruments::feed::{HttpInstrumentFeed, InstrumentFeed};
use crate::instruments::overlay::ReverseSymbolOverlay;
use crate::instruments::refresh::{CacheState, RefreshCoordinator, RefreshOutcome};
use crate::instruments::resolver::Resolver;
use crate::instruments::store::InstrumentStore;
use crate::instruments::types::{
    BatchResolution, CacheStats, ExchangeSegment, InitError, NotFound,
};
use crate::models::InstrumentsConfig;

/// How instrument data survives (or not) a process restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    DiskBacked { path: String },
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InMemory => f.write_str("in-memory"),
            Self::DiskBacked { path } => write!(f, "disk-backed ({path})"),
        }
    }
}

pub struct InstrumentService {
    config: InstrumentsConfig,
    backend: StoreBackend,
    store: Arc<InstrumentStore>,
    resolver: Resolver,
    overlay: ReverseSymbolOverlay,
    coordinator: Arc<RefreshCoordinator>,
}

impl InstrumentService {
    /// Production constructor: HTTP feed per the config, disk backend when
    /// `db_path` is set.
    pub fn new(config: InstrumentsConfig) -> Result<Arc<Self>> {
        let feed: Arc<dyn InstrumentFeed> = Arc::new(
            HttpInstrumentFeed::new(&config).context("build instrument feed client")?,
        );
        Self::with_feed(config, feed)
    }

    /// Constructor with an injected feed, used by tests and by callers that
    /// bring their own transport. Still honors `db_path`.
    pub fn with_feed(config: InstrumentsConfig, feed: Arc<dyn InstrumentFeed>) -> Result<Arc<Self>> {
        let (db, backend) = match &config.db_path {
            Some(path) => {
                let db = InstrumentDb::new(path)
                    .with_context(|| format!("open instrument db at {path}"))?;
                (Some(db), StoreBackend::DiskBacked { path: path.clone() })
            }
            None => (None, StoreBackend::InMemory),
        };

        let store = InstrumentStore::new();
        let resolver = Resolver::new(store.clone(), &config);
        let coordinator = RefreshCoordinator::new(store.clone(), feed, db, &config);

        info!(
            backend = %backend,
            segments = ?config.segments,
            ttl_hours = config.refresh_ttl_hours,
            "Instrument service constructed"
        );

        Ok(Arc::new(Self {
            config,
            backend,
            store,
            resolver,
            overlay: ReverseSymbolOverlay::default(),
            coordinator,
        }))
    }

    pub fn config(&self) -> &InstrumentsConfig {
        &self.config
    }

    pub fn backend(&self) -> &StoreBackend {
        &self.backend
    }

    pub fn store(&self) -> &Arc<InstrumentStore> {
        &self.store
    }

    pub fn state(&self) -> CacheState {
        self.coordinator.state()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Blocking bootstrap. See [`RefreshCoordinator::initialize`].
    pub async fn initialize(&self) -> Result<(), InitError> {
        self.coordinator.initialize().await
    }

    /// Cheap freshness check; bootstraps on first call, otherwise triggers
    /// a background refresh when stale and returns immediately.
    pub async fn ensure_fresh(&self) -> Result<(), InitError> {
        self.coordinator.ensure_fresh().await
    }

    /// Refetch everything now, ignoring the TTL. Waits for the cycle.
    pub async fn force_refresh(&self) -> Result<RefreshOutcome, InitError> {
        self.coordinator.force_refresh().await
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolve one symbol to its security id. A successful resolution also
    /// teaches the overlay the caller's name for the id, so later provider
    /// responses label back to what the caller actually typed.
    pub fn resolve_one(
        &self,
        symbol: &str,
        segment: &ExchangeSegment,
        isin: Option<&str>,
    ) -> Result<i64, NotFound> {
        let id = self.resolver.resolve_one(symbol, segment, isin)?;
        self.overlay.record(
            segment,
            id,
            symbol.trim(),
            self.store.isin_of(segment, id).as_deref(),
        );
        Ok(id)
    }

    /// Resolve a batch in a single pass with one staleness check up front.
    /// Misses land in `missing`; a batch never fails as a whole.
    pub fn resolve_batch(&self, symbols: &[String], segment: &ExchangeSegment) -> BatchResolution {
        self.coordinator.refresh_if_stale();

        let resolution = self.resolver.resolve_batch(symbols, segment);
        for (caller_symbol, id) in &resolution.found {
            self.overlay.record(
                segment,
                *id,
                caller_symbol.trim(),
                self.store.isin_of(segment, *id).as_deref(),
            );
        }
        resolution
    }

    /// Label a provider-returned id with the caller's preferred symbol,
    /// falling back to the store's raw reverse index.
    pub fn resolve_symbol(&self, segment: &ExchangeSegment, id: i64) -> Option<String> {
        let symbol = self.overlay.reverse_lookup(&self.store, segment, id);
        if symbol.is_some() {
            self.store.metrics().record_hit();
        } else {
            self.store.metrics().record_miss();
        }
        symbol
    }

    /// Substring search over one segment, for diagnostics.
    pub fn search(
        &self,
        segment: &ExchangeSegment,
        query: &str,
        limit: usize,
    ) -> Vec<(String, i64)> {
        self.store.search_by_substring(segment, query, limit)
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::feed::FeedBatch;
    use crate::instruments::types::{FeedError, InstrumentRecord};
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedFeed {
        rows: RwLock<HashMap<ExchangeSegment, Vec<InstrumentRecord>>>,
        down: AtomicBool,
    }

    impl FixedFeed {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                rows: RwLock::new(HashMap::new()),
                down: AtomicBool::new(false),
            })
        }

        fn set_rows(&self, segment: &ExchangeSegment, rows: Vec<InstrumentRecord>) {
            self.rows.write().insert(segment.clone(), rows);
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::Release);
        }
    }

    #[async_trait]
    impl InstrumentFeed for FixedFeed {
        async fn fetch_segment(&self, segment: &ExchangeSegment) -> Result<FeedBatch, FeedError> {
            if self.down.load(Ordering::Acquire) {
                return Err(FeedError::fetch(segment, "feed offline"));
            }
            Ok(FeedBatch {
                records: self.rows.read().get(segment).cloned().unwrap_or_default(),
                byte_size: 0,
                rows_skipped: 0,
            })
        }
    }

    fn rec(
        segment: &ExchangeSegment,
        id: i64,
        symbol: &str,
        isin: Option<&str>,
        display: &str,
    ) -> InstrumentRecord {
        InstrumentRecord {
            exchange_segment: segment.clone(),
            security_id: id,
            symbol: symbol.to_string(),
            isin: isin.map(|s| s.to_string()),
            display_name: display.to_string(),
        }
    }

    fn seeded_service() -> (Arc<InstrumentService>, ExchangeSegment) {
        let nse = ExchangeSegment::nse_eq();
        let feed = FixedFeed::new();
        feed.set_rows(
            &nse,
            vec![
                rec(&nse, 11536, "TCS", Some("INE467B01029"), "TATA CONSULTANCY SERV LT"),
                rec(&nse, 2885, "RELIANCE", Some("INE002A01018"), "RELIANCE INDUSTRIES"),
            ],
        );
        let config = InstrumentsConfig {
            segments: vec![nse.clone()],
            ..InstrumentsConfig::default()
        };
        let service = InstrumentService::with_feed(config, feed).expect("service");
        (service, nse)
    }

    #[tokio::test]
    async fn test_resolve_then_label_round_trip() {
        let (service, nse) = seeded_service();
        service.initialize().await.expect("bootstrap");

        assert_eq!(service.resolve_one("TCS", &nse, None), Ok(11536));
        // The overlay answers with the caller's name, not the provider's
        // display form.
        assert_eq!(service.resolve_symbol(&nse, 11536).as_deref(), Some("TCS"));
    }

    #[tokio::test]
    async fn test_batch_labels_with_caller_spelling() {
        let (service, nse) = seeded_service();
        service.initialize().await.expect("bootstrap");

        let symbols = vec!["tcs".to_string(), "RELIANCE".to_string(), "NOPE".to_string()];
        let resolution = service.resolve_batch(&symbols, &nse);

        assert_eq!(resolution.found.get("tcs"), Some(&11536));
        assert_eq!(resolution.found.get("RELIANCE"), Some(&2885));
        assert_eq!(resolution.missing, vec!["NOPE".to_string()]);

        // Labeling preserves the spelling the caller used in the batch.
        assert_eq!(service.resolve_symbol(&nse, 11536).as_deref(), Some("tcs"));
        assert_eq!(
            service.resolve_symbol(&nse, 2885).as_deref(),
            Some("RELIANCE")
        );
    }

    #[tokio::test]
    async fn test_stats_reflect_backend_and_counts() {
        let (service, _nse) = seeded_service();
        assert_eq!(service.backend(), &StoreBackend::InMemory);

        service.initialize().await.expect("bootstrap");
        let stats = service.stats();
        assert_eq!(stats.instrument_count, 2);
        assert_eq!(stats.segments.get("NSE_EQ"), Some(&2));
        assert!(stats.last_refreshed_at.is_some());
    }

    #[tokio::test]
    async fn test_disk_backed_service_survives_restart_without_feed() {
        let nse = ExchangeSegment::nse_eq();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir
            .path()
            .join("instruments.db")
            .to_str()
            .expect("utf8")
            .to_string();

        let feed = FixedFeed::new();
        feed.set_rows(&nse, vec![rec(&nse, 11536, "TCS", None, "TCS LTD")]);
        let config = InstrumentsConfig {
            segments: vec![nse.clone()],
            db_path: Some(path.clone()),
            ..InstrumentsConfig::default()
        };

        {
            let service =
                InstrumentService::with_feed(config.clone(), feed.clone()).expect("service");
            assert!(matches!(service.backend(), StoreBackend::DiskBacked { .. }));
            service.initialize().await.expect("first boot");
        }

        // Second process lifetime: feed is down, disk copy carries the boot.
        feed.set_down(true);
        let service = InstrumentService::with_feed(config, feed).expect("service");
        service.initialize().await.expect("warm start boot");
        assert_eq!(service.resolve_one("TCS", &nse, None), Ok(11536));
    }
}
