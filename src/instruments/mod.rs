//! Instrument Identity Resolution & Caching Engine
//!
//! Translates human-facing trading symbols into provider security ids and
//! back, across exchange segments with inconsistent naming. The moving
//! parts:
//! 1. Feed: segment-wise instrument master download (CSV over HTTP)
//! 2. Store: lock-free snapshot index per segment, shared ISIN index
//! 3. Resolver: priority-ordered lookup chain with fallback and suggestions
//! 4. Refresh: bootstrap + TTL-driven single-flight refresh
//! 5. Overlay: caller-symbol labeling for provider responses
//! 6. Disk: optional SQLite warm start and write-through

pub mod disk;
pub mod feed;
pub mod overlay;
pub mod refresh;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

pub use disk::InstrumentDb;
pub use feed::{fetch_segments, parse_segment_csv, FeedBatch, HttpInstrumentFeed, InstrumentFeed};
pub use overlay::ReverseSymbolOverlay;
pub use refresh::{CacheState, RefreshCoordinator, RefreshOutcome};
pub use resolver::{ResolutionStep, Resolver, DEFAULT_RESOLUTION_ORDER};
pub use service::{InstrumentService, StoreBackend};
pub use store::{InstrumentStore, SegmentSnapshot, StoreMetrics};
pub use types::{
    usable_isin, BatchResolution, CacheStats, ExchangeSegment, FeedError, InitError,
    InstrumentRecord, NotFound,
};
