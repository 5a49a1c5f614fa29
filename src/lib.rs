//! ArthaBot Backend Library
//!
//! Instrument identity resolution and caching for the chatbot backend:
//! symbol/ISIN/id lookup across exchange segments, TTL-driven refresh, and
//! the symbol-keyed market data client built on top. Exposed for use by the
//! binaries and integration tests.

pub mod instruments;
pub mod market;
pub mod models;

// Re-export the engine surface at crate root for callers
pub use instruments::{
    CacheState, CacheStats, ExchangeSegment, InstrumentRecord, InstrumentService, StoreBackend,
};
pub use models::InstrumentsConfig;
