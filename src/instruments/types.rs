//! Core instrument identity types shared across the resolution engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel the instrument feed emits when a row has no ISIN.
pub const ISIN_SENTINEL: &str = "NA";

/// Exchange segment identifier (e.g. `NSE_EQ`, `BSE_EQ`, `IDX_I`).
///
/// Segments are opaque provider-defined namespaces: the same symbol string in
/// two segments may map to different security IDs and does not imply the same
/// underlying security. Normalized to trimmed uppercase on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeSegment(String);

impl ExchangeSegment {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_uppercase())
    }

    /// NSE equity segment.
    pub fn nse_eq() -> Self {
        Self("NSE_EQ".to_string())
    }

    /// BSE equity segment.
    pub fn bse_eq() -> Self {
        Self("BSE_EQ".to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// NSE-class segments win ISIN index conflicts against non-NSE segments.
    #[inline]
    pub fn is_nse(&self) -> bool {
        self.0.starts_with("NSE")
    }
}

impl std::fmt::Display for ExchangeSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExchangeSegment {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One row of the instrument master.
///
/// `security_id` is unique only within its exchange segment. `isin` is
/// globally unique per underlying security but may appear under multiple
/// segments when a company is dual-listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub exchange_segment: ExchangeSegment,
    pub security_id: i64,
    pub symbol: String,
    pub isin: Option<String>,
    pub display_name: String,
}

/// Trim an ISIN-ish value and drop the feed's not-available sentinels.
pub fn usable_isin(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == ISIN_SENTINEL || trimmed.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(trimmed)
    }
}

// ============================================================================
// Error taxonomy
// ============================================================================

/// Failure fetching or parsing one segment of the instrument feed.
///
/// Both variants are absorbed by the refresh cycle after bootstrap: the store
/// keeps serving the previous snapshot and the segment retries on the next
/// TTL check.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed fetch failed for {segment}: {reason}")]
    Fetch { segment: ExchangeSegment, reason: String },

    #[error("feed parse failed for {segment}: {reason}")]
    Parse { segment: ExchangeSegment, reason: String },
}

impl FeedError {
    pub fn fetch(segment: &ExchangeSegment, reason: impl Into<String>) -> Self {
        Self::Fetch {
            segment: segment.clone(),
            reason: reason.into(),
        }
    }

    pub fn parse(segment: &ExchangeSegment, reason: impl Into<String>) -> Self {
        Self::Parse {
            segment: segment.clone(),
            reason: reason.into(),
        }
    }

    pub fn segment(&self) -> &ExchangeSegment {
        match self {
            Self::Fetch { segment, .. } | Self::Parse { segment, .. } => segment,
        }
    }
}

/// A symbol or ISIN that is absent from the index. Expected outcome, returned
/// to the caller rather than logged as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{symbol}' not found in {segment}")]
pub struct NotFound {
    pub symbol: String,
    pub segment: ExchangeSegment,
}

/// Bootstrap load failure. Fatal to the calling component's startup: the
/// resolver is unusable over an empty store.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("instrument bootstrap failed: no segment loaded ({detail})")]
    NoSegmentLoaded { detail: String },

    #[error("instrument bootstrap task failed: {0}")]
    TaskFailed(String),
}

// ============================================================================
// Resolution results and stats
// ============================================================================

/// Outcome of a batch resolution. Partial misses never fail the batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResolution {
    /// Caller symbol (as given) -> resolved security id.
    pub found: std::collections::HashMap<String, i64>,
    /// Caller symbols with no match in any configured segment.
    pub missing: Vec<String>,
}

impl BatchResolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Point-in-time view of the cache, for diagnostics and health logging.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub instrument_count: usize,
    /// Per-segment instrument counts.
    pub segments: std::collections::BTreeMap<String, usize>,
    /// Most recent successful segment refresh, if any segment has loaded.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub resolve_hits: u64,
    pub resolve_misses: u64,
    /// Hits over total lookups, 1.0 when nothing has been resolved yet.
    pub hit_rate: f64,
}
