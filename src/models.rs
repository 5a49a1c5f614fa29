use crate::instruments::types::ExchangeSegment;

/// Engine configuration for the instrument cache and resolver.
#[derive(Debug, Clone)]
pub struct InstrumentsConfig {
    /// Base URL of the segment-wise instrument master API. The per-segment
    /// endpoint is `{base}/{SEGMENT}`.
    pub feed_base_url: String,
    /// Segments downloaded and indexed on every refresh.
    pub segments: Vec<ExchangeSegment>,
    /// Maximum snapshot age before a refresh becomes due.
    pub refresh_ttl_hours: u64,
    /// Per-request feed download timeout.
    pub feed_timeout_secs: u64,
    /// Download attempts per segment before the load counts as failed.
    pub feed_retries: u32,
    /// SQLite path for the disk-backed store; in-memory only when unset.
    pub db_path: Option<String>,
    /// Segment tried first when resolving a bare symbol.
    pub primary_segment: ExchangeSegment,
    /// Fallback segment when the primary has no match.
    pub secondary_segment: ExchangeSegment,
    /// Substring suggestions logged for a failed resolution.
    pub suggestion_limit: usize,
    /// Staleness poll interval for the long-running service binary.
    pub check_interval_secs: u64,
}

impl Default for InstrumentsConfig {
    fn default() -> Self {
        Self {
            feed_base_url: "https://api.dhan.co/v2/instrument".to_string(),
            segments: vec![ExchangeSegment::nse_eq(), ExchangeSegment::bse_eq()],
            refresh_ttl_hours: 24,
            feed_timeout_secs: 30,
            feed_retries: 3,
            db_path: None,
            primary_segment: ExchangeSegment::nse_eq(),
            secondary_segment: ExchangeSegment::bse_eq(),
            suggestion_limit: 3,
            check_interval_secs: 3600,
        }
    }
}

impl InstrumentsConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("INSTRUMENT_FEED_BASE_URL") {
            if !v.is_empty() {
                cfg.feed_base_url = v;
            }
        }
        if let Ok(v) = std::env::var("INSTRUMENT_SEGMENTS") {
            let segments: Vec<ExchangeSegment> = v
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(ExchangeSegment::new)
                .collect();
            if !segments.is_empty() {
                cfg.segments = segments;
            }
        }
        if let Ok(v) = std::env::var("INSTRUMENT_REFRESH_TTL_HOURS") {
            if let Ok(hours) = v.parse() {
                cfg.refresh_ttl_hours = hours;
            }
        }
        if let Ok(v) = std::env::var("INSTRUMENT_FEED_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                cfg.feed_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("INSTRUMENT_FEED_RETRIES") {
            if let Ok(retries) = v.parse::<u32>() {
                if retries > 0 {
                    cfg.feed_retries = retries;
                }
            }
        }
        if let Ok(v) = std::env::var("INSTRUMENT_DB_PATH") {
            if !v.is_empty() {
                cfg.db_path = Some(v);
            }
        }
        if let Ok(v) = std::env::var("PRIMARY_SEGMENT") {
            if !v.trim().is_empty() {
                cfg.primary_segment = ExchangeSegment::new(&v);
            }
        }
        if let Ok(v) = std::env::var("SECONDARY_SEGMENT") {
            if !v.trim().is_empty() {
                cfg.secondary_segment = ExchangeSegment::new(&v);
            }
        }
        if let Ok(v) = std::env::var("SUGGESTION_LIMIT") {
            if let Ok(limit) = v.parse() {
                cfg.suggestion_limit = limit;
            }
        }
        if let Ok(v) = std::env::var("INSTRUMENT_CHECK_INTERVAL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                if secs > 0 {
                    cfg.check_interval_secs = secs;
                }
            }
        }

        cfg
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.refresh_ttl_hours as i64)
    }
}
