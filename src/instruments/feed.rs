//! Instrument master feed loader.
//! Mission: Turn one segment's raw CSV feed into clean InstrumentRecords.
//! Philosophy: A bad row is skipped and counted, never fatal to the segment.

use async_trait::async_trait;
use csv::ReaderBuilder;
use futures_util::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::types::{usable_isin, ExchangeSegment, FeedError, InstrumentRecord};
use crate::models::InstrumentsConfig;

const COL_SECURITY_ID: &str = "SECURITY_ID";
const COL_SYMBOL_NAME: &str = "SYMBOL_NAME";
/// How many malformed rows to log individually before going quiet.
const ROW_WARN_LIMIT: u64 = 10;
const BACKOFF_CAP: Duration = Duration::from_secs(16);
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

/// One segment's parsed feed.
#[derive(Debug)]
pub struct FeedBatch {
    pub records: Vec<InstrumentRecord>,
    /// Raw payload size, for load-time logging.
    pub byte_size: usize,
    /// Rows dropped for missing or unparseable required fields.
    pub rows_skipped: u64,
}

/// Source of per-segment instrument master data.
///
/// The production implementation is [`HttpInstrumentFeed`]; tests inject
/// in-process implementations to drive refresh behavior without a network.
#[async_trait]
pub trait InstrumentFeed: Send + Sync {
    async fn fetch_segment(&self, segment: &ExchangeSegment) -> Result<FeedBatch, FeedError>;
}

/// Fetch several segments concurrently. Each segment fails or succeeds on
/// its own; one bad segment never blocks the others.
pub async fn fetch_segments(
    feed: &Arc<dyn InstrumentFeed>,
    segments: &[ExchangeSegment],
) -> Vec<(ExchangeSegment, Result<FeedBatch, FeedError>)> {
    let fetches = segments.iter().map(|segment| {
        let feed = Arc::clone(feed);
        let segment = segment.clone();
        async move {
            let result = feed.fetch_segment(&segment).await;
            (segment, result)
        }
    });
    join_all(fetches).await
}

// ============================================================================
// HTTP implementation
// ============================================================================

/// Downloads segment-wise instrument master CSVs over HTTP.
pub struct HttpInstrumentFeed {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl HttpInstrumentFeed {
    pub fn new(config: &InstrumentsConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.feed_timeout_secs))
            .build()
            .context("Failed to build feed HTTP client")?;

        Ok(Self {
            client,
            base_url: config.feed_base_url.trim_end_matches('/').to_string(),
            max_retries: config.feed_retries.max(1),
        })
    }

    fn segment_url(&self, segment: &ExchangeSegment) -> String {
        format!("{}/{}", self.base_url, segment)
    }

    /// Execute the download with exponential backoff retry. Client errors
    /// other than 429 fail immediately; timeouts, 5xx and 429 are retried.
    async fn download(&self, segment: &ExchangeSegment, url: &str) -> Result<String, FeedError> {
        let mut backoff = Duration::from_millis(100);

        for attempt in 1..=self.max_retries {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .text()
                            .await
                            .map_err(|e| FeedError::fetch(segment, format!("body read: {}", e)));
                    } else if status.as_u16() == 429 {
                        warn!(
                            segment = %segment,
                            attempt,
                            "Feed rate limited (429), backing off 60s"
                        );
                        sleep(RATE_LIMIT_PAUSE).await;
                    } else if status.is_server_error() {
                        warn!(
                            segment = %segment,
                            status = %status,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            "Feed server error, backing off"
                        );
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(BACKOFF_CAP);
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        let snippet: String = body.chars().take(200).collect();
                        return Err(FeedError::fetch(
                            segment,
                            format!("HTTP {}: {}", status, snippet),
                        ));
                    }
                }
                Err(e) => {
                    warn!(segment = %segment, attempt, error = %e, "Feed request failed");
                    if attempt < self.max_retries {
                        sleep(backoff).await;
                        backoff = (backoff * 2).min(BACKOFF_CAP);
                    } else {
                        return Err(FeedError::fetch(segment, e.to_string()));
                    }
                }
            }
        }

        Err(FeedError::fetch(
            segment,
            format!("max retries exceeded for {}", url),
        ))
    }
}

#[async_trait]
impl InstrumentFeed for HttpInstrumentFeed {
    async fn fetch_segment(&self, segment: &ExchangeSegment) -> Result<FeedBatch, FeedError> {
        let url = self.segment_url(segment);
        debug!(segment = %segment, url = %url, "Downloading instrument master");

        let body = self.download(segment, &url).await?;
        let byte_size = body.len();
        let batch = parse_segment_csv(segment, &body)?;

        info!(
            segment = %segment,
            count = batch.records.len(),
            skipped = batch.rows_skipped,
            size_mb = format!("{:.1}", byte_size as f64 / 1024.0 / 1024.0),
            "✓ Instrument master downloaded"
        );
        Ok(batch)
    }
}

// ============================================================================
// CSV parsing
// ============================================================================

/// Raw row shape of the detailed instrument master CSV. Every field is
/// optional here; validation decides what is usable.
#[derive(Debug, Deserialize)]
struct RawFeedRow {
    #[serde(rename = "SECURITY_ID")]
    security_id: Option<String>,
    #[serde(rename = "SYMBOL_NAME")]
    symbol_name: Option<String>,
    #[serde(rename = "ISIN")]
    isin: Option<String>,
    #[serde(rename = "DISPLAY_NAME")]
    display_name: Option<String>,
}

/// Parse one segment's CSV payload into records.
///
/// Fails only for structural problems (missing required columns, nothing
/// usable at all); individual bad rows are skipped and counted.
pub fn parse_segment_csv(segment: &ExchangeSegment, body: &str) -> Result<FeedBatch, FeedError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| FeedError::parse(segment, format!("unreadable header: {}", e)))?
        .clone();
    for required in [COL_SECURITY_ID, COL_SYMBOL_NAME] {
        if !headers.iter().any(|h| h == required) {
            return Err(FeedError::parse(
                segment,
                format!("missing required column {}", required),
            ));
        }
    }

    let mut records = Vec::new();
    let mut rows_skipped = 0u64;

    for row in reader.deserialize::<RawFeedRow>() {
        let raw = match row {
            Ok(raw) => raw,
            Err(e) => {
                rows_skipped += 1;
                if rows_skipped <= ROW_WARN_LIMIT {
                    warn!(segment = %segment, error = %e, "Skipping malformed feed row");
                }
                continue;
            }
        };

        let Some(record) = validate_row(segment, raw) else {
            rows_skipped += 1;
            continue;
        };
        records.push(record);
    }

    if records.is_empty() {
        return Err(FeedError::parse(segment, "no usable rows"));
    }
    if rows_skipped > ROW_WARN_LIMIT {
        warn!(segment = %segment, rows_skipped, "Feed rows skipped in total");
    }

    Ok(FeedBatch {
        records,
        byte_size: body.len(),
        rows_skipped,
    })
}

/// A usable row needs a parseable security id and a non-empty symbol.
/// ISIN sentinels (`NA`, empty) become `None`; the row itself is kept.
fn validate_row(segment: &ExchangeSegment, raw: RawFeedRow) -> Option<InstrumentRecord> {
    let security_id = parse_security_id(raw.security_id.as_deref()?)?;

    let symbol = raw.symbol_name.as_deref()?.trim();
    if symbol.is_empty() || symbol.eq_ignore_ascii_case("nan") {
        return None;
    }

    let isin = raw
        .isin
        .as_deref()
        .and_then(usable_isin)
        .map(|s| s.to_string());
    let display_name = raw
        .display_name
        .as_deref()
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    Some(InstrumentRecord {
        exchange_segment: segment.clone(),
        security_id,
        symbol: symbol.to_string(),
        isin,
        display_name,
    })
}

/// Security ids arrive as integers but some exporters emit them float-formed
/// (`"1333.0"`). Accept those when the fraction is zero.
fn parse_security_id(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(id) = trimmed.parse::<i64>() {
        return Some(id);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn nse() -> ExchangeSegment {
        ExchangeSegment::nse_eq()
    }

    #[test]
    fn test_parse_detailed_csv() {
        let body = "\
SECURITY_ID,SYMBOL_NAME,ISIN,DISPLAY_NAME,SERIES\n\
1,TCS,INE467B01029,TATA CONSULTANCY SERV LT,EQ\n\
2,RELIANCE,INE002A01018,RELIANCE INDUSTRIES LTD,EQ\n";

        let batch = parse_segment_csv(&nse(), body).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.rows_skipped, 0);
        assert_eq!(batch.byte_size, body.len());

        let tcs = &batch.records[0];
        assert_eq!(tcs.security_id, 1);
        assert_eq!(tcs.symbol, "TCS");
        assert_eq!(tcs.isin.as_deref(), Some("INE467B01029"));
        assert_eq!(tcs.display_name, "TATA CONSULTANCY SERV LT");
    }

    #[test]
    fn test_bad_rows_skipped_not_fatal() {
        let body = "\
SECURITY_ID,SYMBOL_NAME,ISIN,DISPLAY_NAME\n\
,MISSINGID,NA,X\n\
abc,BADID,NA,X\n\
3,,NA,X\n\
4,GOOD,NA,GOOD LTD\n";

        let batch = parse_segment_csv(&nse(), body).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rows_skipped, 3);
        assert_eq!(batch.records[0].symbol, "GOOD");
        assert_eq!(batch.records[0].isin, None);
    }

    #[test]
    fn test_isin_sentinel_becomes_none() {
        let body = "\
SECURITY_ID,SYMBOL_NAME,ISIN,DISPLAY_NAME\n\
1,FOO,NA,FOO LTD\n\
2,BAR,,BAR LTD\n\
3,BAZ,INE111A01011,BAZ LTD\n";

        let batch = parse_segment_csv(&nse(), body).unwrap();
        assert_eq!(batch.records[0].isin, None);
        assert_eq!(batch.records[1].isin, None);
        assert_eq!(batch.records[2].isin.as_deref(), Some("INE111A01011"));
    }

    #[test]
    fn test_missing_required_column_is_parse_error() {
        let body = "SYMBOL_NAME,ISIN\nTCS,INE467B01029\n";
        let err = parse_segment_csv(&nse(), body).unwrap_err();
        assert!(matches!(err, FeedError::Parse { .. }));
        assert!(err.to_string().contains("SECURITY_ID"));
    }

    #[test]
    fn test_zero_usable_rows_is_parse_error() {
        let body = "SECURITY_ID,SYMBOL_NAME,ISIN,DISPLAY_NAME\n";
        let err = parse_segment_csv(&nse(), body).unwrap_err();
        assert!(matches!(err, FeedError::Parse { .. }));
    }

    #[test]
    fn test_float_formed_security_id() {
        assert_eq!(parse_security_id("1333"), Some(1333));
        assert_eq!(parse_security_id("1333.0"), Some(1333));
        assert_eq!(parse_security_id(" 1333 "), Some(1333));
        assert_eq!(parse_security_id("1333.5"), None);
        assert_eq!(parse_security_id("abc"), None);
        assert_eq!(parse_security_id(""), None);
    }

    #[tokio::test]
    #[ignore] // Only run with real feed access: cargo test -- --ignored
    async fn test_fetch_live_segment() {
        let config = InstrumentsConfig::default();
        let feed = HttpInstrumentFeed::new(&config).expect("client");
        let batch = feed.fetch_segment(&nse()).await.expect("fetch");
        assert!(batch.records.len() > 1000);
    }
}
