//! Symbol-keyed quote access on top of the instrument engine.
//!
//! Providers speak numeric security ids grouped by exchange segment; callers
//! speak symbols. `MarketDataClient` does the translation in both directions:
//! batch-resolve before the provider call, label each returned id after it.
//! Ids the provider returns but nobody can name are skipped, unresolved
//! symbols come back in an explicit missing list, and a partial answer is
//! never an error.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::instruments::service::InstrumentService;
use crate::instruments::types::ExchangeSegment;

/// Ids to query, grouped by segment. The provider wire shape.
pub type IdsBySegment = HashMap<ExchangeSegment, Vec<i64>>;

/// Raw per-id OHLC quote as a provider returns it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OhlcQuote {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub last_price: f64,
    pub volume: u64,
}

/// Labeled OHLC row handed to callers, with the day change precomputed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OhlcData {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub last_price: f64,
    pub change_percent: f64,
}

/// Quote/OHLC endpoints keyed by numeric id.
///
/// The engine's outbound boundary for market data. Production transports are
/// out of scope here; tests implement this with canned maps.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn ltp(&self, ids: &IdsBySegment) -> Result<HashMap<ExchangeSegment, HashMap<i64, f64>>>;

    async fn ohlc(
        &self,
        ids: &IdsBySegment,
    ) -> Result<HashMap<ExchangeSegment, HashMap<i64, OhlcQuote>>>;
}

/// Last traded prices keyed by the caller's symbols.
#[derive(Debug, Clone, Default)]
pub struct LtpResult {
    pub prices: HashMap<String, f64>,
    /// Symbols that did not resolve to any security id.
    pub missing: Vec<String>,
}

/// OHLC rows keyed by the caller's symbols.
#[derive(Debug, Clone, Default)]
pub struct OhlcResult {
    pub quotes: HashMap<String, OhlcData>,
    pub missing: Vec<String>,
}

pub struct MarketDataClient {
    instruments: Arc<InstrumentService>,
    provider: Arc<dyn MarketDataProvider>,
}

impl MarketDataClient {
    pub fn new(instruments: Arc<InstrumentService>, provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            instruments,
            provider,
        }
    }

    /// Last traded price for each symbol. Unresolved symbols land in
    /// `missing`; resolved ids the provider stays silent on are simply
    /// absent from `prices`.
    pub async fn get_ltp(&self, symbols: &[String], segment: &ExchangeSegment) -> Result<LtpResult> {
        self.instruments
            .ensure_fresh()
            .await
            .context("instrument cache bootstrap")?;

        let resolution = self.instruments.resolve_batch(symbols, segment);
        let mut result = LtpResult {
            prices: HashMap::new(),
            missing: resolution.missing,
        };
        if resolution.found.is_empty() {
            warn!(segment = %segment, "✗ No symbols resolved, skipping LTP call");
            return Ok(result);
        }

        let payload = Self::payload(segment, &resolution.found);
        info!(segment = %segment, count = resolution.found.len(), "Fetching LTP");
        let response = self.provider.ltp(&payload).await.context("provider ltp call")?;

        if let Some(by_id) = response.get(segment) {
            for (id, price) in by_id {
                let Some(symbol) = self.instruments.resolve_symbol(segment, *id) else {
                    warn!(segment = %segment, id, "Provider returned an id nobody can name, skipping");
                    continue;
                };
                result.prices.insert(symbol, *price);
            }
        }

        info!(
            requested = symbols.len(),
            priced = result.prices.len(),
            missing = result.missing.len(),
            "✓ LTP batch complete"
        );
        Ok(result)
    }

    /// OHLC for each symbol, with `change_percent` computed from close to
    /// last trade. Same resolution and labeling rules as [`get_ltp`](Self::get_ltp).
    pub async fn get_ohlc(
        &self,
        symbols: &[String],
        segment: &ExchangeSegment,
    ) -> Result<OhlcResult> {
        self.instruments
            .ensure_fresh()
            .await
            .context("instrument cache bootstrap")?;

        let resolution = self.instruments.resolve_batch(symbols, segment);
        let mut result = OhlcResult {
            quotes: HashMap::new(),
            missing: resolution.missing,
        };
        if resolution.found.is_empty() {
            warn!(segment = %segment, "✗ No symbols resolved, skipping OHLC call");
            return Ok(result);
        }

        let payload = Self::payload(segment, &resolution.found);
        info!(segment = %segment, count = resolution.found.len(), "Fetching OHLC");
        let response = self
            .provider
            .ohlc(&payload)
            .await
            .context("provider ohlc call")?;

        if let Some(by_id) = response.get(segment) {
            for (id, quote) in by_id {
                let Some(symbol) = self.instruments.resolve_symbol(segment, *id) else {
                    warn!(segment = %segment, id, "Provider returned an id nobody can name, skipping");
                    continue;
                };
                result.quotes.insert(
                    symbol,
                    OhlcData {
                        open: quote.open,
                        high: quote.high,
                        low: quote.low,
                        close: quote.close,
                        volume: quote.volume,
                        last_price: quote.last_price,
                        change_percent: change_percent(quote.close, quote.last_price),
                    },
                );
            }
        }

        info!(
            requested = symbols.len(),
            quoted = result.quotes.len(),
            missing = result.missing.len(),
            "✓ OHLC batch complete"
        );
        Ok(result)
    }

    fn payload(segment: &ExchangeSegment, found: &HashMap<String, i64>) -> IdsBySegment {
        let mut ids: Vec<i64> = found.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        HashMap::from([(segment.clone(), ids)])
    }
}

/// Day change from close to last trade, rounded to two decimals.
/// Zero close (index rows before open, fresh listings) yields zero.
fn change_percent(close: f64, last_price: f64) -> f64 {
    if close == 0.0 {
        return 0.0;
    }
    let pct = (last_price - close) / close * 100.0;
    (pct * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::feed::{FeedBatch, InstrumentFeed};
    use crate::instruments::types::{FeedError, InstrumentRecord};
    use crate::models::InstrumentsConfig;

    struct StaticFeed {
        rows: Vec<InstrumentRecord>,
    }

    #[async_trait]
    impl InstrumentFeed for StaticFeed {
        async fn fetch_segment(&self, segment: &ExchangeSegment) -> Result<FeedBatch, FeedError> {
            let records: Vec<InstrumentRecord> = self
                .rows
                .iter()
                .filter(|r| &r.exchange_segment == segment)
                .cloned()
                .collect();
            Ok(FeedBatch {
                records,
                byte_size: 0,
                rows_skipped: 0,
            })
        }
    }

    struct CannedProvider {
        ltp: HashMap<ExchangeSegment, HashMap<i64, f64>>,
        ohlc: HashMap<ExchangeSegment, HashMap<i64, OhlcQuote>>,
    }

    #[async_trait]
    impl MarketDataProvider for CannedProvider {
        async fn ltp(
            &self,
            _ids: &IdsBySegment,
        ) -> Result<HashMap<ExchangeSegment, HashMap<i64, f64>>> {
            Ok(self.ltp.clone())
        }

        async fn ohlc(
            &self,
            _ids: &IdsBySegment,
        ) -> Result<HashMap<ExchangeSegment, HashMap<i64, OhlcQuote>>> {
            Ok(self.ohlc.clone())
        }
    }

    fn rec(segment: &ExchangeSegment, id: i64, symbol: &str, display: &str) -> InstrumentRecord {
        InstrumentRecord {
            exchange_segment: segment.clone(),
            security_id: id,
            symbol: symbol.to_string(),
            isin: None,
            display_name: display.to_string(),
        }
    }

    async fn client_with(provider: CannedProvider) -> (MarketDataClient, ExchangeSegment) {
        let nse = ExchangeSegment::nse_eq();
        let feed = StaticFeed {
            rows: vec![
                rec(&nse, 11536, "TCS", "TATA CONSULTANCY SERV LT"),
                rec(&nse, 2885, "RELIANCE", "RELIANCE INDUSTRIES"),
            ],
        };
        let config = InstrumentsConfig {
            segments: vec![nse.clone()],
            ..InstrumentsConfig::default()
        };
        let service =
            InstrumentService::with_feed(config, Arc::new(feed)).expect("service");
        service.initialize().await.expect("bootstrap");
        (
            MarketDataClient::new(service, Arc::new(provider)),
            nse,
        )
    }

    #[tokio::test]
    async fn test_get_ltp_labels_back_to_caller_symbols() {
        let nse = ExchangeSegment::nse_eq();
        let provider = CannedProvider {
            ltp: HashMap::from([(
                nse.clone(),
                HashMap::from([(11536, 3500.25), (2885, 2450.50)]),
            )]),
            ohlc: HashMap::new(),
        };
        let (client, nse) = client_with(provider).await;

        let symbols = vec!["tcs".to_string(), "RELIANCE".to_string(), "GHOST".to_string()];
        let result = client.get_ltp(&symbols, &nse).await.expect("ltp");

        // Prices keyed by the caller's own spelling, misses reported aside.
        assert_eq!(result.prices.get("tcs"), Some(&3500.25));
        assert_eq!(result.prices.get("RELIANCE"), Some(&2450.50));
        assert_eq!(result.missing, vec!["GHOST".to_string()]);
    }

    #[tokio::test]
    async fn test_get_ltp_skips_unlabelable_ids() {
        let nse = ExchangeSegment::nse_eq();
        let provider = CannedProvider {
            // 424242 is not in the instrument master at all.
            ltp: HashMap::from([(
                nse.clone(),
                HashMap::from([(11536, 3500.25), (424242, 1.0)]),
            )]),
            ohlc: HashMap::new(),
        };
        let (client, nse) = client_with(provider).await;

        let symbols = vec!["TCS".to_string()];
        let result = client.get_ltp(&symbols, &nse).await.expect("ltp");
        assert_eq!(result.prices.len(), 1);
        assert_eq!(result.prices.get("TCS"), Some(&3500.25));
    }

    #[tokio::test]
    async fn test_get_ohlc_computes_change_percent() {
        let nse = ExchangeSegment::nse_eq();
        let provider = CannedProvider {
            ltp: HashMap::new(),
            ohlc: HashMap::from([(
                nse.clone(),
                HashMap::from([(
                    11536,
                    OhlcQuote {
                        open: 3400.0,
                        high: 3550.0,
                        low: 3380.0,
                        close: 3400.0,
                        last_price: 3500.25,
                        volume: 1_250_000,
                    },
                )]),
            )]),
        };
        let (client, nse) = client_with(provider).await;

        let symbols = vec!["TCS".to_string()];
        let result = client.get_ohlc(&symbols, &nse).await.expect("ohlc");
        let tcs = result.quotes.get("TCS").expect("quote");
        assert_eq!(tcs.close, 3400.0);
        assert_eq!(tcs.volume, 1_250_000);
        assert_eq!(tcs.change_percent, 2.95);
    }

    #[tokio::test]
    async fn test_no_resolved_symbols_short_circuits() {
        let provider = CannedProvider {
            ltp: HashMap::new(),
            ohlc: HashMap::new(),
        };
        let (client, nse) = client_with(provider).await;

        let symbols = vec!["GHOST".to_string()];
        let result = client.get_ltp(&symbols, &nse).await.expect("ltp");
        assert!(result.prices.is_empty());
        assert_eq!(result.missing, vec!["GHOST".to_string()]);
    }

    #[test]
    fn test_change_percent_edge_cases() {
        assert_eq!(change_percent(100.0, 105.0), 5.0);
        assert_eq!(change_percent(0.0, 105.0), 0.0);
        assert_eq!(change_percent(3.0, 4.0), 33.33);
        assert_eq!(change_percent(100.0, 95.5), -4.5);
    }
}
