//! Symbol-to-id resolution with an explicit priority order.
//!
//! The lookup ladder is data (`DEFAULT_RESOLUTION_ORDER`), not nested
//! conditionals: ISIN first because it is the only globally unambiguous
//! identifier, then the requested segment, an uppercase retry for callers
//! that bypass normalization, and finally the fallback segment.

use std::sync::Arc;
use tracing::{debug, warn};

use super::store::InstrumentStore;
use super::types::{usable_isin, BatchResolution, ExchangeSegment, NotFound};
use crate::models::InstrumentsConfig;

/// One rung of the resolution ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    /// Authoritative: an ISIN hint short-circuits everything else.
    IsinLookup,
    /// Symbol as given, in the requested segment.
    PrimarySymbol,
    /// Symbol uppercased, in the requested segment.
    UppercaseSymbol,
    /// Symbol in the configured fallback segment.
    SecondarySymbol,
}

impl ResolutionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStep::IsinLookup => "isin",
            ResolutionStep::PrimarySymbol => "primary_symbol",
            ResolutionStep::UppercaseSymbol => "uppercase_symbol",
            ResolutionStep::SecondarySymbol => "secondary_symbol",
        }
    }
}

pub const DEFAULT_RESOLUTION_ORDER: [ResolutionStep; 4] = [
    ResolutionStep::IsinLookup,
    ResolutionStep::PrimarySymbol,
    ResolutionStep::UppercaseSymbol,
    ResolutionStep::SecondarySymbol,
];

/// Stateless lookup logic over the store. Cheap to clone per consumer.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<InstrumentStore>,
    secondary_segment: ExchangeSegment,
    suggestion_limit: usize,
    order: Vec<ResolutionStep>,
}

impl Resolver {
    pub fn new(store: Arc<InstrumentStore>, config: &InstrumentsConfig) -> Self {
        Self {
            store,
            secondary_segment: config.secondary_segment.clone(),
            suggestion_limit: config.suggestion_limit,
            order: DEFAULT_RESOLUTION_ORDER.to_vec(),
        }
    }

    /// Override the ladder. Mostly for tests proving order independence.
    pub fn with_order(mut self, order: Vec<ResolutionStep>) -> Self {
        self.order = order;
        self
    }

    pub fn resolution_order(&self) -> &[ResolutionStep] {
        &self.order
    }

    pub fn store(&self) -> &Arc<InstrumentStore> {
        &self.store
    }

    /// Resolve one caller symbol to a security id.
    ///
    /// `segment` is the primary segment for this call. A usable `isin` hint
    /// wins immediately, even when it points into another segment. A total
    /// miss returns `NotFound` and logs near-match suggestions; it is never
    /// logged as an error because unknown symbols are an expected outcome.
    pub fn resolve_one(
        &self,
        symbol: &str,
        segment: &ExchangeSegment,
        isin: Option<&str>,
    ) -> Result<i64, NotFound> {
        for step in &self.order {
            if let Some(id) = self.try_step(*step, symbol, segment, isin) {
                debug!(
                    symbol = symbol,
                    segment = %segment,
                    step = step.as_str(),
                    security_id = id,
                    "Symbol resolved"
                );
                self.store.metrics().record_hit();
                return Ok(id);
            }
        }

        self.store.metrics().record_miss();
        self.log_miss(symbol, segment);
        Err(NotFound {
            symbol: symbol.to_string(),
            segment: segment.clone(),
        })
    }

    fn try_step(
        &self,
        step: ResolutionStep,
        symbol: &str,
        segment: &ExchangeSegment,
        isin: Option<&str>,
    ) -> Option<i64> {
        match step {
            ResolutionStep::IsinLookup => {
                let hint = isin.and_then(usable_isin)?;
                self.store.lookup_by_isin(hint).map(|(_, id)| id)
            }
            ResolutionStep::PrimarySymbol => self.store.lookup_by_symbol(segment, symbol),
            ResolutionStep::UppercaseSymbol => {
                let upper = symbol.trim().to_uppercase();
                if upper == symbol {
                    return None;
                }
                self.store.lookup_by_symbol(segment, &upper)
            }
            ResolutionStep::SecondarySymbol => {
                if self.secondary_segment == *segment {
                    return None;
                }
                self.store.lookup_by_symbol(&self.secondary_segment, symbol)
            }
        }
    }

    /// Resolve a batch in one pass. Misses land in `missing`; a batch never
    /// fails wholly because one symbol is unknown.
    pub fn resolve_batch(&self, symbols: &[String], segment: &ExchangeSegment) -> BatchResolution {
        let mut resolution = BatchResolution::default();

        for symbol in symbols {
            match self.resolve_one(symbol, segment, None) {
                Ok(id) => {
                    resolution.found.insert(symbol.clone(), id);
                }
                Err(_) => resolution.missing.push(symbol.clone()),
            }
        }

        if !resolution.missing.is_empty() {
            warn!(
                segment = %segment,
                found = resolution.found.len(),
                missing = resolution.missing.len(),
                "Batch resolution finished with unresolved symbols"
            );
        }
        resolution
    }

    /// Reverse lookup against the store's own index. Callers that need the
    /// caller-preferred spelling go through `ReverseSymbolOverlay` instead.
    pub fn resolve_symbol(&self, segment: &ExchangeSegment, id: i64) -> Option<String> {
        let symbol = self.store.lookup_by_id(segment, id);
        match symbol {
            Some(_) => self.store.metrics().record_hit(),
            None => self.store.metrics().record_miss(),
        }
        symbol
    }

    fn log_miss(&self, symbol: &str, segment: &ExchangeSegment) {
        let suggestions = self
            .store
            .search_by_substring(segment, symbol, self.suggestion_limit);
        if suggestions.is_empty() {
            warn!(symbol = symbol, segment = %segment, "Symbol not found");
        } else {
            let similar: Vec<String> = suggestions
                .iter()
                .map(|(sym, id)| format!("{} ({})", sym, id))
                .collect();
            warn!(
                symbol = symbol,
                segment = %segment,
                similar = %similar.join(", "),
                "Symbol not found, near matches listed"
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
