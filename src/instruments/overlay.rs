//! Caller-facing reverse symbol overlay.
//!
//! Providers key quote responses by numeric security id, and their own
//! reverse names are often verbose display forms ("TATA CONSULTANCY SERV LT")
//! rather than the short symbol the caller asked with ("TCS"). The instrument
//! service owns one overlay; every successful resolution records the caller's
//! spelling so provider responses can be labeled the way the caller expects.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::warn;

use super::store::InstrumentStore;
use super::types::ExchangeSegment;

#[derive(Debug, Default)]
struct OverlayMaps {
    /// (segment, security id) -> caller symbol.
    by_id: HashMap<(ExchangeSegment, i64), String>,
    /// ISIN -> caller symbol last resolved for it.
    by_isin: HashMap<String, String>,
}

/// Id -> caller-symbol overlay. Never evicted; bounded by the number of
/// distinct symbols ever resolved through the owning service.
#[derive(Debug, Default)]
pub struct ReverseSymbolOverlay {
    maps: RwLock<OverlayMaps>,
}

impl ReverseSymbolOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful resolution of `caller_symbol` to `(segment, id)`.
    pub fn record(
        &self,
        segment: &ExchangeSegment,
        id: i64,
        caller_symbol: &str,
        isin: Option<&str>,
    ) {
        let mut maps = self.maps.write();
        maps.by_id
            .insert((segment.clone(), id), caller_symbol.to_string());
        if let Some(isin) = isin {
            maps.by_isin.insert(isin.to_string(), caller_symbol.to_string());
        }
    }

    /// The caller symbol recorded for `(segment, id)`, if any.
    pub fn symbol_for(&self, segment: &ExchangeSegment, id: i64) -> Option<String> {
        self.maps.read().by_id.get(&(segment.clone(), id)).cloned()
    }

    /// The caller symbol last resolved for `isin`, if any.
    pub fn symbol_for_isin(&self, isin: &str) -> Option<String> {
        self.maps.read().by_isin.get(isin).cloned()
    }

    /// Label a provider-returned id with the caller's symbol.
    ///
    /// Tries, in order: the overlay itself, the ISIN-indirect path (the id's
    /// ISIN may have been resolved under a different segment), and finally
    /// the store's raw reverse index. The last resort means this id was never
    /// explicitly resolved by this caller, which is worth a warning.
    pub fn reverse_lookup(
        &self,
        store: &InstrumentStore,
        segment: &ExchangeSegment,
        id: i64,
    ) -> Option<String> {
        if let Some(symbol) = self.symbol_for(segment, id) {
            return Some(symbol);
        }

        if let Some(isin) = store.isin_of(segment, id) {
            if let Some(symbol) = self.symbol_for_isin(&isin) {
                return Some(symbol);
            }
        }

        let raw = store.lookup_by_id(segment, id);
        if let Some(ref symbol) = raw {
            warn!(
                segment = %segment,
                security_id = id,
                symbol = %symbol,
                "Reverse lookup fell through to the store's own name for an id this client never resolved"
            );
        }
        raw
    }

    pub fn len(&self) -> usize {
        self.maps.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::types::InstrumentRecord;

    fn record(
        segment: &ExchangeSegment,
        id: i64,
        symbol: &str,
        isin: Option<&str>,
    ) -> InstrumentRecord {
        InstrumentRecord {
            exchange_segment: segment.clone(),
            security_id: id,
            symbol: symbol.to_string(),
            isin: isin.map(|s| s.to_string()),
            display_name: format!("{} LIMITED", symbol),
        }
    }

    #[test]
    fn test_overlay_prefers_caller_symbol() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        store.load_segment(&nse, vec![record(&nse, 1, "TATA CONSULTANCY SERV LT", None)]);

        let overlay = ReverseSymbolOverlay::new();
        overlay.record(&nse, 1, "TCS", None);

        assert_eq!(overlay.reverse_lookup(&store, &nse, 1).as_deref(), Some("TCS"));
    }

    #[test]
    fn test_isin_indirect_path_crosses_segments() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        let bse = ExchangeSegment::bse_eq();
        store.load_segment(&nse, vec![record(&nse, 5, "FOO", Some("INE999X01011"))]);
        store.load_segment(&bse, vec![record(&bse, 900005, "FOO-B", Some("INE999X01011"))]);

        let overlay = ReverseSymbolOverlay::new();
        overlay.record(&nse, 5, "FOO", Some("INE999X01011"));

        // Provider answered with the BSE id; the caller only ever said "FOO".
        assert_eq!(
            overlay.reverse_lookup(&store, &bse, 900005).as_deref(),
            Some("FOO")
        );
    }

    #[test]
    fn test_falls_back_to_store_reverse_index() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        store.load_segment(&nse, vec![record(&nse, 2, "RELIANCE", None)]);

        let overlay = ReverseSymbolOverlay::new();
        assert_eq!(
            overlay.reverse_lookup(&store, &nse, 2).as_deref(),
            Some("RELIANCE")
        );
        assert_eq!(overlay.reverse_lookup(&store, &nse, 999), None);
    }

    #[test]
    fn test_latest_resolution_wins_for_isin() {
        let overlay = ReverseSymbolOverlay::new();
        let nse = ExchangeSegment::nse_eq();
        overlay.record(&nse, 5, "FOO", Some("INE999X01011"));
        overlay.record(&nse, 5, "FOO.NS", Some("INE999X01011"));

        assert_eq!(overlay.symbol_for_isin("INE999X01011").as_deref(), Some("FOO.NS"));
        assert_eq!(overlay.len(), 1);
    }
}
