//! Instrument index storage with lock-free snapshot reads.
//!
//! This module provides:
//! 1. SegmentSnapshot - Immutable per-segment indexes built off to the side
//! 2. InstrumentStore - ArcSwap-published snapshots, readers never block
//! 3. Shared ISIN index with NSE-over-BSE conflict rule
//! 4. Atomic counters for resolution hit-rate reporting
//!
//! Design principles:
//! - Lookups touch in-memory maps only, never I/O and never a writer lock
//! - A segment's contents are replaced as a whole or not at all
//! - Refresh failures leave the previous snapshot serving

use arc_swap::ArcSwap;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, info, warn};

use super::types::{usable_isin, CacheStats, ExchangeSegment, InstrumentRecord};

// ============================================================================
// Segment snapshots
// ============================================================================

/// Immutable index of one exchange segment. Built locally during a load and
/// swapped into the store in one atomic publish, so a reader holding any one
/// snapshot sees a single consistent generation of the segment.
#[derive(Debug)]
pub struct SegmentSnapshot {
    segment: ExchangeSegment,
    /// Uppercase symbol -> security id.
    symbol_to_id: HashMap<String, i64>,
    /// Security id -> symbol as the feed provided it.
    id_to_symbol: HashMap<i64, String>,
    /// Security id -> ISIN, for rows that carry one.
    id_to_isin: HashMap<i64, String>,
    records: Vec<InstrumentRecord>,
    built_at: DateTime<Utc>,
}

impl SegmentSnapshot {
    fn empty(segment: ExchangeSegment) -> Self {
        Self {
            segment,
            symbol_to_id: HashMap::new(),
            id_to_symbol: HashMap::new(),
            id_to_isin: HashMap::new(),
            records: Vec::new(),
            built_at: Utc::now(),
        }
    }

    /// Build the per-segment indexes from feed records.
    ///
    /// Rows whose uppercase symbol or security id collide with an earlier row
    /// are dropped (first row wins), which keeps the forward and reverse maps
    /// exact inverses of each other.
    fn build(segment: ExchangeSegment, records: Vec<InstrumentRecord>) -> (Self, u64) {
        let mut symbol_to_id = HashMap::with_capacity(records.len());
        let mut id_to_symbol = HashMap::with_capacity(records.len());
        let mut id_to_isin = HashMap::new();
        let mut kept = Vec::with_capacity(records.len());
        let mut duplicates = 0u64;

        for record in records {
            let key = record.symbol.trim().to_uppercase();
            if key.is_empty() {
                duplicates += 1;
                continue;
            }
            if symbol_to_id.contains_key(&key) || id_to_symbol.contains_key(&record.security_id) {
                duplicates += 1;
                continue;
            }

            symbol_to_id.insert(key, record.security_id);
            id_to_symbol.insert(record.security_id, record.symbol.trim().to_string());
            if let Some(isin) = record.isin.as_deref().and_then(usable_isin) {
                id_to_isin.insert(record.security_id, isin.to_string());
            }
            kept.push(record);
        }

        (
            Self {
                segment,
                symbol_to_id,
                id_to_symbol,
                id_to_isin,
                records: kept,
                built_at: Utc::now(),
            },
            duplicates,
        )
    }

    #[inline]
    pub fn segment(&self) -> &ExchangeSegment {
        &self.segment
    }

    /// Symbol lookup, case-insensitive. Probes the trimmed input directly
    /// when it is already uppercase so the hot path does not allocate.
    #[inline]
    pub fn id_for_symbol(&self, symbol: &str) -> Option<i64> {
        let trimmed = symbol.trim();
        if trimmed.bytes().any(|b| b.is_ascii_lowercase()) {
            self.symbol_to_id.get(&trimmed.to_uppercase()).copied()
        } else {
            self.symbol_to_id.get(trimmed).copied()
        }
    }

    #[inline]
    pub fn symbol_for_id(&self, id: i64) -> Option<&str> {
        self.id_to_symbol.get(&id).map(|s| s.as_str())
    }

    #[inline]
    pub fn isin_for_id(&self, id: i64) -> Option<&str> {
        self.id_to_isin.get(&id).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.id_to_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_symbol.is_empty()
    }

    pub fn records(&self) -> &[InstrumentRecord] {
        &self.records
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Linear substring scan over symbols. Diagnostics only, not a hot path.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, i64)> {
        let needle = query.trim().to_uppercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut matches = Vec::new();
        for (symbol, id) in &self.symbol_to_id {
            if symbol.contains(&needle) {
                matches.push((symbol.clone(), *id));
                if matches.len() >= limit {
                    break;
                }
            }
        }
        matches
    }

    /// ISIN pairs in feed row order, for the shared index rebuild.
    fn isin_entries(&self) -> impl Iterator<Item = (&str, i64)> {
        self.records.iter().filter_map(|record| {
            record
                .isin
                .as_deref()
                .and_then(usable_isin)
                .map(|isin| (isin, record.security_id))
        })
    }
}

/// State of one segment in the store.
#[derive(Debug)]
struct SegmentSlot {
    /// The actual index data (swapped atomically).
    snapshot: ArcSwap<SegmentSnapshot>,
    /// Whether this segment has been populated at least once.
    is_loaded: AtomicBool,
    /// Wall-clock time of the last successful load, epoch millis (0 = never).
    last_refreshed_ms: AtomicI64,
    load_count: AtomicU64,
}

impl SegmentSlot {
    fn new(segment: ExchangeSegment) -> Self {
        Self {
            snapshot: ArcSwap::new(Arc::new(SegmentSnapshot::empty(segment))),
            is_loaded: AtomicBool::new(false),
            last_refreshed_ms: AtomicI64::new(0),
            load_count: AtomicU64::new(0),
        }
    }

    fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        let ms = self.last_refreshed_ms.load(Ordering::Acquire);
        if ms == 0 {
            return None;
        }
        Utc.timestamp_millis_opt(ms).single()
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Resolution and refresh counters. Relaxed ordering, read for stats only.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    pub resolve_hits: AtomicU64,
    pub resolve_misses: AtomicU64,
    pub segments_loaded: AtomicU64,
    pub segment_load_failures: AtomicU64,
    pub rows_skipped: AtomicU64,
}

impl StoreMetrics {
    #[inline]
    pub fn record_hit(&self) {
        self.resolve_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.resolve_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Hits over total lookups, 1.0 when nothing has been resolved yet.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.resolve_hits.load(Ordering::Relaxed);
        let misses = self.resolve_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            1.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// ============================================================================
// InstrumentStore - single source of truth for instrument identity
// ============================================================================

pub struct InstrumentStore {
    /// Segment registry (segment -> slot).
    segments: RwLock<HashMap<ExchangeSegment, Arc<SegmentSlot>>>,
    /// Shared ISIN index, rebuilt from all loaded segments on every swap.
    isin_index: ArcSwap<HashMap<String, (ExchangeSegment, i64)>>,
    /// Serializes segment swaps with the ISIN index rebuild. Writers only.
    merge_lock: Mutex<()>,
    metrics: StoreMetrics,
}

impl InstrumentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            segments: RwLock::new(HashMap::with_capacity(8)),
            isin_index: ArcSwap::new(Arc::new(HashMap::new())),
            merge_lock: Mutex::new(()),
            metrics: StoreMetrics::default(),
        })
    }

    fn ensure_segment(&self, segment: &ExchangeSegment) -> Arc<SegmentSlot> {
        // Fast path: slot exists
        {
            let segments = self.segments.read();
            if let Some(slot) = segments.get(segment) {
                return Arc::clone(slot);
            }
        }

        // Slow path: insert
        let mut segments = self.segments.write();
        segments
            .entry(segment.clone())
            .or_insert_with(|| Arc::new(SegmentSlot::new(segment.clone())))
            .clone()
    }

    /// Replace one segment's contents wholesale.
    ///
    /// The snapshot is built off to the side, published with a single swap,
    /// and then the shared ISIN index is rebuilt from every loaded segment.
    /// Readers observe either the previous generation or this one, never a
    /// mix. Returns the number of instruments indexed.
    pub fn load_segment(&self, segment: &ExchangeSegment, records: Vec<InstrumentRecord>) -> usize {
        let (snapshot, duplicates) = SegmentSnapshot::build(segment.clone(), records);
        let count = snapshot.len();

        if duplicates > 0 {
            warn!(
                segment = %segment,
                duplicates,
                "Dropped duplicate rows while building segment index"
            );
            self.metrics
                .rows_skipped
                .fetch_add(duplicates, Ordering::Relaxed);
        }

        let slot = self.ensure_segment(segment);

        {
            let _guard = self.merge_lock.lock();
            slot.snapshot.store(Arc::new(snapshot));
            slot.is_loaded.store(true, Ordering::Release);
            self.rebuild_isin_index();
        }

        // Wall-clock can step backwards across NTP corrections; keep the
        // refresh timestamp monotonic regardless.
        slot.last_refreshed_ms
            .fetch_max(Utc::now().timestamp_millis(), Ordering::AcqRel);
        slot.load_count.fetch_add(1, Ordering::Relaxed);
        self.metrics.segments_loaded.fetch_add(1, Ordering::Relaxed);

        info!(segment = %segment, count, "📊 Segment index swapped in");
        count
    }

    /// Rebuild the shared ISIN index from all loaded segments.
    ///
    /// Segments are visited in name order and rows in feed order. An
    /// NSE-class row always takes the entry; any other row takes it only
    /// while the ISIN is unclaimed. NSE-over-BSE therefore holds regardless
    /// of segment load order, and a duplicated ISIN lands on the same row
    /// in every rebuild. Caller must hold `merge_lock`.
    fn rebuild_isin_index(&self) {
        let snapshots: Vec<Arc<SegmentSnapshot>> = {
            let segments = self.segments.read();
            let mut loaded: Vec<_> = segments
                .iter()
                .filter(|(_, slot)| slot.is_loaded.load(Ordering::Acquire))
                .map(|(seg, slot)| (seg.clone(), slot.snapshot.load_full()))
                .collect();
            loaded.sort_by(|a, b| a.0.cmp(&b.0));
            loaded.into_iter().map(|(_, snap)| snap).collect()
        };

        let mut index: HashMap<String, (ExchangeSegment, i64)> = HashMap::new();
        for snapshot in &snapshots {
            let segment = snapshot.segment();
            for (isin, id) in snapshot.isin_entries() {
                if segment.is_nse() || !index.contains_key(isin) {
                    index.insert(isin.to_string(), (segment.clone(), id));
                }
            }
        }

        debug!(isins = index.len(), "Rebuilt shared ISIN index");
        self.isin_index.store(Arc::new(index));
    }

    // ------------------------------------------------------------------
    // Lookups (non-blocking, in-memory only)
    // ------------------------------------------------------------------

    /// Case-insensitive symbol lookup within one segment.
    #[inline]
    pub fn lookup_by_symbol(&self, segment: &ExchangeSegment, symbol: &str) -> Option<i64> {
        self.snapshot(segment)?.id_for_symbol(symbol)
    }

    /// ISIN lookup against the shared index. Feed rows carry uppercase
    /// ISINs, so a lowercase query is uppercased before the map read.
    #[inline]
    pub fn lookup_by_isin(&self, isin: &str) -> Option<(ExchangeSegment, i64)> {
        let trimmed = isin.trim();
        let index = self.isin_index.load();
        if trimmed.bytes().any(|b| b.is_ascii_lowercase()) {
            index.get(&trimmed.to_uppercase()).cloned()
        } else {
            index.get(trimmed).cloned()
        }
    }

    /// Reverse lookup: security id -> symbol as the feed provided it.
    #[inline]
    pub fn lookup_by_id(&self, segment: &ExchangeSegment, id: i64) -> Option<String> {
        self.snapshot(segment)?
            .symbol_for_id(id)
            .map(|s| s.to_string())
    }

    /// ISIN carried by a specific instrument, if any.
    #[inline]
    pub fn isin_of(&self, segment: &ExchangeSegment, id: i64) -> Option<String> {
        self.snapshot(segment)?.isin_for_id(id).map(|s| s.to_string())
    }

    /// Substring suggestions for a failed lookup. Linear scan, diagnostics
    /// only.
    pub fn search_by_substring(
        &self,
        segment: &ExchangeSegment,
        query: &str,
        limit: usize,
    ) -> Vec<(String, i64)> {
        match self.snapshot(segment) {
            Some(snapshot) => snapshot.search(query, limit),
            None => Vec::new(),
        }
    }

    /// Current snapshot of a loaded segment. One load gives one consistent
    /// generation of the whole segment.
    pub fn snapshot(&self, segment: &ExchangeSegment) -> Option<Arc<SegmentSnapshot>> {
        let segments = self.segments.read();
        let slot = segments.get(segment)?;
        if !slot.is_loaded.load(Ordering::Acquire) {
            return None;
        }
        Some(slot.snapshot.load_full())
    }

    // ------------------------------------------------------------------
    // Bookkeeping
    // ------------------------------------------------------------------

    pub fn is_loaded(&self, segment: &ExchangeSegment) -> bool {
        let segments = self.segments.read();
        segments
            .get(segment)
            .map(|slot| slot.is_loaded.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// True once any segment has been populated.
    pub fn has_data(&self) -> bool {
        let segments = self.segments.read();
        segments
            .values()
            .any(|slot| slot.is_loaded.load(Ordering::Acquire))
    }

    pub fn loaded_segments(&self) -> Vec<ExchangeSegment> {
        let segments = self.segments.read();
        let mut loaded: Vec<_> = segments
            .iter()
            .filter(|(_, slot)| slot.is_loaded.load(Ordering::Acquire))
            .map(|(segment, _)| segment.clone())
            .collect();
        loaded.sort();
        loaded
    }

    pub fn segment_count(&self, segment: &ExchangeSegment) -> usize {
        self.snapshot(segment).map(|s| s.len()).unwrap_or(0)
    }

    pub fn last_refreshed(&self, segment: &ExchangeSegment) -> Option<DateTime<Utc>> {
        let segments = self.segments.read();
        segments.get(segment).and_then(|slot| slot.last_refreshed())
    }

    /// Restore a persisted refresh time after a warm start from disk.
    /// Deliberately overwrites the swap stamp: the freshness clock must say
    /// when the rows were fetched from the feed, not when they were loaded
    /// back from disk, or a stale warm start would never trigger a refetch.
    /// Only called during bootstrap, before the first feed refresh.
    pub(crate) fn restore_refresh_time(&self, segment: &ExchangeSegment, when: DateTime<Utc>) {
        let slot = self.ensure_segment(segment);
        slot.last_refreshed_ms
            .store(when.timestamp_millis(), Ordering::Release);
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> CacheStats {
        let mut per_segment = BTreeMap::new();
        let mut total = 0usize;
        let mut last_refreshed_at: Option<DateTime<Utc>> = None;

        {
            let segments = self.segments.read();
            for (segment, slot) in segments.iter() {
                if !slot.is_loaded.load(Ordering::Acquire) {
                    continue;
                }
                let count = slot.snapshot.load().len();
                per_segment.insert(segment.to_string(), count);
                total += count;
                if let Some(ts) = slot.last_refreshed() {
                    last_refreshed_at = Some(match last_refreshed_at {
                        Some(prev) if prev >= ts => prev,
                        _ => ts,
                    });
                }
            }
        }

        CacheStats {
            instrument_count: total,
            segments: per_segment,
            last_refreshed_at,
            resolve_hits: self.metrics.resolve_hits.load(Ordering::Relaxed),
            resolve_misses: self.metrics.resolve_misses.load(Ordering::Relaxed),
            hit_rate: self.metrics.hit_rate(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_load_and_roundtrip() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();

        let count = store.load_segment(
            &nse,
            vec![
                record(&nse, 1, "TCS", Some("INE467B01029")),
                record(&nse, 2, "RELIANCE", Some("INE002A01018")),
            ],
        );

        assert_eq!(count, 2);
        assert_eq!(store.lookup_by_symbol(&nse, "TCS"), Some(1));
        assert_eq!(store.lookup_by_id(&nse, 1).as_deref(), Some("TCS"));
        assert_eq!(store.segment_count(&nse), 2);
        assert!(store.last_refreshed(&nse).is_some());
    }

    #[test]
    fn test_forward_and_reverse_stay_inverse_under_duplicates() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();

        store.load_segment(
            &nse,
            vec![
                record(&nse, 1, "TCS", None),
                record(&nse, 2, "TCS", None),  // duplicate symbol
                record(&nse, 1, "TCSX", None), // duplicate id
            ],
        );

        assert_eq!(store.segment_count(&nse), 1);
        let snapshot = store.snapshot(&nse).unwrap();
        for rec in snapshot.records() {
            let symbol = snapshot.symbol_for_id(rec.security_id).unwrap();
            assert_eq!(snapshot.id_for_symbol(symbol), Some(rec.security_id));
        }
        assert_eq!(store.lookup_by_id(&nse, 2), None);
    }

    #[test]
    fn test_symbol_lookup_is_case_insensitive() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        store.load_segment(&nse, vec![record(&nse, 1, "TCS", None)]);

        assert_eq!(store.lookup_by_symbol(&nse, "TCS"), Some(1));
        assert_eq!(store.lookup_by_symbol(&nse, "tcs"), Some(1));
        assert_eq!(store.lookup_by_symbol(&nse, " Tcs "), Some(1));
    }

    #[test]
    fn test_isin_prefers_nse_when_bse_loads_first() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        let bse = ExchangeSegment::bse_eq();

        store.load_segment(&bse, vec![record(&bse, 900005, "FOO-B", Some("INE999X01011"))]);
        store.load_segment(&nse, vec![record(&nse, 5, "FOO", Some("INE999X01011"))]);

        assert_eq!(store.lookup_by_isin("INE999X01011"), Some((nse, 5)));
    }

    #[test]
    fn test_isin_prefers_nse_when_nse_loads_first() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        let bse = ExchangeSegment::bse_eq();

        store.load_segment(&nse, vec![record(&nse, 5, "FOO", Some("INE999X01011"))]);
        store.load_segment(&bse, vec![record(&bse, 900005, "FOO-B", Some("INE999X01011"))]);

        assert_eq!(store.lookup_by_isin("INE999X01011"), Some((nse, 5)));
    }

    #[test]
    fn test_isin_lookup_is_case_insensitive() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        store.load_segment(&nse, vec![record(&nse, 4, "HDFCBANK", Some("INE040A01034"))]);

        assert_eq!(store.lookup_by_isin("ine040a01034"), Some((nse.clone(), 4)));
        assert_eq!(store.lookup_by_isin(" INE040A01034 "), Some((nse, 4)));
    }

    #[test]
    fn test_duplicate_isin_in_nse_rows_takes_last_row() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();

        // A corrupt feed can repeat an ISIN across rows. NSE rows overwrite,
        // so the last row holds the mapping on every rebuild.
        store.load_segment(
            &nse,
            vec![
                record(&nse, 1, "FOO", Some("INE999X01011")),
                record(&nse, 2, "FOOX", Some("INE999X01011")),
            ],
        );

        assert_eq!(store.lookup_by_isin("INE999X01011"), Some((nse, 2)));
    }

    #[test]
    fn test_duplicate_isin_in_bse_rows_takes_first_row() {
        let store = InstrumentStore::new();
        let bse = ExchangeSegment::bse_eq();

        // Non-NSE rows claim an ISIN only while it is unclaimed.
        store.load_segment(
            &bse,
            vec![
                record(&bse, 10, "BARA", Some("INE888Y01022")),
                record(&bse, 11, "BARB", Some("INE888Y01022")),
            ],
        );

        assert_eq!(store.lookup_by_isin("INE888Y01022"), Some((bse, 10)));
    }

    #[test]
    fn test_isin_entries_removed_when_segment_reloads_without_them() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();

        store.load_segment(&nse, vec![record(&nse, 5, "FOO", Some("INE999X01011"))]);
        assert!(store.lookup_by_isin("INE999X01011").is_some());

        store.load_segment(&nse, vec![record(&nse, 6, "BAR", Some("INE888Y01022"))]);
        assert_eq!(store.lookup_by_isin("INE999X01011"), None);
        assert!(store.lookup_by_isin("INE888Y01022").is_some());
    }

    #[test]
    fn test_segment_swap_replaces_wholesale() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();

        store.load_segment(&nse, vec![record(&nse, 1, "TCS", None)]);
        store.load_segment(&nse, vec![record(&nse, 2, "RELIANCE", None)]);

        assert_eq!(store.lookup_by_symbol(&nse, "TCS"), None);
        assert_eq!(store.lookup_by_symbol(&nse, "RELIANCE"), Some(2));
        assert_eq!(store.segment_count(&nse), 1);
    }

    #[test]
    fn test_search_by_substring() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        store.load_segment(
            &nse,
            vec![
                record(&nse, 1, "TCS", None),
                record(&nse, 2, "TATAMOTORS", None),
                record(&nse, 3, "RELIANCE", None),
            ],
        );

        let matches = store.search_by_substring(&nse, "tata", 5);
        assert_eq!(matches, vec![("TATAMOTORS".to_string(), 2)]);
        assert!(store.search_by_substring(&nse, "", 5).is_empty());
        // Only symbol keys are scanned; display names are not.
        assert!(store.search_by_substring(&nse, "limited", 5).is_empty());
    }

    #[test]
    fn test_stats_reflect_loaded_segments() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();
        let bse = ExchangeSegment::bse_eq();

        store.load_segment(&nse, vec![record(&nse, 1, "TCS", None)]);
        store.load_segment(
            &bse,
            vec![record(&bse, 500570, "TCS", None), record(&bse, 500325, "RELIANCE", None)],
        );

        let stats = store.stats();
        assert_eq!(stats.instrument_count, 3);
        assert_eq!(stats.segments.get("NSE_EQ"), Some(&1));
        assert_eq!(stats.segments.get("BSE_EQ"), Some(&2));
        assert!(stats.last_refreshed_at.is_some());
        assert_eq!(stats.hit_rate, 1.0);
    }

    #[test]
    fn test_unloaded_segment_lookups_miss() {
        let store = InstrumentStore::new();
        let nse = ExchangeSegment::nse_eq();

        assert_eq!(store.lookup_by_symbol(&nse, "TCS"), None);
        assert!(store.snapshot(&nse).is_none());
        assert!(!store.has_data());
    }
}
