//! SQLite persistence for the instrument master.
//!
//! Optional warm-start layer: every successful segment refresh is mirrored
//! to disk so a restart can serve lookups before the first network fetch
//! completes. The on-disk copy is replaced wholesale per segment, matching
//! the in-memory swap.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::instruments::types::{ExchangeSegment, InstrumentRecord};

#[derive(Clone)]
pub struct InstrumentDb {
    conn: Arc<Mutex<Connection>>,
}

impl InstrumentDb {
    pub fn new(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create db directory {}", parent.display()))?;
            }
        }

        let conn = Connection::open(db_path).context("open instrument db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS instruments (
                security_id INTEGER NOT NULL,
                exchange_segment TEXT NOT NULL,
                symbol TEXT NOT NULL,
                isin TEXT,
                display_name TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (security_id, exchange_segment)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_instruments_isin ON instruments(isin)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_instruments_segment_symbol \
             ON instruments(exchange_segment, symbol)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Replace every row for one segment inside a single transaction.
    /// Readers on another connection either see the old rows or the new ones.
    pub async fn replace_segment(
        &self,
        segment: &ExchangeSegment,
        records: &[InstrumentRecord],
        refreshed_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let stamp = refreshed_at.to_rfc3339();

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM instruments WHERE exchange_segment = ?1",
            [segment.as_str()],
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO instruments \
                 (security_id, exchange_segment, symbol, isin, display_name, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for rec in records {
                stmt.execute(params![
                    rec.security_id,
                    segment.as_str(),
                    rec.symbol,
                    rec.isin,
                    rec.display_name,
                    stamp,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    /// All rows for one segment plus the newest refresh stamp among them.
    pub async fn load_segment(
        &self,
        segment: &ExchangeSegment,
    ) -> Result<(Vec<InstrumentRecord>, Option<DateTime<Utc>>)> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT security_id, symbol, isin, display_name, updated_at \
             FROM instruments WHERE exchange_segment = ?1",
        )?;

        let mut records = Vec::new();
        let mut newest: Option<DateTime<Utc>> = None;

        let rows = stmt
            .query_map([segment.as_str()], |row| {
                let security_id: i64 = row.get(0)?;
                let symbol: String = row.get(1)?;
                let isin: Option<String> = row.get(2)?;
                let display_name: Option<String> = row.get(3)?;
                let updated_at: String = row.get(4)?;
                Ok((security_id, symbol, isin, display_name, updated_at))
            })?
            .filter_map(|r| r.ok());

        for (security_id, symbol, isin, display_name, updated_at) in rows {
            if let Ok(ts) = DateTime::parse_from_rfc3339(&updated_at) {
                let ts = ts.with_timezone(&Utc);
                if newest.map_or(true, |cur| ts > cur) {
                    newest = Some(ts);
                }
            }
            let display_name = display_name.unwrap_or_else(|| symbol.clone());
            records.push(InstrumentRecord {
                exchange_segment: segment.clone(),
                security_id,
                symbol,
                isin,
                display_name,
            });
        }

        Ok((records, newest))
    }

    /// Segments present on disk with their row counts.
    pub async fn segments_on_disk(&self) -> Result<Vec<(ExchangeSegment, usize)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT exchange_segment, COUNT(*) FROM instruments \
             GROUP BY exchange_segment ORDER BY exchange_segment",
        )?;

        let mut out = Vec::new();
        let rows = stmt
            .query_map([], |row| {
                let segment: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((segment, count))
            })?
            .filter_map(|r| r.ok());

        for (segment, count) in rows {
            out.push((ExchangeSegment::new(&segment), count.max(0) as usize));
        }

        Ok(out)
    }

    pub async fn instrument_count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM instruments", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}
