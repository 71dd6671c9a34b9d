//! SQLite-backed append-only log of priced LLM calls.
//!
//! This module provides:
//! - Lazy creation of the store file on first write
//! - Schema initialization with a version marker and additive columns
//! - Appends that survive concurrent writers (WAL mode, busy timeout, retry)
//! - Filtered reads and bulk purges
//!
//! Every operation opens a short-lived connection, so independent processes
//! can share one store file.

use chrono::{DateTime, Datelike, SecondsFormat, TimeDelta, Utc};
use rusqlite::{Connection, ErrorCode, params};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::{Result, SpendError};
use crate::models::CallRecord;
use crate::utils::default_db_path;

const MAX_ATTEMPTS: u64 = 3;

/// Which records a read or purge covers, relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeWindow {
    #[default]
    All,
    /// Records from the last `n` days
    LastDays(u32),
}

impl TimeWindow {
    /// Earliest included timestamp, if the window is bounded.
    ///
    /// A window reaching back past year 0 has no lower bound.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            TimeWindow::All => None,
            TimeWindow::LastDays(days) => days_before(now, days),
        }
    }
}

/// `now` minus `days`, or `None` when that is not a representable four-digit year.
fn days_before(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| now.checked_sub_signed(delta))
        .filter(|cutoff| cutoff.year() >= 0)
}

/// Filter applied to reads. Empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub window: TimeWindow,
    pub model: Option<String>,
    pub label: Option<String>,
}

impl RecordFilter {
    pub fn last_days(days: u32) -> Self {
        Self {
            window: TimeWindow::LastDays(days),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Handle to a store file. Cheap to clone; holds no open connection.
#[derive(Debug, Clone)]
pub struct SpendStore {
    path: PathBuf,
}

impl SpendStore {
    /// Handle for the store at `path`. The file is not touched until the first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Handle for the per-user default location (see [`default_db_path`]).
    pub fn open_default() -> Result<Self> {
        Ok(Self::open(default_db_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and return its row id. `record.id` is ignored.
    ///
    /// Counts above `i64::MAX` cannot be stored exactly and are rejected.
    pub fn append(&self, record: &CallRecord) -> Result<i64> {
        let counts = [
            to_sql_count("input_tokens", record.input_tokens)?,
            to_sql_count("output_tokens", record.output_tokens)?,
            to_sql_count("duration_ms", record.duration_ms)?,
        ];
        let conn = self.open_for_write()?;
        let id = with_retry(|| insert_call(&conn, record, counts))?;
        log::debug!(
            "recorded call {} model={} tokens={}/{} cost={}",
            id,
            record.model,
            record.input_tokens,
            record.output_tokens,
            record.cost_usd
        );
        Ok(id)
    }

    /// Matching records, oldest first.
    pub fn records(&self, filter: &RecordFilter) -> Result<Vec<CallRecord>> {
        self.records_at(filter, Utc::now())
    }

    pub(crate) fn records_at(
        &self,
        filter: &RecordFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<CallRecord>> {
        let Some(conn) = self.open_for_read()? else {
            return Ok(Vec::new());
        };
        let cutoff = filter.window.cutoff(now).map(|c| format_timestamp(&c));

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, provider, model, label, source_file, source_function,
                    source_line, input_tokens, output_tokens, cost_usd, duration_ms
             FROM calls
             WHERE (?1 IS NULL OR timestamp >= ?1)
               AND (?2 IS NULL OR model = ?2)
               AND (?3 IS NULL OR label = ?3)
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(
            params![cutoff, filter.model.as_deref(), filter.label.as_deref()],
            |row| {
                Ok(RawCall {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    provider: row.get(2)?,
                    model: row.get(3)?,
                    label: row.get(4)?,
                    source_file: row.get(5)?,
                    source_function: row.get(6)?,
                    source_line: row.get(7)?,
                    input_tokens: row.get(8)?,
                    output_tokens: row.get(9)?,
                    cost_usd: row.get(10)?,
                    duration_ms: row.get(11)?,
                })
            },
        )?;

        let mut records = Vec::new();
        for raw in rows {
            records.push(raw?.decode()?);
        }
        Ok(records)
    }

    /// Delete records. `None` deletes everything, `Some(n)` deletes records
    /// older than `n` days. Returns the number of rows removed.
    pub fn clear(&self, older_than_days: Option<u32>) -> Result<usize> {
        self.clear_at(older_than_days, Utc::now())
    }

    pub(crate) fn clear_at(
        &self,
        older_than_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let Some(conn) = self.open_for_read()? else {
            return Ok(0);
        };
        let deleted = match older_than_days {
            None => with_retry(|| conn.execute("DELETE FROM calls", []))?,
            Some(days) => match days_before(now, days) {
                Some(cutoff) => {
                    let cutoff = format_timestamp(&cutoff);
                    with_retry(|| {
                        conn.execute("DELETE FROM calls WHERE timestamp < ?1", params![cutoff])
                    })?
                }
                // nothing can be older than the earliest representable time
                None => 0,
            },
        };
        log::debug!(
            "cleared {} call record(s) from {}",
            deleted,
            self.path.display()
        );
        Ok(deleted)
    }

    /// Schema version stored in the metadata table, if the store exists.
    pub fn schema_version(&self) -> Result<Option<String>> {
        let Some(conn) = self.open_for_read()? else {
            return Ok(None);
        };
        let version = conn.query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        Ok(Some(version))
    }

    fn open_for_write(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        open_db(&self.path)
    }

    fn open_for_read(&self) -> Result<Option<Connection>> {
        if !self.path.exists() {
            log::debug!("store {} does not exist yet", self.path.display());
            return Ok(None);
        }
        open_db(&self.path).map(Some)
    }
}

/// Open database connection with WAL mode and retry logic
///
/// Retries "database locked" errors with a linear backoff, then configures
/// WAL mode and a busy timeout so concurrent writers queue instead of failing.
fn open_db(db_path: &Path) -> Result<Connection> {
    let mut attempts = 0;

    loop {
        match Connection::open(db_path).and_then(|conn| {
            conn.busy_timeout(Duration::from_millis(5000))?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(conn)
        }) {
            Ok(conn) => {
                with_retry(|| init_schema(&conn))?;
                return Ok(conn);
            }
            Err(e) if is_locked(&e) && attempts < MAX_ATTEMPTS => {
                attempts += 1;
                thread::sleep(Duration::from_millis(100 * attempts));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Run `op`, retrying while SQLite reports the database as busy or locked.
fn with_retry<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    let mut attempts = 0;
    loop {
        match op() {
            Err(e) if is_locked(&e) && attempts < MAX_ATTEMPTS => {
                attempts += 1;
                log::debug!("store busy, retry {attempts}/{MAX_ATTEMPTS}");
                thread::sleep(Duration::from_millis(100 * attempts));
            }
            other => return other,
        }
    }
}

fn is_locked(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => matches!(
            err.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ),
        other => other.to_string().contains("locked"),
    }
}

/// Initialize database schema
///
/// Creates tables and indexes if they don't exist and records the schema
/// version. Schema changes are additive only.
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS calls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            source_file TEXT NOT NULL DEFAULT '',
            source_function TEXT NOT NULL DEFAULT '',
            source_line INTEGER NOT NULL DEFAULT 0,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            cost_usd TEXT NOT NULL DEFAULT '0'
        );
        CREATE INDEX IF NOT EXISTS idx_calls_timestamp ON calls(timestamp);
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', '1');",
    )?;

    // duration_ms was added after the first release
    if let Err(e) = conn.execute(
        "ALTER TABLE calls ADD COLUMN duration_ms INTEGER NOT NULL DEFAULT 0",
        [],
    ) {
        let msg = e.to_string();
        if !msg.contains("duplicate column name") {
            return Err(e);
        }
    }

    Ok(())
}

/// `counts` are input tokens, output tokens and duration, already range-checked.
fn insert_call(conn: &Connection, record: &CallRecord, counts: [i64; 3]) -> rusqlite::Result<i64> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO calls
            (timestamp, provider, model, label, source_file, source_function,
             source_line, input_tokens, output_tokens, cost_usd, duration_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    stmt.execute(params![
        format_timestamp(&record.timestamp),
        record.provider,
        record.model,
        record.label,
        record.source_file,
        record.source_function,
        record.source_line,
        counts[0],
        counts[1],
        record.cost_usd.to_string(),
        counts[2],
    ])?;
    Ok(conn.last_insert_rowid())
}

/// Fixed-width UTC text so string order matches time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_sql_count(field: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| SpendError::CountOutOfRange { field, value })
}

/// Row as stored, before text columns are decoded.
struct RawCall {
    id: i64,
    timestamp: String,
    provider: String,
    model: String,
    label: String,
    source_file: String,
    source_function: String,
    source_line: u32,
    input_tokens: i64,
    output_tokens: i64,
    cost_usd: String,
    duration_ms: i64,
}

impl RawCall {
    fn decode(self) -> Result<CallRecord> {
        let id = self.id;
        let corrupt = |reason: String| SpendError::CorruptRecord { id, reason };

        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| corrupt(format!("timestamp '{}': {e}", self.timestamp)))?
            .with_timezone(&Utc);
        let cost_usd: Decimal = self
            .cost_usd
            .parse()
            .map_err(|e| corrupt(format!("cost '{}': {e}", self.cost_usd)))?;
        let count = |field: &str, v: i64| {
            u64::try_from(v).map_err(|_| corrupt(format!("negative {field} {v}")))
        };
        if cost_usd.is_sign_negative() {
            return Err(corrupt(format!("negative cost {cost_usd}")));
        }

        Ok(CallRecord {
            id: Some(id),
            timestamp,
            provider: self.provider,
            model: self.model,
            label: self.label,
            source_file: self.source_file,
            source_function: self.source_function,
            source_line: self.source_line,
            input_tokens: count("input_tokens", self.input_tokens)?,
            output_tokens: count("output_tokens", self.output_tokens)?,
            cost_usd,
            duration_ms: count("duration_ms", self.duration_ms)?,
        })
    }
}
