//! # SQLite
//!
//! Relational store of record.
//!
//! ## Implementation
//!
//! - r2d2 pool of rusqlite connections, WAL journal, foreign keys on
//! - Every query runs on the blocking pool through [`Store::with_conn`]
//! - Busy/locked errors are retried with exponential backoff (`backon`)
//! - Writes that derive a sequence (complaint IDs, student IDs) run in an
//!   IMMEDIATE transaction so SQLite serializes the count and the insert
//!
//! Timestamps are stored as fixed-width RFC 3339 text (`...T..:..:..000000Z`)
//! so range filters can compare them as strings.
use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use backon::{ExponentialBuilder, Retryable};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior, types::Type};
use tracing::{info, warn};

use crate::error::{LedgerError, Result};

const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const STAMP_PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS departments (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    code        TEXT NOT NULL UNIQUE,
    description TEXT,
    head_name   TEXT,
    email       TEXT,
    phone       TEXT,
    location    TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT NOT NULL,
    code           TEXT NOT NULL UNIQUE,
    duration_years INTEGER NOT NULL,
    department_id  INTEGER NOT NULL REFERENCES departments(id),
    degree_type    TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS complaint_categories (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    name                    TEXT NOT NULL,
    description             TEXT,
    department_id           INTEGER NOT NULL REFERENCES departments(id),
    priority_level          TEXT NOT NULL DEFAULT 'Medium',
    typical_resolution_days INTEGER NOT NULL DEFAULT 7,
    created_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    unique_id       TEXT NOT NULL UNIQUE,
    student_id      TEXT UNIQUE,
    name            TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    phone           TEXT,
    role            TEXT NOT NULL DEFAULT 'student',
    course_id       INTEGER,
    course_name     TEXT,
    department_id   INTEGER,
    department_name TEXT,
    year            INTEGER,
    semester        INTEGER,
    roll_number     TEXT,
    admission_year  INTEGER,
    address         TEXT,
    parent_name     TEXT,
    parent_phone    TEXT,
    hostel_room     TEXT,
    blood_group     TEXT,
    date_of_birth   TEXT,
    gender          TEXT,
    category        TEXT,
    designation     TEXT,
    password_hash   TEXT,
    is_active       INTEGER NOT NULL DEFAULT 1,
    last_login      TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS complaints (
    id                       INTEGER PRIMARY KEY AUTOINCREMENT,
    complaint_id             TEXT NOT NULL UNIQUE,
    title                    TEXT NOT NULL,
    description              TEXT NOT NULL,
    category_id              INTEGER NOT NULL,
    department_id            INTEGER NOT NULL,
    status                   TEXT NOT NULL DEFAULT 'Pending',
    priority                 TEXT NOT NULL DEFAULT 'Medium',
    student_id               INTEGER NOT NULL REFERENCES users(id),
    urgency_level            INTEGER NOT NULL DEFAULT 1,
    expected_resolution_date TEXT,
    actual_resolution_date   TEXT,
    assigned_to              INTEGER REFERENCES users(id),
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL,
    resolved_at              TEXT
);

CREATE INDEX IF NOT EXISTS idx_complaints_created_at ON complaints(created_at);
CREATE INDEX IF NOT EXISTS idx_complaints_student_id ON complaints(student_id);

CREATE TABLE IF NOT EXISTS comments (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    complaint_id INTEGER NOT NULL REFERENCES complaints(id) ON DELETE CASCADE,
    admin_id     INTEGER NOT NULL REFERENCES users(id),
    admin_name   TEXT NOT NULL,
    text         TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mirror_outbox (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    kind       TEXT NOT NULL,
    subject_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    applied_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_mirror_outbox_pending ON mirror_outbox(applied_at, id);
"#;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    retry: RetryPolicy,
}

impl Store {
    pub fn open(path: &Path, pool_size: u32, retry: RetryPolicy) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        pool.get()?.execute_batch(SCHEMA)?;
        info!("Opened database at {}", path.display());

        Ok(Self { pool, retry })
    }

    /// Runs `op` on a pooled connection off the async runtime.
    ///
    /// `op` may run more than once when the database reports itself busy.
    pub async fn with_conn<F, T>(&self, op: F) -> Result<T>
    where
        F: Fn(&mut Connection) -> Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let op = Arc::new(op);
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.base_delay)
            .with_max_times(self.retry.max_attempts.saturating_sub(1) as usize);

        let attempt = || {
            let pool = self.pool.clone();
            let op = Arc::clone(&op);

            async move {
                tokio::task::spawn_blocking(move || {
                    let mut conn = pool.get()?;
                    op(&mut *conn)
                })
                .await
                .unwrap_or_else(|e| Err(e.into()))
            }
        };

        attempt
            .retry(backoff)
            .when(LedgerError::is_transient)
            .notify(|err, delay| warn!("Database busy, retrying in {delay:?}: {err}"))
            .await
    }

    /// [`Store::with_conn`] wrapped in an IMMEDIATE transaction.
    pub async fn write<F, T>(&self, op: F) -> Result<T>
    where
        F: Fn(&Transaction<'_>) -> Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.with_conn(move |conn| in_transaction(conn, &op)).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

/// Commit on `Ok`, roll back (on drop) on `Err`.
pub fn in_transaction<F, T>(conn: &mut Connection, op: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let value = op(&tx)?;
    tx.commit()?;

    Ok(value)
}

pub fn stamp(at: &DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

pub fn parse_stamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, STAMP_PARSE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn date_text(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub(crate) fn time_column(row: &Row<'_>, name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(name)?;
    parse_stamp(&raw).ok_or_else(|| bad_column(row, name, raw))
}

pub(crate) fn opt_time_column(
    row: &Row<'_>,
    name: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(name)? {
        Some(raw) => parse_stamp(&raw).map(Some).ok_or_else(|| bad_column(row, name, raw)),
        None => Ok(None),
    }
}

pub(crate) fn opt_date_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<NaiveDate>> {
    Ok(row
        .get::<_, Option<String>>(name)?
        .as_deref()
        .and_then(parse_date))
}

fn bad_column(row: &Row<'_>, name: &str, raw: String) -> rusqlite::Error {
    let index = row.as_ref().column_index(name).unwrap_or_default();

    rusqlite::Error::FromSqlConversionFailure(
        index,
        Type::Text,
        format!("invalid timestamp {raw:?}").into(),
    )
}
