// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Counter kept as a row of a SQLite key/value table.
//!
//! The increment is a single `INSERT .. ON CONFLICT DO UPDATE .. RETURNING`
//! statement, so SQLite's own write lock provides the exclusion and no
//! separate lock object exists. Waiting for this process's connection and
//! SQLite's busy wait share one deadline, the acquire timeout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{parse_counter, CounterStore};
use crate::error::{CounterError, CounterResult};

pub const DEFAULT_COUNTER_NAME: &str = "openlineage-counter";

pub struct KvCounter {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

impl KvCounter {
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>) -> CounterResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::from_connection(conn, name)
    }

    pub fn in_memory(name: impl Into<String>) -> CounterResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, name)
    }

    fn from_connection(conn: Connection, name: impl Into<String>) -> CounterResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS lineage_counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            name: name.into(),
        })
    }

    /// Operator recovery: overwrite the stored value.
    pub async fn set(&self, value: u64) -> CounterResult<()> {
        let value = i64::try_from(value)
            .map_err(|_| CounterError::Unavailable(format!("{} does not fit in SQLite INTEGER", value)))?;
        self.with_conn(Duration::from_secs(5), move |conn, name| {
            conn.execute(
                "INSERT INTO lineage_counters (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![name, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn with_conn<T, F>(&self, timeout: Duration, f: F) -> CounterResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> CounterResult<T> + Send + 'static,
    {
        let deadline = Instant::now() + timeout;
        let conn = tokio::time::timeout(timeout, Arc::clone(&self.conn).lock_owned())
            .await
            .map_err(|_| CounterError::LockTimeout { waited: timeout })?;
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || {
            conn.busy_timeout(deadline.saturating_duration_since(Instant::now()))?;
            f(&*conn, &name)
        })
        .await
        .map_err(|e| CounterError::Unavailable(format!("counter task failed: {}", e)))?
    }

    fn location(name: &str) -> String {
        format!("lineage_counters/{}", name)
    }
}

fn map_busy(e: rusqlite::Error, timeout: Duration) -> CounterError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            CounterError::LockTimeout { waited: timeout }
        }
        _ => e.into(),
    }
}

/// Raw text of the stored value, whatever its SQLite type.
fn raw_value(conn: &Connection, name: &str) -> CounterResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT CAST(value AS TEXT) FROM lineage_counters WHERE name = ?1",
            params![name],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten())
}

#[async_trait]
impl CounterStore for KvCounter {
    async fn increment(&self, timeout: Duration) -> CounterResult<u64> {
        self.with_conn(timeout, move |conn, name| {
            // The WHERE clause refuses to bump a non-integer value; SQLite would
            // otherwise coerce it to 0 and restart the sequence.
            let next: Option<i64> = conn
                .query_row(
                    "INSERT INTO lineage_counters (name, value) VALUES (?1, 1)
                     ON CONFLICT(name) DO UPDATE SET value = value + 1
                     WHERE typeof(value) = 'integer' AND value >= 0
                     RETURNING value",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| map_busy(e, timeout))?;

            match next {
                Some(v) => u64::try_from(v).map_err(|_| CounterError::Corruption {
                    location: KvCounter::location(name),
                    content: v.to_string(),
                }),
                None => Err(CounterError::Corruption {
                    location: KvCounter::location(name),
                    content: raw_value(conn, name)?.unwrap_or_default(),
                }),
            }
        })
        .await
    }

    async fn current(&self) -> CounterResult<u64> {
        self.with_conn(Duration::from_secs(5), |conn, name| match raw_value(conn, name)? {
            Some(raw) => parse_counter(&raw, &KvCounter::location(name)),
            None => Ok(0),
        })
        .await
    }

    fn kind(&self) -> &'static str {
        "external-kv"
    }
}

#[cfg(test)]
impl KvCounter {
    pub(crate) async fn corrupt_for_test(&self, raw: &'static str) {
        self.with_conn(Duration::from_secs(1), move |conn, name| {
            conn.execute(
                "INSERT OR REPLACE INTO lineage_counters (name, value) VALUES (?1, ?2)",
                params![name, raw],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }

    pub(crate) async fn hold_connection_for_test(&self) -> tokio::sync::OwnedMutexGuard<Connection> {
        Arc::clone(&self.conn).lock_owned().await
    }
}
