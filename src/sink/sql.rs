// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Relational sink: one row per event in `openlineage_events`.
//!
//! # Schema
//!
//! `event_id` is the primary key, so a retried commit replaces the row with
//! identical content. `counter` holds the allocation component (the sequence,
//! or the fallback timestamp when `coordinated = 0`). The envelope columns are
//! copied out of the payload for indexing; `payload` is the pretty-printed
//! document exactly as `fetch` returns it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{encode_payload, CommitReceipt, EventSink};
use crate::error::{SinkError, SinkResult};
use crate::id::{Allocation, EventId};
use crate::lineage::LineageSummary;

const BACKEND: &str = "database";

pub struct SqlSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqlSink {
    pub fn open(path: impl AsRef<Path>) -> SinkResult<Self> {
        let conn = Connection::open(path).map_err(|e| SinkError::write(BACKEND, e))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| SinkError::write(BACKEND, e))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| SinkError::write(BACKEND, e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> SinkResult<Self> {
        Self::init_schema(&conn).map_err(|e| SinkError::write(BACKEND, e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS openlineage_events (
                event_id TEXT PRIMARY KEY,
                counter INTEGER NOT NULL,
                coordinated INTEGER NOT NULL,
                event_type TEXT,
                event_time TEXT,
                job_namespace TEXT,
                job_name TEXT,
                run_id TEXT,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_openlineage_counter ON openlineage_events(counter)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_openlineage_job ON openlineage_events(job_namespace, job_name)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_openlineage_event_time ON openlineage_events(event_time)",
            [],
        )?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| "connection lock poisoned".to_string())?;
            f(&*conn).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("sink task failed: {}", e))?
    }
}

#[async_trait]
impl EventSink for SqlSink {
    async fn commit(&self, id: &EventId, payload: &Value) -> SinkResult<CommitReceipt> {
        let bytes = encode_payload(payload)?;
        let text = String::from_utf8(bytes).map_err(|e| SinkError::InvalidPayload(e.to_string()))?;
        let len = text.len();
        let summary = LineageSummary::from_payload(payload);

        let allocation = id.allocation();
        let component = match allocation {
            Allocation::Sequence(n) | Allocation::Timestamp(n) => n,
        };
        let counter = i64::try_from(component).map_err(|e| SinkError::write(BACKEND, e))?;
        let coordinated = allocation.is_coordinated();
        let event_id = id.to_string();
        let location = format!("openlineage_events/{}", event_id);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO openlineage_events (
                    event_id, counter, coordinated, event_type, event_time,
                    job_namespace, job_name, run_id, payload
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event_id,
                    counter,
                    coordinated,
                    summary.event_type,
                    summary.event_time,
                    summary.job_namespace,
                    summary.job_name,
                    summary.run_id,
                    text,
                ],
            )
        })
        .await
        .map_err(|e| SinkError::write(BACKEND, e))?;

        Ok(CommitReceipt { location, bytes: len })
    }

    async fn fetch(&self, id: &EventId) -> SinkResult<Option<Vec<u8>>> {
        let event_id = id.to_string();
        let payload = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT payload FROM openlineage_events WHERE event_id = ?1",
                    params![event_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await
            .map_err(|e| SinkError::read(BACKEND, e))?;
        Ok(payload.map(String::into_bytes))
    }

    async fn list(&self) -> SinkResult<Vec<EventId>> {
        let raw = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT event_id FROM openlineage_events")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let ids = rows.collect::<rusqlite::Result<Vec<String>>>();
                ids
            })
            .await
            .map_err(|e| SinkError::read(BACKEND, e))?;

        let mut ids: Vec<EventId> = raw.iter().filter_map(|s| s.parse().ok()).collect();
        ids.sort();
        Ok(ids)
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
impl SqlSink {
    pub(crate) async fn row_for_test(&self, id: &EventId) -> (i64, bool, String, String) {
        let event_id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT counter, coordinated, event_type, job_name FROM openlineage_events WHERE event_id = ?1",
                params![event_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
        })
        .await
        .unwrap()
    }
}
