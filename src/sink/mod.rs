// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Durable event sinks.
//!
//! Every backend stores the payload pretty-printed (2-space indent, key order
//! as received) under its [`EventId`]. A successful `commit` means the record
//! is retrievable by `fetch` until removed by something outside this crate.
//! Committing the same identifier twice stores the same bytes again.

pub mod fs;
pub mod object;
pub mod sql;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::{SinkError, SinkResult};
use crate::id::EventId;

pub use fs::FsSink;
pub use object::{ObjectStoreConfig, ObjectStoreSink};
pub use sql::SqlSink;

pub const CONTENT_TYPE: &str = "application/json";

/// Where a committed record landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    /// File path, object key or `table/event_id`.
    pub location: String,
    pub bytes: usize,
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn commit(&self, id: &EventId, payload: &Value) -> SinkResult<CommitReceipt>;

    /// Stored bytes, exactly as committed.
    async fn fetch(&self, id: &EventId) -> SinkResult<Option<Vec<u8>>>;

    /// Identifiers of all stored records, in identifier order.
    async fn list(&self) -> SinkResult<Vec<EventId>>;

    /// Backend name as used in configuration.
    fn backend(&self) -> &'static str;
}

/// Canonical on-disk form of a payload.
pub fn encode_payload(payload: &Value) -> SinkResult<Vec<u8>> {
    serde_json::to_vec_pretty(payload).map_err(|e| SinkError::InvalidPayload(e.to_string()))
}
