// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Object storage sink (S3 and compatible stores through opendal).

use async_trait::async_trait;
use opendal::services::{Memory, S3};
use opendal::{ErrorKind, Operator};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{encode_payload, CommitReceipt, EventSink, CONTENT_TYPE};
use crate::error::{SinkError, SinkResult};
use crate::id::EventId;

const BACKEND: &str = "object-store";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ObjectStoreConfig {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub root: Option<String>,
    /// Key prefix inside the bucket, e.g. `lineage`.
    #[serde(default)]
    pub prefix: String,
}

pub struct ObjectStoreSink {
    op: Operator,
    prefix: String,
}

impl ObjectStoreSink {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        Self { op, prefix }
    }

    /// Credentials come from the standard AWS environment variables.
    pub fn s3(cfg: &ObjectStoreConfig) -> SinkResult<Self> {
        let mut builder = S3::default().bucket(&cfg.bucket);
        if let Some(region) = &cfg.region {
            builder = builder.region(region);
        }
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint(endpoint);
        }
        if let Some(root) = &cfg.root {
            builder = builder.root(root);
        }
        let op = Operator::new(builder)
            .map_err(|e| SinkError::write(BACKEND, e))?
            .finish();
        Ok(Self::new(op, cfg.prefix.clone()))
    }

    /// Process-local store, for tests and dry runs.
    pub fn memory() -> SinkResult<Self> {
        let op = Operator::new(Memory::default())
            .map_err(|e| SinkError::write(BACKEND, e))?
            .finish();
        Ok(Self::new(op, ""))
    }

    pub fn key_for(&self, id: &EventId) -> String {
        if self.prefix.is_empty() {
            id.file_name()
        } else {
            format!("{}/{}", self.prefix, id.file_name())
        }
    }

    fn list_path(&self) -> String {
        if self.prefix.is_empty() {
            "/".to_string()
        } else {
            format!("{}/", self.prefix)
        }
    }
}

#[async_trait]
impl EventSink for ObjectStoreSink {
    async fn commit(&self, id: &EventId, payload: &Value) -> SinkResult<CommitReceipt> {
        let bytes = encode_payload(payload)?;
        let len = bytes.len();
        let key = self.key_for(id);

        let written = if self.op.info().full_capability().write_with_content_type {
            self.op.write_with(&key, bytes).content_type(CONTENT_TYPE).await
        } else {
            self.op.write(&key, bytes).await
        };
        written.map_err(|e| SinkError::write(BACKEND, format!("{}: {}", key, e)))?;

        Ok(CommitReceipt { location: key, bytes: len })
    }

    async fn fetch(&self, id: &EventId) -> SinkResult<Option<Vec<u8>>> {
        match self.op.read(&self.key_for(id)).await {
            Ok(buf) => Ok(Some(buf.to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SinkError::read(BACKEND, e)),
        }
    }

    async fn list(&self) -> SinkResult<Vec<EventId>> {
        let entries = match self.op.list(&self.list_path()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SinkError::read(BACKEND, e)),
        };

        let mut ids: Vec<EventId> = entries
            .iter()
            .filter_map(|entry| EventId::from_file_name(entry.name()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}
