// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! One `<id>.json` file per event in a directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{encode_payload, CommitReceipt, EventSink};
use crate::error::{SinkError, SinkResult};
use crate::id::EventId;

const BACKEND: &str = "filesystem";

pub struct FsSink {
    dir: PathBuf,
}

impl FsSink {
    /// The directory is created on first commit.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &EventId) -> PathBuf {
        self.dir.join(id.file_name())
    }
}

#[async_trait]
impl EventSink for FsSink {
    async fn commit(&self, id: &EventId, payload: &Value) -> SinkResult<CommitReceipt> {
        let bytes = encode_payload(payload)?;
        let path = self.path_for(id);
        let tmp_path = self.dir.join(format!(".{}.{}.tmp", id, Uuid::new_v4().simple()));

        let written = async {
            fs::create_dir_all(&self.dir).await?;
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &path).await?;
            sync_dir(&self.dir).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(SinkError::write(BACKEND, format!("{}: {}", path.display(), e)));
        }

        Ok(CommitReceipt {
            location: path.display().to_string(),
            bytes: bytes.len(),
        })
    }

    async fn fetch(&self, id: &EventId) -> SinkResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SinkError::read(BACKEND, e)),
        }
    }

    async fn list(&self) -> SinkResult<Vec<EventId>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SinkError::read(BACKEND, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| SinkError::read(BACKEND, e))? {
            if let Some(id) = entry.file_name().to_str().and_then(EventId::from_file_name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

/// Make the rename itself durable.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
