// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! File-backed counter with a lock file for mutual exclusion.
//!
//! # Layout
//! ```text
//! counter.txt        plain-text integer, e.g. "42"
//! counter.txt.lock   present while held: {"holderId", "pid", "acquiredAt", "expiresAt"}
//! ```
//!
//! # Protocol
//! 1. Create the lock file with `create_new` (exclusive; at most one winner)
//! 2. Read the counter (missing file reads as 0)
//! 3. Write the new value to a temp file, fsync, rename over the counter
//! 4. Delete the lock file if it still names us
//!
//! A lock whose `expiresAt` has passed belongs to a crashed holder and is
//! reclaimed by the next caller. A lock file that cannot be parsed (holder
//! died between create and write) is reclaimed once its mtime is older than
//! the staleness window.
//!
//! Reclaimers take `counter.txt.lock.reclaim` with `create_new`, re-read the
//! lock under it, and delete the lock only if it is byte-identical to the one
//! they judged stale and still stale. A live lock is never moved or deleted by
//! anyone but its holder. A holder that stalls past the window can still
//! overlap with its successor.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use uuid::Uuid;

use super::{next_value, parse_counter, CounterStore};
use crate::error::{CounterError, CounterResult};

/// Default staleness window after which an unreleased lock is reclaimed.
pub const DEFAULT_LOCK_STALE: Duration = Duration::from_secs(5);

const BACKOFF_BASE: Duration = Duration::from_millis(5);
const BACKOFF_MAX: Duration = Duration::from_millis(100);

/// Lock file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub holder_id: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    fn new(holder_id: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            holder_id,
            pid: std::process::id(),
            acquired_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(5)),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// What an observer sees in the lock file.
#[derive(Debug, Clone, PartialEq)]
pub enum LockStatus {
    Free,
    Held { info: Option<LockInfo>, stale: bool },
}

pub struct LockFileCounter {
    counter_path: PathBuf,
    lock_path: PathBuf,
    stale_after: Duration,
}

impl LockFileCounter {
    /// No I/O happens here; the counter file is created on the first write.
    pub fn new(counter_path: impl Into<PathBuf>) -> Self {
        Self::with_stale_after(counter_path, DEFAULT_LOCK_STALE)
    }

    pub fn with_stale_after(counter_path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        let counter_path = counter_path.into();
        let lock_path = suffixed(&counter_path, ".lock");
        Self {
            counter_path,
            lock_path,
            stale_after,
        }
    }

    pub fn counter_path(&self) -> &Path {
        &self.counter_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Wait for the lock until `timeout` elapses.
    pub async fn acquire(&self, timeout: Duration) -> CounterResult<LockFileGuard> {
        let deadline = Instant::now() + timeout;
        let mut backoff = BACKOFF_BASE;

        loop {
            if let Some(guard) = self.try_acquire().await? {
                return Ok(guard);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CounterError::LockTimeout { waited: timeout });
            }
            tokio::time::sleep(backoff.min(deadline - now)).await;
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }
    }

    /// One attempt. `Ok(None)` means a live holder has it.
    async fn try_acquire(&self) -> CounterResult<Option<LockFileGuard>> {
        let holder_id = Uuid::new_v4().to_string();
        let info = LockInfo::new(holder_id.clone(), self.stale_after);
        let bytes = serde_json::to_vec(&info)
            .map_err(|e| CounterError::Unavailable(format!("serialize lock: {}", e)))?;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
        {
            Ok(mut file) => {
                let written = async {
                    file.write_all(&bytes).await?;
                    file.sync_all().await
                }
                .await;
                if let Err(e) = written {
                    let _ = fs::remove_file(&self.lock_path).await;
                    return Err(e.into());
                }
                tracing::trace!(holder = %holder_id, "Counter lock acquired");
                return Ok(Some(LockFileGuard {
                    counter_path: self.counter_path.clone(),
                    lock_path: self.lock_path.clone(),
                    holder_id,
                    released: false,
                }));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let observed = match fs::read(&self.lock_path).await {
            Ok(raw) => raw,
            // Released between our create and read: just retry.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if self.is_stale(&observed).await? {
            self.reclaim(&observed).await?;
        }
        Ok(None)
    }

    async fn is_stale(&self, raw: &[u8]) -> CounterResult<bool> {
        if let Ok(info) = serde_json::from_slice::<LockInfo>(raw) {
            return Ok(info.is_expired());
        }
        let age = self.file_age(&self.lock_path).await?;
        Ok(age.is_some_and(|age| age >= self.stale_after))
    }

    /// Delete a lock judged stale from `observed`. Reclaimers serialize on a
    /// `create_new` guard file and re-check the lock under it, so only the
    /// exact file that was judged stale is ever removed.
    pub(crate) async fn reclaim(&self, observed: &[u8]) -> CounterResult<()> {
        let guard_path = suffixed(&self.lock_path, ".reclaim");
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&guard_path)
            .await
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Another reclaimer is inside. Its guard only outlives the
                // staleness window if it died there.
                if self.file_age(&guard_path).await?.is_some_and(|age| age >= self.stale_after) {
                    tracing::warn!("Removing abandoned reclaim guard at {:?}", guard_path);
                    let _ = fs::remove_file(&guard_path).await;
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let reclaimed = self.remove_if_unchanged(observed).await;
        if let Err(e) = fs::remove_file(&guard_path).await {
            tracing::warn!("Could not remove reclaim guard at {:?}: {}", guard_path, e);
        }
        reclaimed
    }

    async fn remove_if_unchanged(&self, observed: &[u8]) -> CounterResult<()> {
        let current = match fs::read(&self.lock_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        // Equal bytes can still be a new file when neither holds parsable JSON,
        // so staleness is judged again on what is there now.
        if current != observed || !self.is_stale(&current).await? {
            return Ok(());
        }

        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let previous = serde_json::from_slice::<LockInfo>(observed).ok();
        tracing::warn!(
            holder = previous.as_ref().map(|i| i.holder_id.as_str()).unwrap_or("unknown"),
            pid = previous.as_ref().map(|i| i.pid),
            "Reclaimed stale counter lock at {:?}",
            self.lock_path
        );
        Ok(())
    }

    /// `None` when the file does not exist.
    async fn file_age(&self, path: &Path) -> CounterResult<Option<Duration>> {
        let modified = match fs::metadata(path).await {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO)))
    }

    /// Inspect the lock without touching it.
    pub async fn lock_status(&self) -> CounterResult<LockStatus> {
        let raw = match fs::read(&self.lock_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LockStatus::Free),
            Err(e) => return Err(e.into()),
        };
        let stale = self.is_stale(&raw).await?;
        Ok(LockStatus::Held {
            info: serde_json::from_slice(&raw).ok(),
            stale,
        })
    }

    /// Overwrite the counter under the lock without reading it first.
    /// Operator recovery for a corrupted file.
    pub async fn set(&self, value: u64, timeout: Duration) -> CounterResult<()> {
        let guard = self.acquire(timeout).await?;
        guard.write(value).await?;
        guard.release().await
    }
}

#[async_trait]
impl CounterStore for LockFileCounter {
    async fn increment(&self, timeout: Duration) -> CounterResult<u64> {
        let guard = self.acquire(timeout).await?;
        let next = next_value(guard.read().await?, &guard.location())?;
        guard.write(next).await?;

        // The new value is already durable; a failed unlock only delays the next caller.
        if let Err(e) = guard.release().await {
            tracing::warn!("Counter lock release failed after writing {}: {}", next, e);
        }
        Ok(next)
    }

    async fn current(&self) -> CounterResult<u64> {
        read_counter(&self.counter_path).await
    }

    fn kind(&self) -> &'static str {
        "lock-file"
    }
}

/// Proof of holding the counter lock. Released on drop if not released explicitly.
pub struct LockFileGuard {
    counter_path: PathBuf,
    lock_path: PathBuf,
    holder_id: String,
    released: bool,
}

impl LockFileGuard {
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    fn location(&self) -> String {
        self.counter_path.display().to_string()
    }

    pub async fn read(&self) -> CounterResult<u64> {
        read_counter(&self.counter_path).await
    }

    /// Temp file, fsync, rename: readers see the old or the new value, never a torn one.
    pub async fn write(&self, value: u64) -> CounterResult<()> {
        let tmp_path = suffixed(&self.counter_path, &format!(".{}.tmp", Uuid::new_v4().simple()));
        let written = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(value.to_string().as_bytes()).await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &self.counter_path).await?;
            sync_parent(&self.counter_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn release(mut self) -> CounterResult<()> {
        self.released = true;
        match fs::read(&self.lock_path).await {
            Ok(raw) if self.owns(&raw) => match fs::remove_file(&self.lock_path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            Ok(_) => {
                tracing::warn!(holder = %self.holder_id, "Counter lock was reclaimed before release");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn owns(&self, raw: &[u8]) -> bool {
        serde_json::from_slice::<LockInfo>(raw).is_ok_and(|info| info.holder_id == self.holder_id)
    }
}

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Only reached on cancellation or panic; `release` covers the normal path.
        if let Ok(raw) = std::fs::read(&self.lock_path) {
            if self.owns(&raw) {
                let _ = std::fs::remove_file(&self.lock_path);
            }
        }
    }
}

async fn read_counter(path: &Path) -> CounterResult<u64> {
    match fs::read_to_string(path).await {
        Ok(content) => parse_counter(&content, &path.display().to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) if e.kind() == ErrorKind::InvalidData => Err(CounterError::Corruption {
            location: path.display().to_string(),
            content: "<non-utf8>".to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Persist a rename by syncing the directory entry.
#[cfg(unix)]
async fn sync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => fs::File::open(dir).await?.sync_all().await,
        None => fs::File::open(".").await?.sync_all().await,
    }
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
