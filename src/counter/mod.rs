// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Lock-guarded counter stores.
//!
//! A counter store hands out the next value of a durable, shared integer. The
//! read-increment-write runs under exclusive access; how that exclusion is
//! obtained is the backend's business:
//!
//! - [`LockFileCounter`]: plain-text counter file guarded by a lock file with
//!   stale-holder reclamation. Works across processes sharing a directory.
//! - [`KvCounter`]: atomic increment of a row in a SQLite key/value table.
//! - [`MemoryCounter`]: in-process mutex, for tests and single-process use.
//! - [`UncoordinatedCounter`]: no shared medium; every increment reports
//!   [`CounterError::Unavailable`] so callers fall back.

pub mod kv;
pub mod lock_file;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CounterError, CounterResult};

pub use kv::KvCounter;
pub use lock_file::{LockFileCounter, LockFileGuard, LockInfo, LockStatus};
pub use memory::{MemoryCounter, UncoordinatedCounter};

/// Default time a caller waits for the counter lock.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Acquire exclusive access, add one, persist, release. Returns the new value.
    ///
    /// Fails with `LockTimeout` if exclusivity is not obtained within `timeout`.
    async fn increment(&self, timeout: Duration) -> CounterResult<u64>;

    /// Last persisted value, read without taking the lock.
    async fn current(&self) -> CounterResult<u64>;

    /// Coordination name as used in configuration (`lock-file`, `external-kv`, ...).
    fn kind(&self) -> &'static str;
}

/// Parse a persisted counter. Surrounding whitespace is tolerated so the file
/// stays hand-editable; anything else is corruption.
pub(crate) fn parse_counter(content: &str, location: &str) -> CounterResult<u64> {
    content
        .trim()
        .parse::<u64>()
        .map_err(|_| CounterError::Corruption {
            location: location.to_string(),
            content: content.to_string(),
        })
}

pub(crate) fn next_value(current: u64, location: &str) -> CounterResult<u64> {
    current.checked_add(1).ok_or_else(|| CounterError::Corruption {
        location: location.to_string(),
        content: current.to_string(),
    })
}
