// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{next_value, CounterStore};
use crate::error::{CounterError, CounterResult};

/// In-process counter. Not durable; mutual exclusion only within one process.
#[derive(Debug, Default)]
pub struct MemoryCounter {
    value: Mutex<u64>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(value: u64) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Hold the lock for `duration`, standing in for a slow holder.
    pub async fn hold_for(&self, duration: Duration) {
        let _guard = self.value.lock().await;
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl CounterStore for MemoryCounter {
    async fn increment(&self, timeout: Duration) -> CounterResult<u64> {
        let mut value = tokio::time::timeout(timeout, self.value.lock())
            .await
            .map_err(|_| CounterError::LockTimeout { waited: timeout })?;
        *value = next_value(*value, "memory")?;
        Ok(*value)
    }

    async fn current(&self) -> CounterResult<u64> {
        Ok(*self.value.lock().await)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Used when no shared medium exists (e.g. serverless without a writable disk).
#[derive(Debug, Default, Clone, Copy)]
pub struct UncoordinatedCounter;

#[async_trait]
impl CounterStore for UncoordinatedCounter {
    async fn increment(&self, _timeout: Duration) -> CounterResult<u64> {
        Err(CounterError::Unavailable("coordination disabled".to_string()))
    }

    async fn current(&self) -> CounterResult<u64> {
        Ok(0)
    }

    fn kind(&self) -> &'static str {
        "none"
    }
}
