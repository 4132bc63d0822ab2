// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Allocation Coordinator
//!
//! One call of [`Coordinator::process_event`] per inbound event:
//!
//! ```text
//! Received
//! ↓  counter.increment (lock held only inside this call)
//! Allocating ── corrupted counter ──→ Failed
//! ↓  EventId::generate (sequence, or timestamp fallback on timeout/unavailable)
//! Committing ── sink error ──→ Failed (sequence consumed: a gap, not a bug)
//! ↓
//! Done
//! ```
//!
//! # Invariants
//! - The counter lock is never held while the sink writes
//! - Nothing is retried here; a caller retry is a new event with a new identifier
//! - A started commit finishes even if the caller drops the future
//! - Sequence numbers are unique and increasing, not contiguous

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::counter::{CounterStore, DEFAULT_ACQUIRE_TIMEOUT};
use crate::error::{CounterError, ProcessError, SinkError};
use crate::id::{Allocation, EventId};
use crate::sink::{CommitReceipt, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationState {
    Received,
    Allocating,
    Committing,
    Done,
    Failed,
}

/// Result of a successful allocation and commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    pub id: EventId,
    #[serde(skip)]
    pub allocation: Allocation,
    pub receipt: CommitReceipt,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    pub fn sequence(&self) -> Option<u64> {
        self.allocation.sequence()
    }

    pub fn coordinated(&self) -> bool {
        self.allocation.is_coordinated()
    }

    pub fn file_name(&self) -> String {
        self.id.file_name()
    }
}

pub struct Coordinator {
    counter: Arc<dyn CounterStore>,
    sink: Arc<dyn EventSink>,
    lock_timeout: Duration,
}

impl Coordinator {
    pub fn new(counter: Arc<dyn CounterStore>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            counter,
            sink,
            lock_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn counter(&self) -> &Arc<dyn CounterStore> {
        &self.counter
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Allocate an identifier for `payload` and store it.
    ///
    /// A payload that cannot be turned into JSON is rejected before any
    /// sequence number is consumed.
    pub async fn process_event<P>(&self, payload: &P) -> Result<ProcessedEvent, ProcessError>
    where
        P: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(payload).map_err(|e| ProcessError::InvalidPayload(e.to_string()))?;
        self.process_value(value).await
    }

    pub async fn process_value(&self, payload: Value) -> Result<ProcessedEvent, ProcessError> {
        let started = Instant::now();
        let mut state = AllocationState::Received;

        advance(&mut state, AllocationState::Allocating);
        let allocation = match self.allocate().await {
            Ok(allocation) => allocation,
            Err(e) => {
                advance(&mut state, AllocationState::Failed);
                tracing::error!(coordination = self.counter.kind(), "Refusing allocation: {}", e);
                return Err(ProcessError::Counter(e));
            }
        };
        let id = EventId::generate(allocation);

        advance(&mut state, AllocationState::Committing);
        let sink = Arc::clone(&self.sink);
        let backend = sink.backend();
        let commit = tokio::spawn(async move { sink.commit(&id, &payload).await });

        let receipt = match commit.await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(source)) => {
                advance(&mut state, AllocationState::Failed);
                tracing::error!(event_id = %id, backend, "Commit failed, identifier consumed: {}", source);
                return Err(ProcessError::Sink { id, source });
            }
            Err(join) => {
                advance(&mut state, AllocationState::Failed);
                tracing::error!(event_id = %id, backend, "Commit task aborted: {}", join);
                return Err(ProcessError::Sink {
                    id,
                    source: SinkError::write(backend, join),
                });
            }
        };

        advance(&mut state, AllocationState::Done);
        tracing::info!(
            event_id = %id,
            coordinated = allocation.is_coordinated(),
            location = %receipt.location,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Payload saved to {}",
            id.file_name()
        );

        Ok(ProcessedEvent {
            id,
            allocation,
            receipt,
            processed_at: Utc::now(),
        })
    }

    async fn allocate(&self) -> Result<Allocation, CounterError> {
        match self.counter.increment(self.lock_timeout).await {
            Ok(sequence) => Ok(Allocation::Sequence(sequence)),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(
                    coordination = self.counter.kind(),
                    "Counter unavailable ({}); allocating fallback identifier",
                    e
                );
                Ok(Allocation::now())
            }
            Err(e) => Err(e),
        }
    }
}

fn advance(state: &mut AllocationState, next: AllocationState) {
    tracing::trace!(from = ?*state, to = ?next, "allocation state");
    *state = next;
}
