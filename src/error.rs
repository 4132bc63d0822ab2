// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use std::time::Duration;
use thiserror::Error;

use crate::id::EventId;

/// Failures of a counter store.
#[derive(Error, Debug)]
pub enum CounterError {
    /// Another holder kept the lock for the whole acquire window.
    #[error("Counter lock not acquired within {waited:?}")]
    LockTimeout { waited: Duration },

    /// The medium backing the counter or its lock cannot be used.
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    /// The persisted value is not a non-negative integer.
    /// Never reset automatically: that would re-issue old sequence numbers.
    #[error("Counter at {location} is corrupted (content: {content:?})")]
    Corruption { location: String, content: String },
}

impl CounterError {
    /// Whether the coordinator may fall back to uncoordinated identifiers.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CounterError::LockTimeout { .. } | CounterError::Unavailable(_))
    }
}

impl From<std::io::Error> for CounterError {
    fn from(e: std::io::Error) -> Self {
        CounterError::Unavailable(e.to_string())
    }
}

impl From<rusqlite::Error> for CounterError {
    fn from(e: rusqlite::Error) -> Self {
        CounterError::Unavailable(e.to_string())
    }
}

/// Failures of an event sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("{backend} write failed: {reason}")]
    WriteFailed { backend: &'static str, reason: String },

    #[error("{backend} read failed: {reason}")]
    ReadFailed { backend: &'static str, reason: String },

    #[error("Payload cannot be serialized: {0}")]
    InvalidPayload(String),
}

impl SinkError {
    pub(crate) fn write(backend: &'static str, reason: impl ToString) -> Self {
        SinkError::WriteFailed {
            backend,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn read(backend: &'static str, reason: impl ToString) -> Self {
        SinkError::ReadFailed {
            backend,
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a failed `Coordinator::process_event`.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Allocation refused: {0}")]
    Counter(#[source] CounterError),

    /// The identifier was allocated (its sequence is consumed) but never stored.
    #[error("Event {id} was not stored: {source}")]
    Sink {
        id: EventId,
        #[source]
        source: SinkError,
    },
}

pub type CounterResult<T> = Result<T, CounterError>;
pub type SinkResult<T> = Result<T, SinkError>;

/// Invalid or unusable store configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown {field} value {value:?} (expected one of: {expected})")]
    UnknownValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("backend \"object-store\" requires an object_store section")]
    MissingObjectStore,

    #[error("Sink setup failed: {0}")]
    Sink(#[from] SinkError),
}
