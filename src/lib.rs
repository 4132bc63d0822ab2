// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! lineage-kernel: sequence allocation and durable sinks for OpenLineage events.

pub mod config;
pub mod error;
pub mod id;
pub mod lineage;
pub mod counter;
pub mod sink;
pub mod coordinator;

pub use config::{BackendKind, CoordinationKind, StoreConfig};
pub use coordinator::{AllocationState, Coordinator, ProcessedEvent};
pub use counter::CounterStore;
pub use error::{ConfigError, CounterError, ProcessError, SinkError};
pub use id::{Allocation, EventId};
pub use sink::{CommitReceipt, EventSink};

#[cfg(test)]
pub mod tests;
