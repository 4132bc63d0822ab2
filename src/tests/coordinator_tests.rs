// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::coordinator::Coordinator;
use crate::counter::{CounterStore, LockFileCounter, MemoryCounter, UncoordinatedCounter};
use crate::error::{CounterError, ProcessError, SinkError, SinkResult};
use crate::id::EventId;
use crate::sink::{encode_payload, CommitReceipt, EventSink, FsSink, ObjectStoreSink};

/// Rejects every commit.
struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn commit(&self, _id: &EventId, _payload: &Value) -> SinkResult<CommitReceipt> {
        Err(SinkError::WriteFailed {
            backend: "failing",
            reason: "disk full".to_string(),
        })
    }

    async fn fetch(&self, _id: &EventId) -> SinkResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn list(&self) -> SinkResult<Vec<EventId>> {
        Ok(Vec::new())
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

/// Records commits after a delay.
#[derive(Default)]
struct SlowSink {
    delay: Duration,
    committed: Mutex<HashMap<EventId, Value>>,
}

#[async_trait]
impl EventSink for SlowSink {
    async fn commit(&self, id: &EventId, payload: &Value) -> SinkResult<CommitReceipt> {
        tokio::time::sleep(self.delay).await;
        self.committed.lock().unwrap().insert(*id, payload.clone());
        Ok(CommitReceipt {
            location: id.to_string(),
            bytes: 0,
        })
    }

    async fn fetch(&self, id: &EventId) -> SinkResult<Option<Vec<u8>>> {
        let committed = self.committed.lock().unwrap();
        committed.get(id).map(encode_payload).transpose()
    }

    async fn list(&self) -> SinkResult<Vec<EventId>> {
        let mut ids: Vec<EventId> = self.committed.lock().unwrap().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    fn backend(&self) -> &'static str {
        "slow"
    }
}

fn memory_coordinator(counter: Arc<dyn CounterStore>) -> Arc<Coordinator> {
    Arc::new(Coordinator::new(counter, Arc::new(ObjectStoreSink::memory().unwrap())))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_get_distinct_sequences_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let counter = Arc::new(LockFileCounter::new(dir.path().join("counter.txt")));
    let sink = Arc::new(FsSink::new(dir.path()));
    let coordinator = Arc::new(Coordinator::new(counter, sink.clone()));

    let handles: Vec<_> = (0..30)
        .map(|i| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.process_value(json!({ "i": i })).await.unwrap() })
        })
        .collect();

    let mut sequences = BTreeSet::new();
    for h in handles {
        let event = h.await.unwrap();
        assert!(event.coordinated());
        assert!(sequences.insert(event.sequence().unwrap()));
        assert!(sink.path_for(&event.id).exists());
    }
    assert_eq!(sequences, (1..=30).collect::<BTreeSet<u64>>());
    assert_eq!(sink.list().await.unwrap().len(), 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_simultaneous_payloads_are_stored_separately() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(
        Arc::new(LockFileCounter::new(dir.path().join("counter.txt"))),
        Arc::new(FsSink::new(dir.path())),
    );

    let (first, second) = tokio::join!(
        coordinator.process_value(json!({ "a": 1 })),
        coordinator.process_value(json!({ "a": 2 })),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first.id, second.id);
    let seqs: BTreeSet<u64> = [first.sequence().unwrap(), second.sequence().unwrap()].into();
    assert_eq!(seqs, BTreeSet::from([1, 2]));

    let sink = coordinator.sink();
    let a: Value = serde_json::from_slice(&sink.fetch(&first.id).await.unwrap().unwrap()).unwrap();
    let b: Value = serde_json::from_slice(&sink.fetch(&second.id).await.unwrap().unwrap()).unwrap();
    assert_eq!(a, json!({ "a": 1 }));
    assert_eq!(b, json!({ "a": 2 }));
}

#[tokio::test]
async fn test_process_event_serializes_typed_payloads() {
    #[derive(serde::Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Start<'a> {
        event_type: &'a str,
        producer: &'a str,
    }

    let coordinator = memory_coordinator(Arc::new(MemoryCounter::new()));
    let event = coordinator
        .process_event(&Start {
            event_type: "START",
            producer: "tests",
        })
        .await
        .unwrap();

    assert_eq!(event.sequence(), Some(1));
    let stored = coordinator.sink().fetch(&event.id).await.unwrap().unwrap();
    let value: Value = serde_json::from_slice(&stored).unwrap();
    assert_eq!(value["eventType"], "START");
}

#[tokio::test]
async fn test_unavailable_counter_falls_back_to_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new(
        Arc::new(LockFileCounter::new(dir.path().join("missing").join("counter.txt"))),
        Arc::new(FsSink::new(dir.path().join("events"))),
    )
    .with_lock_timeout(Duration::from_millis(200));

    let event = coordinator.process_value(json!({ "a": 1 })).await.unwrap();
    assert!(!event.coordinated());
    assert!(event.id.allocation().timestamp().is_some());
    assert!(coordinator.sink().fetch(&event.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_lock_timeout_falls_back_to_timestamp() {
    let counter = Arc::new(MemoryCounter::new());
    let coordinator = Coordinator::new(counter.clone(), Arc::new(ObjectStoreSink::memory().unwrap()))
        .with_lock_timeout(Duration::from_millis(50));

    let holder = {
        let counter = Arc::clone(&counter);
        tokio::spawn(async move { counter.hold_for(Duration::from_millis(400)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let event = coordinator.process_value(json!({ "late": true })).await.unwrap();
    assert!(!event.coordinated());

    holder.await.unwrap();
    assert_eq!(counter.current().await.unwrap(), 0, "fallback must not touch the counter");
}

#[tokio::test]
async fn test_corrupted_counter_refuses_allocation() {
    let dir = tempfile::tempdir().unwrap();
    let counter_path = dir.path().join("counter.txt");
    std::fs::write(&counter_path, "not a number").unwrap();
    let sink = Arc::new(FsSink::new(dir.path().join("events")));
    let coordinator = Coordinator::new(Arc::new(LockFileCounter::new(&counter_path)), sink.clone());

    let err = coordinator.process_value(json!({ "a": 1 })).await.unwrap_err();
    assert!(
        matches!(err, ProcessError::Counter(CounterError::Corruption { .. })),
        "got {:?}",
        err
    );
    assert_eq!(std::fs::read_to_string(&counter_path).unwrap(), "not a number");
    assert!(sink.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sink_failure_consumes_the_sequence() {
    let counter = Arc::new(MemoryCounter::new());
    let failing = Coordinator::new(counter.clone(), Arc::new(FailingSink));

    for i in 1..=5u64 {
        match failing.process_value(json!({ "a": i })).await {
            Err(ProcessError::Sink { id, source }) => {
                assert_eq!(id.allocation().sequence(), Some(i));
                assert!(matches!(source, SinkError::WriteFailed { .. }));
            }
            other => panic!("Expected a sink error on call {}, got {:?}", i, other),
        }
        assert_eq!(counter.current().await.unwrap(), i);
    }

    let working = memory_coordinator(counter.clone());
    let event = working.process_value(json!({ "a": 1 })).await.unwrap();
    assert_eq!(event.sequence(), Some(6));
}

#[tokio::test]
async fn test_invalid_payload_consumes_nothing() {
    let counter = Arc::new(MemoryCounter::new());
    let coordinator = memory_coordinator(counter.clone());

    // JSON object keys must be strings.
    let mut payload = HashMap::new();
    payload.insert((1, 2), "tuple key");

    let err = coordinator.process_event(&payload).await.unwrap_err();
    assert!(matches!(err, ProcessError::InvalidPayload(_)), "got {:?}", err);
    assert_eq!(counter.current().await.unwrap(), 0);
    assert!(coordinator.sink().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_commit_completes_after_caller_gives_up() {
    let sink = Arc::new(SlowSink {
        delay: Duration::from_millis(200),
        ..Default::default()
    });
    let coordinator = Coordinator::new(Arc::new(MemoryCounter::new()), sink.clone());

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), coordinator.process_value(json!({ "a": 1 }))).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(sink.list().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ten_thousand_identifiers_are_unique_in_both_modes() {
    let counters: [Arc<dyn CounterStore>; 2] =
        [Arc::new(MemoryCounter::new()), Arc::new(UncoordinatedCounter)];

    for counter in counters {
        let coordinated = counter.kind() != "none";
        let coordinator = memory_coordinator(counter);

        let handles: Vec<_> = (0..10_000)
            .map(|i| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move { coordinator.process_value(json!({ "i": i })).await.unwrap() })
            })
            .collect();

        let mut ids = HashSet::new();
        for h in handles {
            let event = h.await.unwrap();
            assert_eq!(event.coordinated(), coordinated);
            assert!(ids.insert(event.id.to_string()), "duplicate identifier {}", event.id);
        }
        assert_eq!(ids.len(), 10_000);
        assert_eq!(coordinator.sink().list().await.unwrap().len(), 10_000);
    }
}
