// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::counter::kv::DEFAULT_COUNTER_NAME;
use crate::counter::{CounterStore, KvCounter};
use crate::error::CounterError;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_kv_counter_starts_at_one() {
    let counter = KvCounter::in_memory(DEFAULT_COUNTER_NAME).unwrap();
    assert_eq!(counter.current().await.unwrap(), 0);
    assert_eq!(counter.increment(TIMEOUT).await.unwrap(), 1);
    assert_eq!(counter.increment(TIMEOUT).await.unwrap(), 2);
    assert_eq!(counter.current().await.unwrap(), 2);
    assert_eq!(counter.kind(), "external-kv");
}

#[tokio::test]
async fn test_kv_counters_are_independent_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lineage.db");
    let a = KvCounter::open(&path, "a").unwrap();
    let b = KvCounter::open(&path, "b").unwrap();

    a.increment(TIMEOUT).await.unwrap();
    a.increment(TIMEOUT).await.unwrap();
    assert_eq!(b.increment(TIMEOUT).await.unwrap(), 1);
    assert_eq!(a.current().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kv_concurrent_connections_yield_a_permutation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lineage.db");
    let counters: Vec<Arc<KvCounter>> = (0..4)
        .map(|_| Arc::new(KvCounter::open(&path, DEFAULT_COUNTER_NAME).unwrap()))
        .collect();

    let mut handles = Vec::new();
    for i in 0..60 {
        let c = Arc::clone(&counters[i % counters.len()]);
        handles.push(tokio::spawn(async move { c.increment(TIMEOUT).await.unwrap() }));
    }
    let mut seen = BTreeSet::new();
    for h in handles {
        assert!(seen.insert(h.await.unwrap()));
    }
    assert_eq!(seen, (1..=60).collect::<BTreeSet<u64>>());
}

#[tokio::test]
async fn test_kv_non_integer_value_is_corruption() {
    let counter = KvCounter::in_memory(DEFAULT_COUNTER_NAME).unwrap();
    counter.corrupt_for_test("abc").await;

    match counter.increment(TIMEOUT).await {
        Err(CounterError::Corruption { content, .. }) => assert_eq!(content, "abc"),
        other => panic!("Expected Corruption, got {:?}", other),
    }
    assert!(matches!(
        counter.current().await,
        Err(CounterError::Corruption { .. })
    ));
}

#[tokio::test]
async fn test_kv_negative_value_is_corruption() {
    let counter = KvCounter::in_memory(DEFAULT_COUNTER_NAME).unwrap();
    counter.corrupt_for_test("-5").await;

    assert!(matches!(
        counter.increment(TIMEOUT).await,
        Err(CounterError::Corruption { .. })
    ));
}

#[tokio::test]
async fn test_kv_set_overwrites_value() {
    let counter = KvCounter::in_memory(DEFAULT_COUNTER_NAME).unwrap();
    counter.corrupt_for_test("abc").await;
    counter.set(500).await.unwrap();
    assert_eq!(counter.increment(TIMEOUT).await.unwrap(), 501);
}

#[tokio::test]
async fn test_kv_wait_for_busy_connection_is_bounded() {
    let counter = KvCounter::in_memory(DEFAULT_COUNTER_NAME).unwrap();
    let held = counter.hold_connection_for_test().await;

    let started = std::time::Instant::now();
    let err = counter.increment(Duration::from_millis(100)).await.unwrap_err();
    assert!(matches!(err, CounterError::LockTimeout { .. }));
    assert!(err.is_recoverable());
    assert!(started.elapsed() < Duration::from_secs(2));

    drop(held);
    assert_eq!(counter.increment(TIMEOUT).await.unwrap(), 1);
}
