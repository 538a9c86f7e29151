//! Test doubles and common utilities for synchronization contract tests
//!
//! This module provides minimal test doubles that give tests control over
//! the timing of snapshot fetches and change events.

#![allow(dead_code)]

use recsync_core::error::{Error, Result};
use recsync_core::traits::{ChangeSink, EventStream, RecordSource};
use recsync_core::{ChangeEvent, Identified, Query, Record, RecordType, SyncCollection};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};

/// How long a test waits for an expected collection value
pub const WAIT: Duration = Duration::from_secs(5);

/// A record source whose snapshot fetches complete only when the test says so
#[derive(Clone)]
pub struct ControlledRecordSource {
    /// Snapshot content, read when a fetch completes
    records: Arc<Mutex<Vec<Record>>>,
    /// Live subscribers
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>>,
    /// Permits releasing gated fetches
    gate: Arc<Semaphore>,
    /// Whether fetches wait for a permit
    gated: Arc<AtomicBool>,
    /// Reported by is_initialized()
    available: Arc<AtomicBool>,
    /// Types whose fetch fails
    failing_types: Arc<Mutex<HashSet<RecordType>>>,
    /// Call counter for fetch_all()
    fetch_call_count: Arc<AtomicUsize>,
    /// Call counter for subscribe()
    subscribe_call_count: Arc<AtomicUsize>,
}

impl ControlledRecordSource {
    /// Create a source whose fetches complete immediately
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new(Semaphore::new(0)),
            gated: Arc::new(AtomicBool::new(false)),
            available: Arc::new(AtomicBool::new(true)),
            failing_types: Arc::new(Mutex::new(HashSet::new())),
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
            subscribe_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a source whose fetches block until [`release_fetch`](Self::release_fetch)
    pub fn gated() -> Self {
        let source = Self::new();
        source.gated.store(true, Ordering::SeqCst);
        source
    }

    /// Let one pending (or future) fetch complete
    pub fn release_fetch(&self) {
        self.gate.add_permits(1);
    }

    /// Replace the snapshot content
    pub fn set_snapshot(&self, records: Vec<Record>) {
        *self.records.lock().unwrap() = records;
    }

    /// Toggle availability (an unavailable source fails every fetch)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make fetches of one type fail with a transport error
    pub fn fail_type(&self, record_type: &str) {
        self.failing_types
            .lock()
            .unwrap()
            .insert(RecordType::new(record_type));
    }

    /// Send an event to every subscriber
    pub fn emit(&self, event: ChangeEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for tx in subscribers.iter() {
            let _ = tx.send(event.clone());
        }
    }

    /// Get the number of times fetch_all() was called
    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times subscribe() was called
    pub fn subscribe_call_count(&self) -> usize {
        self.subscribe_call_count.load(Ordering::SeqCst)
    }

    /// Get the number of subscribers still listening
    pub fn live_subscribers(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

#[async_trait::async_trait]
impl RecordSource for ControlledRecordSource {
    async fn fetch_all(&self, record_type: &RecordType, query: Option<&Query>) -> Result<Vec<Record>> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);

        if self.gated.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| Error::http("gate closed"))?;
            permit.forget();
        }

        if self.failing_types.lock().unwrap().contains(record_type) {
            return Err(Error::http(format!("{} endpoint returned 503", record_type)));
        }

        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| r.record_type() == record_type)
            .filter(|r| query.is_none_or(|q| q.matches(r)))
            .cloned()
            .collect())
    }

    fn subscribe(&self) -> EventStream {
        self.subscribe_call_count.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn is_initialized(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// A mock ChangeSink that records deliveries
pub struct MockSink {
    /// Call counter for deliver()
    deliver_call_count: Arc<AtomicUsize>,
    /// Events accepted, in delivery order
    delivered: Arc<Mutex<Vec<ChangeEvent>>>,
    /// Topics whose delivery fails
    failing_topics: Arc<Mutex<HashSet<String>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            deliver_call_count: Arc::new(AtomicUsize::new(0)),
            delivered: Arc::new(Mutex::new(Vec::new())),
            failing_topics: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make every delivery on `topic` fail
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    /// Get the number of times deliver() was called
    pub fn deliver_call_count(&self) -> usize {
        self.deliver_call_count.load(Ordering::SeqCst)
    }

    /// Get the events that were accepted
    pub fn delivered(&self) -> Vec<ChangeEvent> {
        self.delivered.lock().unwrap().clone()
    }

    /// Create a new MockSink that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            deliver_call_count: Arc::clone(&other.deliver_call_count),
            delivered: Arc::clone(&other.delivered),
            failing_topics: Arc::clone(&other.failing_topics),
        }
    }
}

#[async_trait::async_trait]
impl ChangeSink for MockSink {
    async fn deliver(&self, event: &ChangeEvent) -> Result<()> {
        self.deliver_call_count.fetch_add(1, Ordering::SeqCst);

        let topic = event.record_type().topic();
        if self.failing_topics.lock().unwrap().contains(&topic) {
            return Err(Error::delivery_failure(topic, "endpoint returned 500"));
        }

        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "mock"
    }
}

/// Shorthand for a connection record in a given state
pub fn connection(id: &str, state: &str) -> Record {
    Record::new("connection", id).with_state(state)
}

/// Shorthand for a basic message on a connection
pub fn message(id: &str, connection_id: &str) -> Record {
    Record::new("basicmessage", id).with_field("connectionId", connection_id)
}

/// Ids of a collection, in order
pub fn ids(collection: &SyncCollection) -> Vec<String> {
    collection
        .records()
        .iter()
        .map(|r| r.id().to_string())
        .collect()
}

/// Wait until the collection satisfies `predicate`
pub async fn wait_for<F>(rx: &mut watch::Receiver<SyncCollection>, predicate: F) -> SyncCollection
where
    F: FnMut(&SyncCollection) -> bool,
{
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("collection reached the expected value in time")
        .expect("session still running")
        .clone()
}
