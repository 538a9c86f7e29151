// # Memory Record Source
//
// In-memory implementation of RecordSource.
//
// ## Purpose
//
// Holds records by type and fans every mutation out to its subscribers as a
// change event. Useful for embedding, demos and tests, or as the backing
// store of an application that owns its records in process.
//
// ## Ordering
//
// A mutation and the emission of its event happen under one lock, so every
// subscriber observes events in the order the mutations were applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::event::{ChangeEvent, ChangeKind};
use crate::query::Query;
use crate::record::{Identified, Record, RecordId, RecordType};
use crate::traits::record_source::{EventStream, RecordSource};
use crate::Error;

#[derive(Debug, Default)]
struct SourceState {
    records: HashMap<RecordType, Vec<Record>>,
    subscribers: Vec<mpsc::UnboundedSender<ChangeEvent>>,
}

impl SourceState {
    fn broadcast(&mut self, event: ChangeEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// In-memory record source implementation
///
/// # Example
///
/// ```rust,no_run
/// use recsync_core::source::MemoryRecordSource;
/// use recsync_core::{Record, RecordSource, RecordType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = MemoryRecordSource::new();
///
///     source.insert(Record::new("connection", "1").with_state("invited"));
///
///     let records = source.fetch_all(&RecordType::new("connection"), None).await?;
///     assert_eq!(records.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryRecordSource {
    state: Arc<Mutex<SourceState>>,
    initialized: Arc<AtomicBool>,
}

impl MemoryRecordSource {
    /// Create a new empty, initialized source
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState::default())),
            initialized: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the source (un)initialized
    ///
    /// While uninitialized, `fetch_all` fails with `SourceUnavailable`.
    /// Event emission is unaffected.
    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    /// Store a record without emitting an event
    pub fn seed(&self, record: Record) {
        let mut state = self.lock();
        let list = state.records.entry(record.record_type().clone()).or_default();
        match list.iter().position(|r| r.id() == record.id()) {
            Some(index) => list[index] = record,
            None => list.push(record),
        }
    }

    /// Insert or replace a record, emitting `Added` or `Updated`
    pub fn insert(&self, record: Record) -> ChangeKind {
        let mut state = self.lock();
        let list = state.records.entry(record.record_type().clone()).or_default();

        let event = match list.iter().position(|r| r.id() == record.id()) {
            Some(index) => {
                list[index] = record.clone();
                ChangeEvent::Updated(record)
            }
            None => {
                list.push(record.clone());
                ChangeEvent::Added(record)
            }
        };

        let kind = event.kind();
        state.broadcast(event);
        kind
    }

    /// Replace an existing record, emitting `Updated`
    pub fn update(&self, record: Record) -> Result<(), Error> {
        let mut state = self.lock();
        let existing = state
            .records
            .get_mut(record.record_type())
            .and_then(|list| list.iter_mut().find(|r| r.id() == record.id()))
            .ok_or_else(|| {
                Error::invalid_input(format!(
                    "Cannot update unknown {} record {}",
                    record.record_type(),
                    record.id()
                ))
            })?;

        *existing = record.clone();
        state.broadcast(ChangeEvent::Updated(record));
        Ok(())
    }

    /// Remove a record, emitting `Removed` if it existed
    pub fn remove(&self, record_type: &RecordType, id: &RecordId) -> Option<Record> {
        let mut state = self.lock();
        let list = state.records.get_mut(record_type)?;
        let position = list.iter().position(|r| r.id() == id)?;
        let removed = list.remove(position);

        state.broadcast(ChangeEvent::Removed(removed.clone()));
        Some(removed)
    }

    /// Emit an event without touching the stored records
    pub fn emit(&self, event: ChangeEvent) {
        self.lock().broadcast(event);
    }

    /// Number of stored records of a type
    pub fn len(&self, record_type: &RecordType) -> usize {
        self.lock().records.get(record_type).map_or(0, Vec::len)
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryRecordSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn fetch_all(
        &self,
        record_type: &RecordType,
        query: Option<&Query>,
    ) -> Result<Vec<Record>, Error> {
        if !self.is_initialized() {
            return Err(Error::source_unavailable("memory source not initialized"));
        }

        let state = self.lock();
        Ok(state
            .records
            .get(record_type)
            .map(|list| {
                list.iter()
                    .filter(|r| query.is_none_or(|q| q.matches(r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn source_name(&self) -> &'static str {
        "memory"
    }
}
