//! Synchronization state machine
//!
//! Reconciles an asynchronously loaded snapshot with a live event stream that
//! starts at the same time.
//!
//! ```text
//!            snapshot(L)
//! Loading ─────────────────▶ Ready ◀──┐
//!   │  ▲                        │      │ Added / Updated / Removed
//!   └──┘ event: queued          └──────┘
//! ```
//!
//! Events arriving while `Loading` are queued and replayed in arrival order
//! right after the snapshot is applied. Merge rules are idempotent so that an
//! event already reflected in the snapshot, or one the snapshot missed, both
//! converge to the same collection:
//!
//! - `Added(R)`: append, or replace in place when the id already exists
//! - `Updated(R)`: replace in place, or append when the id is unknown
//! - `Removed(id)`: delete if present, otherwise nothing

use crate::event::ChangeEvent;
use crate::record::{Identified, Record, RecordType};
use crate::sync::collection::SyncCollection;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Outcome of feeding one event to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Held until the snapshot is applied
    Queued,
    /// A new collection value was produced
    Applied,
    /// Nothing changed (e.g. removal of an absent record)
    Unchanged,
    /// The event belongs to another record type
    Ignored,
}

/// Phase of a synchronized record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Snapshot not applied yet; events are queued
    Loading,
    /// Snapshot applied; events are applied as they arrive
    Ready,
}

/// The reconciliation engine for one record type
#[derive(Debug)]
pub struct SyncMachine<R: Identified = Record> {
    record_type: RecordType,
    collection: SyncCollection<R>,
    pending: VecDeque<ChangeEvent<R>>,
}

impl<R: Identified> SyncMachine<R> {
    /// Create a machine in the `Loading` phase
    pub fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            collection: SyncCollection::new(),
            pending: VecDeque::new(),
        }
    }

    /// The record type being synchronized
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        if self.collection.is_loading() {
            Phase::Loading
        } else {
            Phase::Ready
        }
    }

    /// Latest collection value
    pub fn collection(&self) -> &SyncCollection<R> {
        &self.collection
    }

    /// Number of events waiting for the snapshot
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply the snapshot and replay queued events
    ///
    /// Returns the number of replayed events, or `None` if the machine was
    /// already `Ready` (the snapshot is then discarded).
    pub fn apply_snapshot(&mut self, records: Vec<R>) -> Option<usize> {
        if self.phase() == Phase::Ready {
            warn!(
                "Discarding {} snapshot: collection is already ready",
                self.record_type
            );
            return None;
        }

        self.collection = self.collection.with_snapshot(records);

        let replayed = self.pending.len();
        while let Some(event) = self.pending.pop_front() {
            self.apply_ready(event);
        }

        debug!(
            "{} snapshot applied ({} record(s), {} replayed event(s))",
            self.record_type,
            self.collection.len(),
            replayed
        );
        Some(replayed)
    }

    /// Feed one live event
    pub fn apply_event(&mut self, event: ChangeEvent<R>) -> Transition {
        if event.record_type() != &self.record_type {
            debug!(
                "Ignoring {} event for {} in {} machine",
                event.kind(),
                event.record_type(),
                self.record_type
            );
            return Transition::Ignored;
        }

        match self.phase() {
            Phase::Loading => {
                debug!(
                    "Queueing {} {} {} until snapshot",
                    self.record_type,
                    event.kind(),
                    event.id()
                );
                self.pending.push_back(event);
                Transition::Queued
            }
            Phase::Ready => self.apply_ready(event),
        }
    }

    fn apply_ready(&mut self, event: ChangeEvent<R>) -> Transition {
        let next = match event {
            ChangeEvent::Added(record) => {
                if self.collection.contains(record.id()) {
                    debug!("Duplicate add of {} {}, replacing", self.record_type, record.id());
                }
                Some(self.collection.with_upserted(record))
            }
            ChangeEvent::Updated(record) => {
                if !self.collection.contains(record.id()) {
                    debug!("Update for unknown {} {}, appending", self.record_type, record.id());
                }
                Some(self.collection.with_upserted(record))
            }
            ChangeEvent::Removed(record) => self.collection.with_removed(record.id()),
        };

        match next {
            Some(collection) => {
                self.collection = collection;
                Transition::Applied
            }
            None => Transition::Unchanged,
        }
    }
}
