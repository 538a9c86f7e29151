//! Synchronized collection values
//!
//! A [`SyncCollection`] is an immutable snapshot of the mirror of one record
//! type. Every transition builds a new value; holders of an older value never
//! observe a mutation, so identity comparison ([`SyncCollection::same_as`]) is
//! a reliable change signal.

use crate::record::{Identified, Record, RecordId};
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Ordered, deduplicated records of one type plus a `loading` flag
pub struct SyncCollection<R = Record> {
    records: Arc<Vec<R>>,
    loading: bool,
    synced_at: Option<DateTime<Utc>>,
}

impl<R: Identified> SyncCollection<R> {
    /// Empty collection waiting for its snapshot
    pub fn new() -> Self {
        Self {
            records: Arc::new(Vec::new()),
            loading: true,
            synced_at: None,
        }
    }

    /// Records in collection order
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Shared handle to the records, without copying them
    pub fn shared_records(&self) -> Arc<Vec<R>> {
        Arc::clone(&self.records)
    }

    /// Whether the snapshot has not been applied yet
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// When the snapshot was applied
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of the record with `id`
    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    /// Record with `id`
    pub fn get(&self, id: &RecordId) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Whether a record with `id` is present
    pub fn contains(&self, id: &RecordId) -> bool {
        self.position(id).is_some()
    }

    /// Referential identity: both values come from the same transition
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.records, &other.records) && self.loading == other.loading
    }

    /// Apply a snapshot
    ///
    /// The result holds exactly the listed records in source order with
    /// `loading` cleared. A repeated id keeps its first position and takes the
    /// later content.
    pub fn with_snapshot(&self, list: Vec<R>) -> Self {
        let mut records: Vec<R> = Vec::with_capacity(list.len());
        let mut positions: HashMap<RecordId, usize> = HashMap::with_capacity(list.len());

        for record in list {
            match positions.get(record.id()) {
                Some(&index) => records[index] = record,
                None => {
                    positions.insert(record.id().clone(), records.len());
                    records.push(record);
                }
            }
        }

        Self {
            records: Arc::new(records),
            loading: false,
            synced_at: Some(Utc::now()),
        }
    }

    /// Replace the record with the same id in place, or append it
    pub fn with_upserted(&self, record: R) -> Self {
        let mut records = Vec::clone(&self.records);
        match records.iter().position(|r| r.id() == record.id()) {
            Some(index) => records[index] = record,
            None => records.push(record),
        }
        self.derive(records)
    }

    /// Delete the record with `id`
    ///
    /// Returns `None` when no such record exists: nothing changes.
    pub fn with_removed(&self, id: &RecordId) -> Option<Self> {
        let index = self.position(id)?;
        let mut records = Vec::clone(&self.records);
        records.remove(index);
        Some(self.derive(records))
    }

    fn derive(&self, records: Vec<R>) -> Self {
        Self {
            records: Arc::new(records),
            loading: self.loading,
            synced_at: self.synced_at,
        }
    }
}

impl<R: Identified> Default for SyncCollection<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for SyncCollection<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            loading: self.loading,
            synced_at: self.synced_at,
        }
    }
}

impl<R: PartialEq> PartialEq for SyncCollection<R> {
    fn eq(&self, other: &Self) -> bool {
        self.loading == other.loading && self.records == other.records
    }
}

impl<R: fmt::Debug> fmt::Debug for SyncCollection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCollection")
            .field("records", &self.records)
            .field("loading", &self.loading)
            .finish()
    }
}

/// Serialized as `{ "records": [...], "loading": bool }`
impl<R: Serialize> Serialize for SyncCollection<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SyncCollection", 2)?;
        state.serialize_field("records", self.records.as_slice())?;
        state.serialize_field("loading", &self.loading)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str, state: &str) -> Record {
        Record::new("connection", id).with_state(state)
    }

    fn ids(collection: &SyncCollection) -> Vec<&str> {
        collection.records().iter().map(|r| r.id().as_str()).collect()
    }

    #[test]
    fn test_new_collection_is_loading() {
        let collection: SyncCollection = SyncCollection::new();
        assert!(collection.is_loading());
        assert!(collection.is_empty());
        assert!(collection.synced_at().is_none());
    }

    #[test]
    fn test_snapshot_clears_loading() {
        let collection = SyncCollection::new().with_snapshot(vec![conn("1", "a"), conn("2", "b")]);
        assert!(!collection.is_loading());
        assert!(collection.synced_at().is_some());
        assert_eq!(ids(&collection), vec!["1", "2"]);
    }

    #[test]
    fn test_snapshot_duplicates_collapse() {
        let collection = SyncCollection::new().with_snapshot(vec![
            conn("1", "invited"),
            conn("2", "invited"),
            conn("1", "completed"),
        ]);
        assert_eq!(ids(&collection), vec!["1", "2"]);
        assert_eq!(collection.records()[0].state(), Some("completed"));
    }

    #[test]
    fn test_upsert_appends_or_replaces_in_place() {
        let base = SyncCollection::new().with_snapshot(vec![conn("1", "a"), conn("2", "b")]);

        let appended = base.with_upserted(conn("3", "c"));
        assert_eq!(ids(&appended), vec!["1", "2", "3"]);

        let replaced = appended.with_upserted(conn("1", "z"));
        assert_eq!(ids(&replaced), vec!["1", "2", "3"]);
        assert_eq!(replaced.records()[0].state(), Some("z"));
    }

    #[test]
    fn test_transitions_never_mutate_previous_value() {
        let base = SyncCollection::new().with_snapshot(vec![conn("1", "a")]);
        let held = base.clone();

        let next = base.with_upserted(conn("1", "b"));

        assert!(held.same_as(&base));
        assert!(!next.same_as(&base));
        assert_eq!(held.records()[0].state(), Some("a"));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let base = SyncCollection::new().with_snapshot(vec![conn("1", "a")]);
        assert!(base.with_removed(&RecordId::new("9")).is_none());

        let removed = base.with_removed(&RecordId::new("1")).unwrap();
        assert!(removed.is_empty());
        assert!(!removed.is_loading());
    }

    #[test]
    fn test_remove_shifts_following_positions() {
        let base = SyncCollection::new().with_snapshot(vec![
            conn("1", "a"),
            conn("2", "b"),
            conn("3", "c"),
        ]);
        let removed = base.with_removed(&RecordId::new("2")).unwrap();
        assert_eq!(ids(&removed), vec!["1", "3"]);
        assert_eq!(removed.position(&RecordId::new("3")), Some(1));
    }

    #[test]
    fn test_serialized_shape() {
        let collection = SyncCollection::new().with_snapshot(vec![conn("1", "completed")]);
        assert_eq!(
            serde_json::to_value(&collection).unwrap(),
            serde_json::json!({
                "records": [{"type": "connection", "id": "1", "state": "completed"}],
                "loading": false
            })
        );
    }
}
