//! Contract Test: Snapshot/Event Race Safety
//!
//! The snapshot fetch and the live subscription start together. These tests
//! hold the fetch open while events arrive, then let it resolve.
//!
//! Constraints verified:
//! - Events arriving while loading are never lost
//! - Merging is idempotent: no duplicate ids whatever the interleaving
//! - A removal that raced the snapshot is not undone by it
//! - Events of one type are applied in arrival order

mod common;

use common::*;
use recsync_core::{ChangeEvent, Record, RecordType, SyncRegistry};
use std::sync::Arc;

#[tokio::test]
async fn events_before_snapshot_are_merged_without_duplicates() {
    let source = ControlledRecordSource::gated();
    let registry = SyncRegistry::new(Arc::new(source.clone()));

    let attachment = registry.attach("connection").unwrap();
    let mut rx = attachment.watch();

    source.emit(ChangeEvent::Added(connection("A", "invited")));
    source.emit(ChangeEvent::Added(connection("B", "invited")));

    // Snapshot already reflects B
    source.set_snapshot(vec![connection("B", "invited")]);
    source.release_fetch();

    attachment.ready().await.unwrap();
    let collection = wait_for(&mut rx, |c| !c.is_loading() && c.len() == 2).await;

    assert_eq!(ids(&collection), vec!["B", "A"]);
    assert!(!collection.is_loading());
}

#[tokio::test]
async fn collection_stays_loading_while_fetch_is_pending() {
    let source = ControlledRecordSource::gated();
    let registry = SyncRegistry::new(Arc::new(source.clone()));
    let attachment = registry.attach("connection").unwrap();

    source.emit(ChangeEvent::Added(connection("A", "invited")));
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    // Queued, not applied
    let collection = registry
        .get_collection(&RecordType::new("connection"))
        .unwrap();
    assert!(collection.is_loading());
    assert!(collection.is_empty());

    source.release_fetch();
    attachment.ready().await.unwrap();

    let mut rx = attachment.watch();
    let collection = wait_for(&mut rx, |c| c.len() == 1).await;
    assert_eq!(ids(&collection), vec!["A"]);
}

#[tokio::test]
async fn removal_racing_the_snapshot_is_not_resurrected() {
    let source = ControlledRecordSource::gated();
    let registry = SyncRegistry::new(Arc::new(source.clone()));

    let attachment = registry.attach("connection").unwrap();
    let mut rx = attachment.watch();

    source.emit(ChangeEvent::removed("connection", "1"));

    // Stale snapshot still lists the removed record
    source.set_snapshot(vec![connection("1", "invited"), connection("2", "invited")]);
    source.release_fetch();

    attachment.ready().await.unwrap();
    let collection = wait_for(&mut rx, |c| !c.is_loading() && c.len() == 1).await;

    assert_eq!(ids(&collection), vec!["2"]);
}

#[tokio::test]
async fn update_racing_the_snapshot_wins_over_stale_content() {
    let source = ControlledRecordSource::gated();
    let registry = SyncRegistry::new(Arc::new(source.clone()));

    let attachment = registry.attach("connection").unwrap();
    let mut rx = attachment.watch();

    source.emit(ChangeEvent::Updated(connection("1", "completed")));
    source.set_snapshot(vec![connection("1", "invited")]);
    source.release_fetch();

    attachment.ready().await.unwrap();
    let collection = wait_for(&mut rx, |c| {
        c.records().first().and_then(Record::state) == Some("completed")
    })
    .await;

    assert_eq!(collection.len(), 1);
}

#[tokio::test]
async fn live_events_are_applied_in_arrival_order() {
    let source = ControlledRecordSource::new();
    let registry = SyncRegistry::new(Arc::new(source.clone()));

    let attachment = registry.attach("connection").unwrap();
    attachment.ready().await.unwrap();
    let mut rx = attachment.watch();

    for id in ["c", "a", "b", "e", "d"] {
        source.emit(ChangeEvent::Added(connection(id, "invited")));
    }
    source.emit(ChangeEvent::Updated(connection("a", "completed")));
    source.emit(ChangeEvent::removed("connection", "b"));
    source.emit(ChangeEvent::Added(connection("b", "invited")));

    let collection = wait_for(&mut rx, |c| {
        c.len() == 5 && ids(c).last().map(String::as_str) == Some("b")
    })
    .await;

    assert_eq!(ids(&collection), vec!["c", "a", "e", "d", "b"]);
    assert_eq!(collection.records()[1].state(), Some("completed"));
}

#[tokio::test]
async fn duplicate_add_after_snapshot_does_not_duplicate() {
    let source = ControlledRecordSource::new();
    source.set_snapshot(vec![connection("1", "invited")]);
    let registry = SyncRegistry::new(Arc::new(source.clone()));

    let attachment = registry.attach("connection").unwrap();
    attachment.ready().await.unwrap();
    let mut rx = attachment.watch();

    source.emit(ChangeEvent::Added(connection("1", "invited")));
    source.emit(ChangeEvent::Added(connection("2", "invited")));

    let collection = wait_for(&mut rx, |c| c.len() == 2).await;
    assert_eq!(ids(&collection), vec!["1", "2"]);
}
