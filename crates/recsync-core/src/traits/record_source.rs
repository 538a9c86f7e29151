// # Record Source Trait
//
// Defines the interface to the external system that owns records.
//
// ## Implementations
//
// - In-memory: `recsync_core::source::MemoryRecordSource`
// - Agents, services or message buses wrapping their own query/event APIs
//
// ## Usage
//
// ```rust,ignore
// use recsync_core::{RecordSource, RecordType};
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* RecordSource implementation */;
//
//     // Subscribe first, then fetch, so no change can fall between the two
//     let mut events = source.subscribe();
//     let records = source.fetch_all(&RecordType::new("connection"), None).await?;
//
//     while let Some(event) = events.next().await {
//         println!("{} {}", event.kind(), event.id());
//     }
//
//     Ok(())
// }
// ```

use crate::event::ChangeEvent;
use crate::query::Query;
use crate::record::{Record, RecordType};
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// Heterogeneous live stream of change events for every record type
pub type EventStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send + 'static>>;

/// Trait for record source implementations
///
/// The source is the single writer of every record it exposes. It offers two
/// capabilities:
/// 1. **fetch_all()**: a point-in-time list of records of one type
/// 2. **subscribe()**: an ordered stream of typed change notifications
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Ordering
///
/// Events for one record type must be yielded in the order the source
/// applied them. No ordering is required across types, and no relationship
/// is assumed between the completion of `fetch_all` and the events already
/// observed on a stream obtained earlier.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record of `record_type` matching `query`
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Record>)`: The records, in source order
    /// - `Err(Error::SourceUnavailable)`: If the source cannot answer
    async fn fetch_all(
        &self,
        record_type: &RecordType,
        query: Option<&Query>,
    ) -> Result<Vec<Record>, crate::Error>;

    /// Subscribe to live changes for every record type
    ///
    /// The stream may stay empty indefinitely. Dropping it must release the
    /// subscription.
    fn subscribe(&self) -> EventStream;

    /// Whether the source is ready to answer `fetch_all`
    fn is_initialized(&self) -> bool {
        true
    }

    /// Short name used in logs
    fn source_name(&self) -> &'static str;
}
