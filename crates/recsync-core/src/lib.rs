// # recsync-core
//
// Core library for mirroring externally-owned records.
//
// ## Architecture Overview
//
// A record source owns a set of typed records. It answers a one-time snapshot
// query and emits a live stream of add/update/remove notifications. This
// library keeps an in-memory, deduplicated, ordered mirror of each attached
// record type:
// - **RecordSource**: Trait for the external owner of the records
// - **SnapshotLoader**: One-time bulk fetch of a record type
// - **EventFilter**: Narrows the change stream to one record type
// - **SyncMachine**: Reconciles the snapshot with concurrently arriving events
// - **SyncRegistry**: Attach/detach handles and the consumer-facing read API
// - **Selector**: Memoized derived views over a synchronized collection
// - **EventRelay**: Best-effort forwarding of changes to a ChangeSink
//
// ## Design Principles
//
// 1. **Immutable Values**: Every transition produces a new collection value
// 2. **Single Writer**: One driver task per record type applies changes in order
// 3. **Scoped Lifetimes**: Attachments release their subscription on drop
// 4. **Plugin-Based**: Sinks live in their own crates behind a trait

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod loader;
pub mod query;
pub mod record;
pub mod registry;
pub mod relay;
pub mod source;
pub mod sync;
pub mod traits;
pub mod views;

// Re-export core types for convenience
pub use config::{EngineConfig, RecordTypeConfig, RelayConfig, SyncConfig};
pub use error::{Error, Result};
pub use event::{ChangeEvent, ChangeKind};
pub use filter::{EventFilter, FilteredEvents, Subscription, SubscriptionGuard};
pub use loader::SnapshotLoader;
pub use query::Query;
pub use record::{Identified, Record, RecordId, RecordType};
pub use registry::{Attachment, SyncRegistry};
pub use relay::{EventRelay, RelayEvent};
pub use source::MemoryRecordSource;
pub use sync::{SyncCollection, SyncMachine};
pub use traits::{ChangeSink, EventStream, RecordSource};
pub use views::{JoinSelector, Selector, ViewSpec};
