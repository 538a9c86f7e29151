//! Record synchronization
//!
//! - [`SyncCollection`]: immutable, deduplicated mirror of one record type
//! - [`SyncMachine`]: snapshot/event reconciliation rules
//! - [`SyncSession`]: the running lifecycle of one attached record type

pub mod collection;
pub mod machine;
pub mod session;

pub use collection::SyncCollection;
pub use machine::{Phase, SyncMachine, Transition};
pub use session::SyncSession;
