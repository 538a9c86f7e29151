//! Core traits for the record synchronization system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`RecordSource`]: The external owner of records (snapshot + live changes)
//! - [`ChangeSink`]: Best-effort forwarder of change events to external systems

pub mod change_sink;
pub mod record_source;

pub use change_sink::ChangeSink;
pub use record_source::{EventStream, RecordSource};
