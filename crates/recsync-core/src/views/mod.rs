//! Derived views
//!
//! Read-only projections over a [`SyncCollection`](crate::sync::SyncCollection),
//! memoized against the collection's identity and the projection parameters.

pub mod projections;
pub mod selector;

pub use projections::{
    Joined, ViewSpec, by_field, by_id, by_state, excluding_state, join_by_foreign_key,
};
pub use selector::{JoinSelector, Selector};
