// # Record Source Implementations
//
// This module provides implementations of the RecordSource trait.

pub mod memory;

pub use memory::MemoryRecordSource;
