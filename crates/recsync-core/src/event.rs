//! Change notifications emitted by a record source

use crate::record::{Identified, Record, RecordId, RecordType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change, without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => f.write_str("added"),
            ChangeKind::Updated => f.write_str("updated"),
            ChangeKind::Removed => f.write_str("removed"),
        }
    }
}

/// A single add/update/remove notification for one record
///
/// Events of one record type are totally ordered by arrival. A `Removed`
/// event only needs to carry the id and type of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum ChangeEvent<R = Record> {
    Added(R),
    Updated(R),
    Removed(R),
}

impl<R: Identified> ChangeEvent<R> {
    /// The kind of change
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Added(_) => ChangeKind::Added,
            ChangeEvent::Updated(_) => ChangeKind::Updated,
            ChangeEvent::Removed(_) => ChangeKind::Removed,
        }
    }

    /// The affected record
    pub fn record(&self) -> &R {
        match self {
            ChangeEvent::Added(r) | ChangeEvent::Updated(r) | ChangeEvent::Removed(r) => r,
        }
    }

    /// Consume the event, returning the affected record
    pub fn into_record(self) -> R {
        match self {
            ChangeEvent::Added(r) | ChangeEvent::Updated(r) | ChangeEvent::Removed(r) => r,
        }
    }

    /// Type tag of the affected record
    pub fn record_type(&self) -> &RecordType {
        self.record().record_type()
    }

    /// Id of the affected record
    pub fn id(&self) -> &RecordId {
        self.record().id()
    }
}

impl ChangeEvent<Record> {
    /// Build a removal that only carries the identity of the record
    pub fn removed(record_type: impl Into<RecordType>, id: impl Into<RecordId>) -> Self {
        ChangeEvent::Removed(Record::new(record_type, id))
    }
}
