//! Pure projections over a record slice
//!
//! Every projection keeps the collection's own order, so a fixed input and
//! fixed parameters always produce the same output.

use crate::record::{Identified, Record, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Records whose `state` is one of `states`
///
/// With `invert`, the records whose state is *not* listed (records without a
/// state included).
pub fn by_state(records: &[Record], states: &[String], invert: bool) -> Vec<Record> {
    records
        .iter()
        .filter(|r| {
            let listed = r.state().is_some_and(|s| states.iter().any(|x| x == s));
            listed != invert
        })
        .cloned()
        .collect()
}

/// Records whose `state` is not one of `states`
pub fn excluding_state(records: &[Record], states: &[String]) -> Vec<Record> {
    by_state(records, states, true)
}

/// The record with `id`
pub fn by_id(records: &[Record], id: &RecordId) -> Option<Record> {
    records.iter().find(|r| r.id() == id).cloned()
}

/// Records whose payload field `field` equals `value`
pub fn by_field(records: &[Record], field: &str, value: &Value) -> Vec<Record> {
    records
        .iter()
        .filter(|r| r.field(field) == Some(value))
        .cloned()
        .collect()
}

/// A record paired with the record its foreign key points to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Joined {
    pub record: Record,
    pub related: Option<Record>,
}

/// Pair every record of `left` with the `right` record whose id equals its
/// `field` foreign key
///
/// Left order is kept; a dangling or missing key yields `related: None`.
pub fn join_by_foreign_key(left: &[Record], right: &[Record], field: &str) -> Vec<Joined> {
    left.iter()
        .map(|record| {
            let related = record
                .foreign_key(field)
                .and_then(|key| right.iter().find(|r| r.id().as_str() == key))
                .cloned();
            Joined {
                record: record.clone(),
                related,
            }
        })
        .collect()
}

/// Declared projection parameters
///
/// Hashable so that the registry can keep one memoized view per spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewSpec {
    /// Every record
    All,
    /// At most the record with this id
    ById { id: RecordId },
    /// Records in (or, inverted, not in) the listed states
    ByState {
        states: Vec<String>,
        #[serde(default)]
        invert: bool,
    },
    /// Records whose field equals the value
    ///
    /// A string field is compared as is; any other field by its JSON text.
    ByField { field: String, value: String },
}

impl ViewSpec {
    /// Records in one of `states`
    pub fn in_states<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ViewSpec::ByState {
            states: states.into_iter().map(Into::into).collect(),
            invert: false,
        }
    }

    /// Records in none of `states`
    pub fn excluding_states<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ViewSpec::ByState {
            states: states.into_iter().map(Into::into).collect(),
            invert: true,
        }
    }

    /// Run the projection
    pub fn apply(&self, records: &[Record]) -> Vec<Record> {
        match self {
            ViewSpec::All => records.to_vec(),
            ViewSpec::ById { id } => by_id(records, id).into_iter().collect(),
            ViewSpec::ByState { states, invert } => by_state(records, states, *invert),
            ViewSpec::ByField { field, value } => records
                .iter()
                .filter(|r| match r.field(field) {
                    Some(Value::String(s)) => s == value,
                    Some(other) => other.to_string() == *value,
                    None => false,
                })
                .cloned()
                .collect(),
        }
    }
}
