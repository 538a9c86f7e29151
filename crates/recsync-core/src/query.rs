//! Snapshot query predicates

use crate::event::ChangeEvent;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Conjunction of field-equality constraints
///
/// An empty query matches every record. Sources apply it when answering
/// `fetch_all`; it is public so that custom sources can reuse it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

impl Query {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Whether this query has no constraints
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check a record against every constraint
    pub fn matches(&self, record: &Record) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| record.field(field) == Some(expected))
    }

    /// Restrict a live change to the records this query selects
    ///
    /// An added record outside the query is dropped. An update that moves a
    /// record out of the query becomes its removal. Removals always pass.
    pub fn scope(&self, event: ChangeEvent) -> Option<ChangeEvent> {
        match event {
            ChangeEvent::Added(record) if !self.matches(&record) => None,
            ChangeEvent::Updated(record) if !self.matches(&record) => {
                Some(ChangeEvent::Removed(record))
            }
            event => Some(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_matches_everything() {
        let record = Record::new("connection", "1");
        assert!(Query::new().matches(&record));
    }

    #[test]
    fn test_field_constraints() {
        let record = Record::new("basicmessage", "m1")
            .with_field("connectionId", "c1")
            .with_state("sent");

        assert!(Query::new().with_field("connectionId", "c1").matches(&record));
        assert!(
            !Query::new()
                .with_field("connectionId", "c1")
                .with_field("state", "received")
                .matches(&record)
        );
        assert!(!Query::new().with_field("missing", "x").matches(&record));
    }

    #[test]
    fn test_scope_live_changes() {
        let query = Query::new().with_field("connectionId", "c1");
        let inside = Record::new("basicmessage", "m1").with_field("connectionId", "c1");
        let outside = Record::new("basicmessage", "m2").with_field("connectionId", "c2");

        assert_eq!(
            query.scope(ChangeEvent::Added(inside.clone())),
            Some(ChangeEvent::Added(inside.clone()))
        );
        assert_eq!(query.scope(ChangeEvent::Added(outside.clone())), None);
        assert_eq!(
            query.scope(ChangeEvent::Updated(outside.clone())),
            Some(ChangeEvent::Removed(outside))
        );
        assert_eq!(
            query.scope(ChangeEvent::removed("basicmessage", "m1")),
            Some(ChangeEvent::removed("basicmessage", "m1"))
        );
    }
}
