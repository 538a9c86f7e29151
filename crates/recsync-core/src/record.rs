//! Record identity and typing
//!
//! A record is identified by its declared type tag plus an id that is unique
//! within that type. The type tag also selects the event channel a record
//! travels on and the topic it is relayed under.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field names owned by the record envelope
const RESERVED_FIELDS: &[&str] = &["type", "id"];

/// Declared type tag of a record (e.g. `"connection"`, `"proof"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordType(String);

impl RecordType {
    /// Create a record type from its tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The raw type tag
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relay topic for this type: the lowercase plural of the tag
    ///
    /// `connection` → `connections`, `address` → `addresses`,
    /// `identity` → `identities`.
    pub fn topic(&self) -> String {
        let lower = self.0.to_lowercase();

        if lower.ends_with('s')
            || lower.ends_with('x')
            || lower.ends_with('z')
            || lower.ends_with("ch")
            || lower.ends_with("sh")
        {
            return format!("{lower}es");
        }

        if let Some(stem) = lower.strip_suffix('y') {
            let after_vowel = stem
                .chars()
                .last()
                .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));
            if !stem.is_empty() && !after_vowel {
                return format!("{stem}ies");
            }
        }

        format!("{lower}s")
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for RecordType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// Stable identifier of a record, unique within its type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a record id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Anything the synchronization engine can keep a deduplicated mirror of
pub trait Identified: Clone + Send + Sync + 'static {
    /// Identity of the record within its type
    fn id(&self) -> &RecordId;

    /// Declared type tag, used for event routing
    fn record_type(&self) -> &RecordType;
}

/// A typed, serializable domain record owned by an external source
///
/// The payload is opaque to the engine. It is kept as a JSON object so that
/// any source can be mirrored without a schema, and decoded into a concrete
/// type on demand with [`Record::decode`].
///
/// Serialized form: `{ "type": ..., "id": ..., ...fields }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Declared type tag (immutable)
    #[serde(rename = "type")]
    record_type: RecordType,

    /// Stable id
    id: RecordId,

    /// Type-specific payload
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Record {
    /// Create a record with an empty payload
    pub fn new(record_type: impl Into<RecordType>, id: impl Into<RecordId>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Set a payload field
    ///
    /// The envelope keys `type` and `id` cannot be overridden and are ignored.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if !RESERVED_FIELDS.contains(&name.as_str()) {
            self.fields.insert(name, value.into());
        }
        self
    }

    /// Set the `state` field
    pub fn with_state(self, state: impl Into<String>) -> Self {
        self.with_field("state", state.into())
    }

    /// Build a record from a JSON object carrying `type` and `id`
    pub fn from_value(value: Value) -> crate::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize the record, envelope included
    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode the record into a caller-defined type
    pub fn decode<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.to_value()?)?)
    }

    /// Payload fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// A single payload field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The `state` field, when it is a string
    pub fn state(&self) -> Option<&str> {
        self.field("state").and_then(Value::as_str)
    }

    /// A string-valued foreign key such as `connectionId`
    pub fn foreign_key(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

impl Identified for Record {
    fn id(&self) -> &RecordId {
        &self.id
    }

    fn record_type(&self) -> &RecordType {
        &self.record_type
    }
}
