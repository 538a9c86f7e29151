//! Configuration types for the record synchronization system
//!
//! This module defines all configuration structures used throughout the crate.

use crate::query::Query;
use crate::record::RecordType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main synchronization configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Record types to mirror
    #[serde(default)]
    pub record_types: Vec<RecordTypeConfig>,

    /// Optional webhook relay
    #[serde(default)]
    pub relay: Option<RelayConfig>,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record type to mirror
    pub fn with_record_type(mut self, record_type: RecordTypeConfig) -> Self {
        self.record_types.push(record_type);
        self
    }

    /// Set the relay configuration
    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut seen = HashSet::new();
        for record_type in &self.record_types {
            record_type.validate()?;
            if !seen.insert(&record_type.name) {
                return Err(crate::Error::config(format!(
                    "Record type configured twice: {}",
                    record_type.name
                )));
            }
        }

        if let Some(relay) = &self.relay {
            relay.validate()?;
        }

        self.engine.validate()
    }
}

/// A record type to mirror
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeConfig {
    /// Declared type tag (e.g. "connection")
    pub name: RecordType,

    /// Optional snapshot query
    #[serde(default)]
    pub query: Option<Query>,

    /// Whether this type is attached by `SyncRegistry::attach_configured`
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RecordTypeConfig {
    /// Create a new record type configuration
    pub fn new(name: impl Into<RecordType>) -> Self {
        Self {
            name: name.into(),
            query: None,
            enabled: true,
        }
    }

    /// Restrict the snapshot with a query
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Enable or disable the type
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.name.as_str().trim().is_empty() {
            return Err(crate::Error::config("Record type name cannot be empty"));
        }
        Ok(())
    }
}

/// Webhook relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Endpoint receiving `POST` requests
    pub url: String,

    /// Topics to forward (None = every topic)
    #[serde(default)]
    pub topics: Option<Vec<String>>,

    /// HTTP timeout per delivery (in seconds)
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,
}

impl RelayConfig {
    /// Create a relay configuration forwarding every topic
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            topics: None,
            timeout_secs: default_relay_timeout_secs(),
        }
    }

    /// Restrict the forwarded topics
    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.topics = Some(topics);
        self
    }

    /// Whether a topic should be forwarded
    pub fn forwards(&self, topic: &str) -> bool {
        match &self.topics {
            Some(topics) => topics.iter().any(|t| t == topic),
            None => true,
        }
    }

    /// Validate the relay configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.url.is_empty() {
            return Err(crate::Error::config("Relay URL cannot be empty"));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(crate::Error::config(format!(
                "Relay URL must use HTTP or HTTPS scheme. Got: {}",
                self.url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("Relay timeout must be > 0"));
        }
        if let Some(topics) = &self.topics
            && topics.is_empty()
        {
            return Err(crate::Error::config(
                "Relay topics cannot be an empty list (omit it to forward every topic)",
            ));
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the relay monitoring event channel
    ///
    /// When full, new relay events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Capacity of each session's command channel (readiness requests)
    #[serde(default = "default_command_channel_capacity")]
    pub command_channel_capacity: usize,

    /// Snapshot fetch timeout (in seconds)
    ///
    /// Set to 0 to wait for the source indefinitely.
    #[serde(default = "default_snapshot_timeout_secs")]
    pub snapshot_timeout_secs: u64,
}

impl EngineConfig {
    /// Snapshot timeout, if any
    pub fn snapshot_timeout(&self) -> Option<Duration> {
        (self.snapshot_timeout_secs > 0).then(|| Duration::from_secs(self.snapshot_timeout_secs))
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.command_channel_capacity == 0 {
            return Err(crate::Error::config("Command channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            command_channel_capacity: default_command_channel_capacity(),
            snapshot_timeout_secs: default_snapshot_timeout_secs(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_relay_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_command_channel_capacity() -> usize {
    32
}

fn default_snapshot_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: SyncConfig = serde_json::from_value(json!({})).unwrap();
        assert!(config.record_types.is_empty());
        assert!(config.relay.is_none());
        assert_eq!(config.engine.event_channel_capacity, 1000);
        assert_eq!(config.engine.snapshot_timeout(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_record_type_defaults() {
        let config: SyncConfig = serde_json::from_value(json!({
            "record_types": [
                {"name": "connection"},
                {"name": "proof", "enabled": false, "query": {"fields": {"state": "done"}}}
            ]
        }))
        .unwrap();

        assert!(config.record_types[0].enabled);
        assert!(!config.record_types[1].enabled);
        assert!(config.record_types[1].query.is_some());
    }

    #[test]
    fn test_duplicate_record_type_rejected() {
        let config = SyncConfig::new()
            .with_record_type(RecordTypeConfig::new("connection"))
            .with_record_type(RecordTypeConfig::new("connection"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relay_validation() {
        assert!(RelayConfig::new("https://hooks.example.com").validate().is_ok());
        assert!(RelayConfig::new("").validate().is_err());
        assert!(RelayConfig::new("ftp://hooks.example.com").validate().is_err());
        assert!(
            RelayConfig::new("http://localhost:3044")
                .with_topics(vec![])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_relay_topic_filter() {
        let relay = RelayConfig::new("http://localhost").with_topics(vec!["proofs".into()]);
        assert!(relay.forwards("proofs"));
        assert!(!relay.forwards("connections"));
        assert!(RelayConfig::new("http://localhost").forwards("connections"));
    }

    #[test]
    fn test_zero_timeout_disables_snapshot_timeout() {
        let engine = EngineConfig {
            snapshot_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert_eq!(engine.snapshot_timeout(), None);
    }
}
