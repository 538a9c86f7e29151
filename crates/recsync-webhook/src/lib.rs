// # Webhook Change Sink
//
// This crate provides a webhook ChangeSink implementation for the record
// synchronization system.
//
// Every change handed over by the EventRelay becomes one HTTP request:
//
// ```http
// POST <url>
// Content-Type: application/json
//
// { "topic": "connections", "body": { "type": "connection", "id": "1", ... } }
// ```
//
// The topic is the lowercase plural of the record type.
//
// ## Delivery Semantics
//
// - One request per change, no retry, no backoff, no buffering
// - HTTP timeout taken from the relay configuration
// - Transport failures and non-2xx statuses become `Error::DeliveryFailure`
// - Dry-run mode (`RECSYNC_WEBHOOK_MODE=dry-run`) logs the payload instead
//
// A failed delivery never reaches the record source or any synchronized
// collection: the relay logs it and moves on.

use async_trait::async_trait;
use recsync_core::config::RelayConfig;
use recsync_core::traits::ChangeSink;
use recsync_core::{ChangeEvent, Error, Record, Result};
use serde::Serialize;
use std::time::Duration;

/// Environment variable selecting the delivery mode
pub const MODE_ENV: &str = "RECSYNC_WEBHOOK_MODE";

/// Request body of one delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload<'a> {
    /// Lowercase plural of the record type
    pub topic: String,

    /// The changed record, serialized
    pub body: &'a Record,
}

impl<'a> WebhookPayload<'a> {
    /// Build the payload for a change
    pub fn from_event(event: &'a ChangeEvent) -> Self {
        Self {
            topic: event.record_type().topic(),
            body: event.record(),
        }
    }
}

/// Webhook change sink
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the sink logs the request it would have sent and
/// reports success without contacting the endpoint.
#[derive(Debug)]
pub struct WebhookSink {
    /// Endpoint receiving the POST requests
    url: String,

    /// HTTP client for deliveries
    client: reqwest::Client,

    /// Dry-run mode: if true, log the payload instead of sending it
    dry_run: bool,
}

impl WebhookSink {
    /// Create a new webhook sink
    ///
    /// # Parameters
    ///
    /// - `url`: Endpoint receiving the POST requests
    /// - `timeout`: HTTP timeout per delivery
    /// - `dry_run`: If true, log payloads instead of sending them
    ///
    /// # Returns
    ///
    /// - `Ok(WebhookSink)`: Ready to deliver
    /// - `Err(Error::Config)`: Empty URL or HTTP client construction failure
    pub fn new(url: impl Into<String>, timeout: Duration, dry_run: bool) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(Error::config("Webhook URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url,
            client,
            dry_run,
        })
    }

    /// Create a webhook sink that sends requests
    pub fn new_live(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::new(url, timeout, false)
    }

    /// Create a webhook sink that only logs what it would send
    pub fn new_dry_run(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::new(url, timeout, true)
    }

    /// Create a webhook sink from relay configuration
    ///
    /// The delivery mode is read from `RECSYNC_WEBHOOK_MODE`.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        config.validate()?;

        let dry_run = std::env::var(MODE_ENV)
            .unwrap_or_default()
            .to_lowercase()
            == "dry-run";

        if dry_run {
            tracing::warn!("Webhook sink running in DRY-RUN mode - no requests will be sent");
        }

        Self::new(
            config.url.clone(),
            Duration::from_secs(config.timeout_secs),
            dry_run,
        )
    }

    /// The configured endpoint
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether deliveries are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

#[async_trait]
impl ChangeSink for WebhookSink {
    async fn deliver(&self, event: &ChangeEvent) -> Result<()> {
        let payload = WebhookPayload::from_event(event);
        let topic = payload.topic.clone();

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {}",
                self.url,
                serde_json::to_string(&payload)?
            );
            return Ok(());
        }

        tracing::debug!(
            "Posting {} {} on {} to {}",
            event.kind(),
            event.id(),
            topic,
            self.url
        );

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::delivery_failure(&topic, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(match status.as_u16() {
                401 | 403 => Error::delivery_failure(
                    topic,
                    format!("Endpoint rejected credentials. Status: {}", status),
                ),
                404 => Error::delivery_failure(
                    topic,
                    format!("Endpoint not found. Status: {}", status),
                ),
                429 => Error::delivery_failure(
                    topic,
                    format!("Endpoint rate limit exceeded. Status: {}", status),
                ),
                500..=599 => Error::delivery_failure(
                    topic,
                    format!("Endpoint server error: {} - {}", status, error_text),
                ),
                _ => Error::delivery_failure(
                    topic,
                    format!("Unexpected response: {} - {}", status, error_text),
                ),
            });
        }

        tracing::debug!("Webhook accepted {} {}", topic, event.id());
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "webhook"
    }
}
