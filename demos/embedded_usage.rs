//! Minimal embedding example for recsync-core
//!
//! Mirrors two record types from an in-memory source, reads them through the
//! registry and derived views, and optionally relays every change to a
//! webhook.
//!
//! ## Configuration
//!
//! - `RECSYNC_LOG_LEVEL`: trace, debug, info (default), warn, error
//! - `RECSYNC_WEBHOOK_URL`: relay endpoint (relay disabled when unset)
//! - `RECSYNC_WEBHOOK_MODE`: `dry-run` to log payloads instead of sending them

use anyhow::Result;
use recsync_core::config::{RecordTypeConfig, RelayConfig, SyncConfig};
use recsync_core::{
    EventRelay, MemoryRecordSource, Record, RecordId, RecordType, SyncRegistry, ViewSpec,
};
use recsync_webhook::WebhookSink;
use std::env;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

fn log_level() -> Level {
    match env::var("RECSYNC_LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(log_level()).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("=== Embedded recsync-core Example ===\n");

    // Source with a few existing records
    let source = MemoryRecordSource::new();
    source.seed(Record::new("connection", "c1").with_state("invited"));
    source.seed(Record::new("connection", "c2").with_state("completed"));
    source.seed(
        Record::new("proof", "p1")
            .with_state("request-sent")
            .with_field("connectionId", "c2"),
    );

    let mut config = SyncConfig::new()
        .with_record_type(RecordTypeConfig::new("connection"))
        .with_record_type(RecordTypeConfig::new("proof"));
    if let Ok(url) = env::var("RECSYNC_WEBHOOK_URL") {
        config = config.with_relay(RelayConfig::new(url));
    }
    config.validate()?;

    // Optional relay, independent of synchronization
    let relay = match &config.relay {
        Some(relay_config) => {
            let sink = WebhookSink::from_config(relay_config)?;
            let (relay, mut events) = EventRelay::new(
                Arc::new(source.clone()),
                Box::new(sink),
                relay_config.clone(),
                &config.engine,
            )?;
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
            let handle = tokio::spawn(async move { relay.run_with_shutdown(Some(shutdown_rx)).await });
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    info!("Relay: {:?}", event);
                }
            });
            Some((shutdown_tx, handle))
        }
        None => {
            info!("RECSYNC_WEBHOOK_URL not set, relay disabled");
            None
        }
    };

    let registry = SyncRegistry::with_engine_config(Arc::new(source.clone()), config.engine.clone());
    let mut attachments = registry.attach_configured(&config)?;
    for attachment in &attachments {
        attachment.ready().await?;
    }

    let connection = RecordType::new("connection");
    println!(
        "Connections after snapshot: {}",
        serde_json::to_string(&registry.get_collection(&connection)?)?
    );

    // Live changes
    source.insert(Record::new("connection", "c3").with_state("invited"));
    source.update(Record::new("connection", "c1").with_state("completed"))?;
    source.remove(&connection, &RecordId::new("c2"));

    let connections = attachments
        .iter_mut()
        .find(|a| a.record_type() == &connection)
        .ok_or_else(|| anyhow::anyhow!("connection is not attached"))?;
    while connections.collection().contains(&RecordId::new("c2")) {
        connections.changed().await?;
    }

    println!(
        "Connections after changes: {}",
        serde_json::to_string(&registry.get_collection(&connection)?)?
    );

    let completed = registry.select_by(&connection, &ViewSpec::in_states(["completed"]))?;
    println!("Completed connections: {}", completed.len());

    let pending = registry.select_by(&connection, &ViewSpec::excluding_states(["completed"]))?;
    println!("Pending connections: {}", pending.len());

    match registry.get_collection(&RecordType::new("credential")) {
        Ok(_) => warn!("credential unexpectedly attached"),
        Err(e) => println!("Unattached type: {}", e),
    }

    drop(attachments);
    println!("Attached types after detach: {:?}", registry.attached_types());

    if let Some((shutdown_tx, handle)) = relay {
        let _ = shutdown_tx.send(());
        handle.await??;
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
