//! Event relay
//!
//! Forwards every change observed on a record source to a [`ChangeSink`],
//! independently of any synchronized collection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ RecordSource │─── ChangeEvent ───┐
//! └──────────────┘                   │
//!                                    ▼
//!                           ┌──────────────┐
//!                           │  EventRelay  │
//!                           └──────────────┘
//!                                    │
//!                    ┌───────────────┴───────────────┐
//!                    │                               │
//!                    ▼                               ▼
//!            ┌──────────────┐                ┌─────────────┐
//!            │  ChangeSink  │                │   Events    │
//!            │  (deliver)   │                │  (notify)   │
//!            └──────────────┘                └─────────────┘
//! ```
//!
//! ## Delivery
//!
//! Events are handed to the sink one at a time, in source order. Delivery is
//! best-effort: a failure is logged and reported as
//! [`RelayEvent::DeliveryFailed`], and the relay moves on to the next event.
//! Nothing is retried and nothing flows back to the source.

use crate::config::{EngineConfig, RelayConfig};
use crate::error::Result;
use crate::event::{ChangeEvent, ChangeKind};
use crate::record::RecordId;
use crate::traits::{ChangeSink, RecordSource};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Events emitted by the EventRelay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Relay started
    Started { sink: String },

    /// Sink accepted the change
    Delivered {
        topic: String,
        id: RecordId,
        kind: ChangeKind,
    },

    /// Sink rejected the change or could not be reached
    DeliveryFailed {
        topic: String,
        id: RecordId,
        error: String,
    },

    /// Topic not configured for forwarding
    Skipped { topic: String, id: RecordId },

    /// Relay stopped
    Stopped { reason: String },
}

/// Best-effort forwarder of change events
///
/// ## Lifecycle
///
/// 1. Create with [`EventRelay::new()`]
/// 2. Start with [`EventRelay::run()`]
/// 3. The relay runs until a shutdown signal is received or the source
///    stream ends
pub struct EventRelay {
    /// Source whose change stream is forwarded
    source: Arc<dyn RecordSource>,

    /// Destination of every forwarded event
    sink: Box<dyn ChangeSink>,

    /// Topic filter
    config: RelayConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<RelayEvent>,
}

impl EventRelay {
    /// Create a new relay
    ///
    /// # Parameters
    ///
    /// - `source`: Record source to subscribe to
    /// - `sink`: Sink implementation
    /// - `config`: Relay configuration
    /// - `engine`: Engine settings (monitoring channel capacity)
    ///
    /// # Returns
    ///
    /// A tuple of (relay, event_receiver) where event_receiver yields relay events
    pub fn new(
        source: Arc<dyn RecordSource>,
        sink: Box<dyn ChangeSink>,
        config: RelayConfig,
        engine: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<RelayEvent>)> {
        config.validate()?;
        engine.validate()?;

        let (tx, rx) = mpsc::channel(engine.event_channel_capacity);

        let relay = Self {
            source,
            sink,
            config,
            event_tx: tx,
        };

        Ok((relay, rx))
    }

    /// Run the relay until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown, or the source stream ended
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the relay until `shutdown_rx` fires
    ///
    /// Used when the relay is embedded in a larger application that owns
    /// shutdown, and by tests.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        // Subscribe first so that nothing emitted after start is missed
        let mut events = self.source.subscribe();

        self.emit_event(RelayEvent::Started {
            sink: self.sink.sink_name().to_string(),
        });
        info!(
            "Relaying {} changes to {} sink",
            self.source.source_name(),
            self.sink.sink_name()
        );

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => self.relay(&event).await,
                    None => break "Event stream ended",
                },

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break "Shutdown signal";
                }
            }
        };

        self.emit_event(RelayEvent::Stopped {
            reason: reason.to_string(),
        });
        info!("Relay stopped: {}", reason);

        Ok(())
    }

    /// Forward one event
    async fn relay(&self, event: &ChangeEvent) {
        let topic = event.record_type().topic();
        let id = event.id().clone();

        if !self.config.forwards(&topic) {
            debug!("Topic {} not forwarded, skipping {}", topic, id);
            self.emit_event(RelayEvent::Skipped { topic, id });
            return;
        }

        match self.sink.deliver(event).await {
            Ok(()) => {
                debug!("Delivered {} {} on {}", event.kind(), id, topic);
                self.emit_event(RelayEvent::Delivered {
                    topic,
                    id,
                    kind: event.kind(),
                });
            }
            Err(e) => {
                warn!("Delivery of {} {} on {} failed: {}", event.kind(), id, topic, e);
                self.emit_event(RelayEvent::DeliveryFailed {
                    topic,
                    id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Emit a relay event
    fn emit_event(&self, event: RelayEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Relay event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
