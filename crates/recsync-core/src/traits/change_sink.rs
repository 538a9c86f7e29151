// # Change Sink Trait
//
// Defines the interface for forwarding change events to external systems.
//
// ## Implementations
//
// - Webhook: `recsync-webhook` crate (HTTP POST of `{ topic, body }`)

use crate::event::ChangeEvent;
use async_trait::async_trait;

/// Trait for change sink implementations
///
/// A sink makes one delivery attempt per event. It does not retry, back off
/// or buffer: delivery is best-effort and a failure is reported to the
/// [`EventRelay`](crate::relay::EventRelay), which logs it and moves on.
///
/// Sinks never touch synchronized collections.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// Deliver one change event
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The endpoint acknowledged the delivery
    /// - `Err(Error::DeliveryFailure)`: Transport failure or non-success status
    async fn deliver(&self, event: &ChangeEvent) -> Result<(), crate::Error>;

    /// Short name used in logs
    fn sink_name(&self) -> &'static str;
}
