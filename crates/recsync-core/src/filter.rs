//! Event filter
//!
//! Narrows the heterogeneous change stream of a source down to one record
//! type. This is a pure dispatch step: no buffering, no deduplication. Every
//! matching event is forwarded exactly once, in source order.

use crate::event::ChangeEvent;
use crate::record::{Record, RecordType};
use crate::traits::EventStream;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tokio_stream::{Stream, StreamExt};

/// Selects the events of one record type
#[derive(Debug, Clone)]
pub struct EventFilter {
    record_type: RecordType,
}

impl EventFilter {
    /// Create a filter for `record_type`
    pub fn new(record_type: impl Into<RecordType>) -> Self {
        Self {
            record_type: record_type.into(),
        }
    }

    /// The record type this filter lets through
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Whether an event belongs to this filter's type
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.record_type() == &self.record_type
    }

    /// Narrow a source stream
    ///
    /// Returns the narrowed stream and a handle that stops delivery.
    pub fn narrow(&self, stream: EventStream) -> (FilteredEvents, Subscription) {
        let cancelled = Arc::new(AtomicBool::new(false));

        let events = FilteredEvents {
            inner: Some(stream),
            record_type: self.record_type.clone(),
            cancelled: Arc::clone(&cancelled),
        };

        let subscription = Subscription {
            record_type: self.record_type.clone(),
            cancelled,
        };

        (events, subscription)
    }
}

/// Handle controlling the delivery of a [`FilteredEvents`] stream
#[derive(Debug, Clone)]
pub struct Subscription {
    record_type: RecordType,
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    /// Stop delivery
    ///
    /// Takes effect immediately: the stream yields `None` on its next poll
    /// and never delivers another event, even one already buffered upstream.
    pub fn unsubscribe(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!("Unsubscribed from {} events", self.record_type);
        }
    }

    /// Whether events are still being delivered
    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }

    /// Tie delivery to the lifetime of the returned guard
    ///
    /// Dropping the guard unsubscribes. Clones of this handle taken before
    /// the call keep working but no longer control the lifetime.
    pub fn cancel_on_drop(self) -> SubscriptionGuard {
        SubscriptionGuard { subscription: self }
    }
}

/// [`Subscription`] that unsubscribes when dropped
#[derive(Debug)]
pub struct SubscriptionGuard {
    subscription: Subscription,
}

impl Deref for SubscriptionGuard {
    type Target = Subscription;

    fn deref(&self) -> &Subscription {
        &self.subscription
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

/// Change events of a single record type, in source order
pub struct FilteredEvents {
    inner: Option<EventStream>,
    record_type: RecordType,
    cancelled: Arc<AtomicBool>,
}

impl FilteredEvents {
    /// The record type of every yielded event
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Records added to this type
    pub fn added(self) -> impl Stream<Item = Record> + Send + 'static {
        self.filter_map(|event| match event {
            ChangeEvent::Added(record) => Some(record),
            _ => None,
        })
    }

    /// Records updated within this type
    pub fn updated(self) -> impl Stream<Item = Record> + Send + 'static {
        self.filter_map(|event| match event {
            ChangeEvent::Updated(record) => Some(record),
            _ => None,
        })
    }

    /// Records removed from this type
    pub fn removed(self) -> impl Stream<Item = Record> + Send + 'static {
        self.filter_map(|event| match event {
            ChangeEvent::Removed(record) => Some(record),
            _ => None,
        })
    }
}

impl Stream for FilteredEvents {
    type Item = ChangeEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChangeEvent>> {
        let this = self.get_mut();

        loop {
            if this.cancelled.load(Ordering::SeqCst) {
                // Releases the upstream subscription
                this.inner = None;
                return Poll::Ready(None);
            }

            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) if event.record_type() == &this.record_type => {
                    return Poll::Ready(Some(event));
                }
                Poll::Ready(Some(_)) => continue,
                Poll::Ready(None) => {
                    this.inner = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
