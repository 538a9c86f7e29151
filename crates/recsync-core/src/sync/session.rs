//! Per-type synchronization session
//!
//! A session owns the lifecycle of one synchronized record type:
//!
//! ```text
//! ┌──────────────┐  subscribe()   ┌─────────────┐
//! │ RecordSource │───────────────▶│ EventFilter │──── events ────┐
//! └──────────────┘                └─────────────┘                │
//!        │                                                       ▼
//!        │ fetch_all()  ┌────────────────┐  snapshot   ┌───────────────┐
//!        └─────────────▶│ SnapshotLoader │────────────▶│ SessionDriver │
//!                       └────────────────┘             │ (SyncMachine) │
//!                                                      └───────────────┘
//!                                                              │ watch
//!                                                              ▼
//!                                                        consumers
//! ```
//!
//! The subscription is taken before the snapshot fetch starts, so no change
//! can fall between the two. Both then run concurrently; the machine's
//! queue-while-loading rule resolves the race.
//!
//! All mutation happens on a single driver task, one event or snapshot at a
//! time. Each new collection value is published through a `watch` channel.
//! When the session was started with a query, live changes are scoped to it
//! the same way the snapshot is.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::event::ChangeEvent;
use crate::filter::{EventFilter, FilteredEvents, SubscriptionGuard};
use crate::loader::SnapshotLoader;
use crate::query::Query;
use crate::record::{Record, RecordType};
use crate::sync::collection::SyncCollection;
use crate::sync::machine::{Phase, SyncMachine, Transition};
use crate::traits::RecordSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// Requests handled by the driver task
enum SessionCommand {
    /// Reply once the snapshot is applied, or with the fetch error
    AwaitReady(oneshot::Sender<Result<()>>),
}

/// Publication end of a session, shared by the handle and the driver
///
/// The closed flag is flipped while holding the channel's write lock, and
/// every publication checks it under that same lock. Once `close` returns,
/// no value can be published.
struct Publisher {
    state: watch::Sender<SyncCollection>,
    closed: AtomicBool,
}

impl Publisher {
    fn new() -> Self {
        let (state, _) = watch::channel(SyncCollection::new());
        Self {
            state,
            closed: AtomicBool::new(false),
        }
    }

    /// Publish `value` unless closed
    fn publish(&self, value: &SyncCollection) -> bool {
        self.state.send_if_modified(|current| {
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }
            *current = value.clone();
            true
        })
    }

    /// Close publication, returning false if it already was
    fn close(&self) -> bool {
        let mut closing = false;
        self.state.send_if_modified(|_| {
            closing = !self.closed.swap(true, Ordering::SeqCst);
            false
        });
        closing
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn current(&self) -> SyncCollection {
        self.state.borrow().clone()
    }
}

/// A running synchronization of one record type
pub struct SyncSession {
    record_type: RecordType,
    publisher: Arc<Publisher>,
    commands: mpsc::Sender<SessionCommand>,
    subscription: SubscriptionGuard,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl SyncSession {
    /// Subscribe to `record_type` and start fetching its snapshot
    ///
    /// Must be called within a Tokio runtime. A `query` scopes both the
    /// snapshot and the live changes.
    pub fn start(
        source: Arc<dyn RecordSource>,
        record_type: RecordType,
        query: Option<Query>,
        engine: &EngineConfig,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::config(format!(
                "Attaching to {} requires a running Tokio runtime",
                record_type
            ))
        })?;
        engine.validate()?;

        let (events, subscription) = EventFilter::new(record_type.clone()).narrow(source.subscribe());

        let loader = SnapshotLoader::new(Arc::clone(&source), record_type.clone())
            .with_query(query.clone())
            .with_timeout(engine.snapshot_timeout());

        let publisher = Arc::new(Publisher::new());
        let (command_tx, command_rx) = mpsc::channel(engine.command_channel_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = SessionDriver {
            machine: SyncMachine::new(record_type.clone()),
            query: query.filter(|q| !q.is_empty()),
            events,
            loader,
            commands: command_rx,
            publisher: Arc::clone(&publisher),
            fetch: None,
            waiters: Vec::new(),
        };

        runtime.spawn(driver.run(shutdown_rx));

        info!(
            "Attached to {} records from {} source",
            record_type,
            source.source_name()
        );

        Ok(Self {
            record_type,
            publisher,
            commands: command_tx,
            subscription: subscription.cancel_on_drop(),
            shutdown: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// The synchronized record type
    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    /// Latest collection value
    pub fn collection(&self) -> SyncCollection {
        self.publisher.current()
    }

    /// Receiver notified on every new collection value
    pub fn watch(&self) -> watch::Receiver<SyncCollection> {
        self.publisher.state.subscribe()
    }

    /// Wait for the snapshot to be applied
    ///
    /// If the last fetch failed, a new one is started. On failure the
    /// collection stays `loading` and the call may be repeated.
    pub async fn ready(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::not_attached(self.record_type.as_str()));
        }
        if !self.publisher.state.borrow().is_loading() {
            return Ok(());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::AwaitReady(reply_tx))
            .await
            .map_err(|_| Error::not_attached(self.record_type.as_str()))?;

        reply_rx
            .await
            .map_err(|_| Error::not_attached(self.record_type.as_str()))?
    }

    /// Whether the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.publisher.is_closed()
    }

    /// Tear the session down
    ///
    /// No event is applied and no value is published once this returns. The
    /// driver stops on its next poll and cancels an in-flight snapshot fetch.
    pub fn close(&self) {
        if !self.publisher.close() {
            return;
        }

        self.subscription.unsubscribe();
        if let Some(shutdown) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = shutdown.send(());
        }
        info!("Detached from {} records", self.record_type);
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Aborts the fetch task when dropped with the driver
struct FetchTask(JoinHandle<Result<Vec<Record>>>);

impl Drop for FetchTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Outcome of the running fetch; never resolves when none runs
async fn fetch_outcome(
    fetch: &mut Option<FetchTask>,
) -> std::result::Result<Result<Vec<Record>>, JoinError> {
    match fetch {
        Some(task) => (&mut task.0).await,
        None => std::future::pending().await,
    }
}

/// State owned by the driver task
struct SessionDriver {
    machine: SyncMachine,
    query: Option<Query>,
    events: FilteredEvents,
    loader: SnapshotLoader,
    commands: mpsc::Receiver<SessionCommand>,
    publisher: Arc<Publisher>,
    fetch: Option<FetchTask>,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl SessionDriver {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        self.start_fetch();

        let mut events_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("{} session shutting down", self.machine.record_type());
                    break;
                }

                joined = fetch_outcome(&mut self.fetch) => {
                    self.fetch = None;
                    self.on_fetch_joined(joined);
                }

                event = self.events.next(), if events_open => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        if !self.publisher.is_closed() {
                            warn!("{} event stream ended", self.machine.record_type());
                        }
                        events_open = false;
                    }
                },

                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
            }
        }

        debug!("{} session driver stopped", self.machine.record_type());
    }

    fn start_fetch(&mut self) {
        let loader = self.loader.clone();
        self.fetch = Some(FetchTask(tokio::spawn(async move { loader.load().await })));
    }

    fn on_fetch_joined(&mut self, joined: std::result::Result<Result<Vec<Record>>, JoinError>) {
        let outcome = joined.unwrap_or_else(|e| {
            error!(
                "{} snapshot fetch task failed: {}",
                self.machine.record_type(),
                e
            );
            Err(Error::source_unavailable(format!(
                "snapshot fetch task failed: {}",
                e
            )))
        });
        self.on_snapshot(outcome);
    }

    fn on_snapshot(&mut self, outcome: Result<Vec<Record>>) {
        if self.publisher.is_closed() {
            debug!(
                "Discarding {} snapshot for a closed session",
                self.machine.record_type()
            );
            return;
        }

        match outcome {
            Ok(records) => {
                if let Some(replayed) = self.machine.apply_snapshot(records) {
                    self.publish();
                    info!(
                        "{} ready: {} record(s), {} queued event(s) replayed",
                        self.machine.record_type(),
                        self.machine.collection().len(),
                        replayed
                    );
                }
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                let message = match e {
                    Error::SourceUnavailable(message) => message,
                    other => other.to_string(),
                };
                warn!(
                    "{} snapshot failed, collection stays loading: {}",
                    self.machine.record_type(),
                    message
                );
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Err(Error::source_unavailable(message.clone())));
                }
            }
        }
    }

    fn on_event(&mut self, event: ChangeEvent) {
        if self.publisher.is_closed() {
            return;
        }

        let event = match &self.query {
            Some(query) => match query.scope(event) {
                Some(event) => event,
                None => {
                    debug!(
                        "{} change outside the session query dropped",
                        self.machine.record_type()
                    );
                    return;
                }
            },
            None => event,
        };

        let kind = event.kind();
        let id = event.id().clone();

        match self.machine.apply_event(event) {
            Transition::Applied => {
                debug!("{} {} {} applied", self.machine.record_type(), kind, id);
                self.publish();
            }
            Transition::Queued | Transition::Unchanged | Transition::Ignored => {}
        }
    }

    fn on_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::AwaitReady(reply) => {
                if self.machine.phase() == Phase::Ready {
                    let _ = reply.send(Ok(()));
                    return;
                }

                self.waiters.push(reply);
                if self.fetch.is_none() {
                    debug!("Retrying {} snapshot", self.machine.record_type());
                    self.start_fetch();
                }
            }
        }
    }

    fn publish(&self) {
        self.publisher.publish(self.machine.collection());
    }
}
