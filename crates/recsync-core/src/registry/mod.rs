//! Subscription registry
//!
//! The registry is the consumer-facing entry point. It keeps one
//! [`SyncSession`] per attached record type and hands out reference-counted
//! [`Attachment`] handles; the session is torn down when the last handle for
//! its type goes away.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use recsync_core::registry::SyncRegistry;
//! # use recsync_core::source::MemoryRecordSource;
//! # use recsync_core::views::ViewSpec;
//! # use std::sync::Arc;
//! # async fn demo() -> recsync_core::Result<()> {
//! let registry = SyncRegistry::new(Arc::new(MemoryRecordSource::new()));
//!
//! let connections = registry.attach("connection")?;
//! connections.ready().await?;
//!
//! let collection = registry.get_collection(&"connection".into())?;
//! let completed = registry.select_by(&"connection".into(), &ViewSpec::in_states(["completed"]))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! The registry is cheaply cloneable; clones share the same session table,
//! guarded by an `RwLock`.

use crate::config::{EngineConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::record::{Record, RecordType};
use crate::sync::{SyncCollection, SyncSession};
use crate::traits::RecordSource;
use crate::views::{Selector, ViewSpec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, warn};

type ViewSelector = Selector<ViewSpec, Vec<Record>>;

/// One attached record type
struct Entry {
    session: Arc<SyncSession>,
    query: Option<Query>,
    holders: usize,
    views: Mutex<HashMap<ViewSpec, Arc<ViewSelector>>>,
}

struct RegistryInner {
    source: Arc<dyn RecordSource>,
    engine: EngineConfig,
    sessions: RwLock<HashMap<RecordType, Entry>>,
}

/// Table of active synchronization sessions, keyed by record type
#[derive(Clone)]
pub struct SyncRegistry {
    inner: Arc<RegistryInner>,
}

impl SyncRegistry {
    /// Create a registry with default engine settings
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self::with_engine_config(source, EngineConfig::default())
    }

    /// Create a registry with explicit engine settings
    pub fn with_engine_config(source: Arc<dyn RecordSource>, engine: EngineConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                source,
                engine,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Attach to every record of `record_type`
    ///
    /// Starts a session on first attach, joins the running one otherwise.
    ///
    /// # Returns
    ///
    /// - `Ok(Attachment)`: Handle keeping the session alive
    /// - `Err(Error::Config)`: Called outside a Tokio runtime
    pub fn attach(&self, record_type: impl Into<RecordType>) -> Result<Attachment> {
        self.attach_with_query(record_type, None)
    }

    /// Attach to the records of `record_type` matching `query`
    ///
    /// The query only applies when this call starts the session; joining a
    /// running session keeps the query it was started with.
    pub fn attach_with_query(
        &self,
        record_type: impl Into<RecordType>,
        query: Option<Query>,
    ) -> Result<Attachment> {
        let record_type = record_type.into();
        let mut sessions = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = sessions.get_mut(&record_type) {
            if query.is_some() && entry.query != query {
                warn!(
                    "{} is already attached with another query, keeping the running session",
                    record_type
                );
            }
            entry.holders += 1;
            debug!("{} now has {} holder(s)", record_type, entry.holders);
            return Ok(Attachment::new(self.clone(), Arc::clone(&entry.session)));
        }

        let session = Arc::new(SyncSession::start(
            Arc::clone(&self.inner.source),
            record_type.clone(),
            query.clone(),
            &self.inner.engine,
        )?);

        sessions.insert(
            record_type,
            Entry {
                session: Arc::clone(&session),
                query,
                holders: 1,
                views: Mutex::new(HashMap::new()),
            },
        );

        Ok(Attachment::new(self.clone(), session))
    }

    /// Attach to every enabled record type of a configuration
    pub fn attach_configured(&self, config: &SyncConfig) -> Result<Vec<Attachment>> {
        config.validate()?;

        config
            .record_types
            .iter()
            .filter(|t| {
                if !t.enabled {
                    debug!("Skipping disabled record type {}", t.name);
                }
                t.enabled
            })
            .map(|t| self.attach_with_query(t.name.clone(), t.query.clone()))
            .collect()
    }

    /// Latest collection of an attached type
    ///
    /// # Returns
    ///
    /// - `Ok(SyncCollection)`: Records plus the `loading` flag
    /// - `Err(Error::NotAttached)`: Nothing is attached to `record_type`
    pub fn get_collection(&self, record_type: &RecordType) -> Result<SyncCollection> {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        sessions
            .get(record_type)
            .map(|entry| entry.session.collection())
            .ok_or_else(|| Error::not_attached(record_type.as_str()))
    }

    /// Memoized projection of an attached type
    ///
    /// Repeated calls with the same spec return the same `Arc` until the
    /// collection changes. Views computed from an older collection value are
    /// evicted, so the cache only ever holds views of the current value.
    pub fn select_by(&self, record_type: &RecordType, spec: &ViewSpec) -> Result<Arc<Vec<Record>>> {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let entry = sessions
            .get(record_type)
            .ok_or_else(|| Error::not_attached(record_type.as_str()))?;

        let collection = entry.session.collection();
        let mut views = entry.views.lock().unwrap_or_else(PoisonError::into_inner);

        let selector = Arc::clone(views.entry(spec.clone()).or_insert_with(|| {
            Arc::new(Selector::new(|records: &[Record], spec: &ViewSpec| {
                spec.apply(records)
            }))
        }));
        let value = selector.select(&collection, spec);

        let before = views.len();
        views.retain(|_, selector| selector.is_current(&collection));
        if views.len() < before {
            debug!(
                "Evicted {} stale {} view(s)",
                before - views.len(),
                record_type
            );
        }

        Ok(value)
    }

    /// Number of memoized views held for `record_type`
    pub fn cached_views(&self, record_type: &RecordType) -> usize {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        sessions.get(record_type).map_or(0, |entry| {
            entry
                .views
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        })
    }

    /// Attached record types, sorted
    pub fn attached_types(&self) -> Vec<RecordType> {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut types: Vec<RecordType> = sessions.keys().cloned().collect();
        types.sort();
        types
    }

    /// Whether `record_type` has a running session
    pub fn is_attached(&self, record_type: &RecordType) -> bool {
        self.holders(record_type) > 0
    }

    /// Number of live attachments for `record_type`
    pub fn holders(&self, record_type: &RecordType) -> usize {
        let sessions = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        sessions.get(record_type).map_or(0, |entry| entry.holders)
    }

    fn release(&self, session: &Arc<SyncSession>) {
        let record_type = session.record_type();
        let mut sessions = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(entry) = sessions.get_mut(record_type) else {
            return;
        };
        if !Arc::ptr_eq(&entry.session, session) {
            return;
        }

        entry.holders = entry.holders.saturating_sub(1);
        debug!("{} now has {} holder(s)", record_type, entry.holders);

        if entry.holders == 0
            && let Some(entry) = sessions.remove(record_type)
        {
            entry.session.close();
        }
    }
}

/// Handle on an attached record type
///
/// Dropping the handle (or calling [`Attachment::detach`]) releases it.
pub struct Attachment {
    registry: SyncRegistry,
    session: Arc<SyncSession>,
    state: watch::Receiver<SyncCollection>,
}

impl Attachment {
    fn new(registry: SyncRegistry, session: Arc<SyncSession>) -> Self {
        let state = session.watch();
        Self {
            registry,
            session,
            state,
        }
    }

    /// The attached record type
    pub fn record_type(&self) -> &RecordType {
        self.session.record_type()
    }

    /// Wait for the snapshot
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The collection is live
    /// - `Err(Error::SourceUnavailable)`: The fetch failed; the collection
    ///   stays `loading` and calling again retries
    /// - `Err(Error::NotAttached)`: The session was torn down
    pub async fn ready(&self) -> Result<()> {
        self.session.ready().await
    }

    /// Latest collection value
    pub fn collection(&self) -> SyncCollection {
        self.session.collection()
    }

    /// Receiver notified on every new collection value
    pub fn watch(&self) -> watch::Receiver<SyncCollection> {
        self.session.watch()
    }

    /// Wait for the next collection value
    pub async fn changed(&mut self) -> Result<SyncCollection> {
        self.state
            .changed()
            .await
            .map_err(|_| Error::not_attached(self.session.record_type().as_str()))?;
        Ok(self.state.borrow_and_update().clone())
    }

    /// Memoized projection of this type
    pub fn select(&self, spec: &ViewSpec) -> Result<Arc<Vec<Record>>> {
        self.registry.select_by(self.record_type(), spec)
    }

    /// Release this handle
    pub fn detach(self) {}
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.registry.release(&self.session);
    }
}
