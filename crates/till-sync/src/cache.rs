//! # Synchronized Cache
//!
//! In-memory mirror of remote collections, driven by push subscriptions.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncCache<T>                                   │
//! │                                                                         │
//! │  registry: Query ──► QueryState                                         │
//! │                        ├── observers   (handle id → optional callback)  │
//! │                        ├── snapshot    Arc<CacheEntry<T>>  ◄── swapped, │
//! │                        │                                   never edited │
//! │                        ├── link        live remote subscription + task  │
//! │                        └── status      Pending | Live | Degraded        │
//! │                                                                         │
//! │  RemoteSource ──snapshots──► pump task (one per live subscription)     │
//! │                                  │ decode → swap snapshot → callbacks  │
//! │                                  ▼                                      │
//! │  current_snapshot(query) ◄── readers clone the Arc, never block on I/O │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Multiplexing
//! The first observer of a query opens the remote subscription; later
//! observers of an equal query attach to it. When the last observer
//! detaches, the remote subscription is closed and the entry torn down.
//!
//! ## Degraded Mode
//! ```text
//!   push error        → keep snapshot, is_stale = true, report on errors()
//!   subscribe refused → status Degraded, report on errors()
//!   stream ended      → status Degraded, is_stale = true, report on errors()
//!   ONLINE transition → re-subscribe every Degraded query without a stream
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState, ListenerId};
use crate::error::{RemoteError, SyncError, SyncResult};
use crate::query::Query;
use crate::remote::{
    Document, FullSnapshot, RemoteSource, RemoteSubscription, RemoteSubscriptionId,
};

// =============================================================================
// Cache Entry
// =============================================================================

/// One mirrored document.
#[derive(Debug, Clone, PartialEq)]
pub struct MirroredDoc<T> {
    pub id: String,
    pub data: T,
}

/// Immutable point-in-time view of one query's results.
///
/// Cloning is cheap: the item list is shared.
#[derive(Debug)]
pub struct CacheEntry<T> {
    items: Arc<Vec<MirroredDoc<T>>>,
    index: Arc<HashMap<String, usize>>,
    last_synced_at: Option<DateTime<Utc>>,
    is_stale: bool,
    version: u64,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        CacheEntry {
            items: Arc::clone(&self.items),
            index: Arc::clone(&self.index),
            last_synced_at: self.last_synced_at,
            is_stale: self.is_stale,
            version: self.version,
        }
    }
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        CacheEntry::empty()
    }
}

impl<T> CacheEntry<T> {
    /// Empty, stale entry served before the first sync.
    pub fn empty() -> Self {
        CacheEntry {
            items: Arc::new(Vec::new()),
            index: Arc::new(HashMap::new()),
            last_synced_at: None,
            is_stale: true,
            version: 0,
        }
    }

    fn synced(items: Vec<MirroredDoc<T>>, synced_at: DateTime<Utc>, version: u64) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(pos, doc)| (doc.id.clone(), pos))
            .collect();
        CacheEntry {
            items: Arc::new(items),
            index: Arc::new(index),
            last_synced_at: Some(synced_at),
            is_stale: false,
            version,
        }
    }

    fn marked_stale(&self, version: u64) -> Self {
        CacheEntry {
            is_stale: true,
            version,
            ..self.clone()
        }
    }

    /// Documents in remote snapshot order.
    pub fn items(&self) -> &[MirroredDoc<T>] {
        &self.items
    }

    /// Document payloads in remote snapshot order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|doc| &doc.data)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&pos| &self.items[pos].data)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    /// Strictly increases every time the entry for a query is replaced.
    pub fn version(&self) -> u64 {
        self.version
    }
}

// =============================================================================
// Handles, Status, Failures
// =============================================================================

/// Observer registration returned by [`SyncCache::subscribe`] and
/// [`SyncCache::on_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    query: Query,
}

impl SubscriptionHandle {
    pub fn query(&self) -> &Query {
        &self.query
    }
}

/// Health of one mirrored query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Subscribed, no snapshot applied yet.
    Pending,
    /// Receiving snapshots.
    Live,
    /// Serving last-known data after a remote failure.
    Degraded,
}

/// A subscription failure reported on [`SyncCache::errors`].
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub query: Query,
    pub error: RemoteError,
    pub at: DateTime<Utc>,
}

type UpdateCallback<T> = Box<dyn Fn(&CacheEntry<T>) + Send + Sync>;

struct Observer<T> {
    callback: Option<UpdateCallback<T>>,
    active: AtomicBool,
    last_seen: AtomicU64,
}

struct Link {
    remote_id: RemoteSubscriptionId,
    task: JoinHandle<()>,
}

struct QueryState<T> {
    observers: BTreeMap<u64, Arc<Observer<T>>>,
    snapshot: Arc<CacheEntry<T>>,
    link: Option<Link>,
    status: QueryStatus,
    /// Token of the one open attempt allowed to install a link. An attempt
    /// whose token no longer matches closes what it opened.
    opening: Option<u64>,
}

impl<T> QueryState<T> {
    fn new() -> Self {
        QueryState {
            observers: BTreeMap::new(),
            snapshot: Arc::new(CacheEntry::empty()),
            link: None,
            status: QueryStatus::Pending,
            opening: None,
        }
    }

    fn next_version(&self) -> u64 {
        self.snapshot.version + 1
    }
}

struct Shared<T> {
    remote: Arc<dyn RemoteSource>,
    runtime: Handle,
    registry: RwLock<HashMap<Query, QueryState<T>>>,
    next_observer: AtomicU64,
    next_attempt: AtomicU64,
    failures: broadcast::Sender<SyncFailure>,
}

// =============================================================================
// SyncCache
// =============================================================================

/// Push-driven mirror of remote collections of `T`.
///
/// Share one instance per document type across the process by wrapping it in
/// an `Arc`.
pub struct SyncCache<T> {
    shared: Arc<Shared<T>>,
}

impl<T> SyncCache<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a cache on the current tokio runtime with default settings.
    pub fn new(remote: Arc<dyn RemoteSource>) -> SyncResult<Self> {
        Self::with_config(remote, &CacheConfig::default())
    }

    /// Creates a cache on the current tokio runtime.
    pub fn with_config(remote: Arc<dyn RemoteSource>, config: &CacheConfig) -> SyncResult<Self> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        Ok(Self::with_runtime(remote, config, runtime))
    }

    /// Creates a cache whose pump tasks run on `runtime`.
    pub fn with_runtime(
        remote: Arc<dyn RemoteSource>,
        config: &CacheConfig,
        runtime: Handle,
    ) -> Self {
        let (failures, _) = broadcast::channel(config.channels.error_capacity.max(1));
        SyncCache {
            shared: Arc::new(Shared {
                remote,
                runtime,
                registry: RwLock::new(HashMap::new()),
                next_observer: AtomicU64::new(1),
                next_attempt: AtomicU64::new(1),
                failures,
            }),
        }
    }

    /// Registers interest in `query`, opening a remote subscription only if
    /// no equal query is already live.
    pub fn subscribe(&self, query: Query) -> SubscriptionHandle {
        self.shared.register(query, None)
    }

    /// Registers an observer that receives every new entry for `query`.
    ///
    /// Each observer sees strictly increasing [`CacheEntry::version`]s.
    pub fn on_update<F>(&self, query: Query, callback: F) -> SubscriptionHandle
    where
        F: Fn(&CacheEntry<T>) + Send + Sync + 'static,
    {
        self.shared.register(query, Some(Box::new(callback)))
    }

    /// Detaches an observer. Returns false if it was already detached.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.shared.unregister(handle)
    }

    /// Latest mirrored entry for `query`; empty and stale if nothing has been
    /// mirrored yet.
    pub fn current_snapshot(&self, query: &Query) -> CacheEntry<T> {
        self.shared
            .registry
            .read()
            .get(query)
            .map(|state| (*state.snapshot).clone())
            .unwrap_or_default()
    }

    /// Discards every mirrored entry and the remote client's local copies.
    ///
    /// Observers stay attached. Live subscriptions are closed and reopened
    /// so the remote source pushes a fresh full snapshot.
    pub fn clear_cache(&self) -> SyncResult<()> {
        let mut closed = Vec::new();
        let mut reopen = Vec::new();
        {
            let mut registry = self.shared.registry.write();
            for (query, state) in registry.iter_mut() {
                let version = state.next_version();
                state.snapshot = Arc::new(CacheEntry {
                    version,
                    ..CacheEntry::empty()
                });
                if let Some(link) = state.link.take() {
                    link.task.abort();
                    closed.push(link.remote_id);
                    let attempt = self.shared.next_attempt.fetch_add(1, Ordering::Relaxed);
                    state.opening = Some(attempt);
                    state.status = QueryStatus::Pending;
                    reopen.push((query.clone(), attempt));
                }
            }
        }

        for remote_id in closed {
            self.shared.remote.close(remote_id);
        }
        let cleared = self.shared.remote.clear_local_persistence();
        info!(resubscribed = reopen.len(), "Sync cache cleared");

        for (query, attempt) in reopen {
            Shared::open(&self.shared, &query, attempt);
        }
        cleared?;
        Ok(())
    }

    /// Marks every entry stale without touching its data.
    pub fn mark_all_stale(&self) {
        self.shared.mark_all_stale();
    }

    /// Re-subscribes every Degraded query that has no live stream.
    pub fn retry_degraded(&self) {
        Shared::retry_degraded(&self.shared);
    }

    /// Wires the cache to connectivity transitions: OFFLINE marks entries
    /// stale, ONLINE retries degraded subscriptions.
    pub fn attach(&self, monitor: &ConnectivityMonitor) -> ListenerId {
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        monitor.add_listener(move |state| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match state {
                ConnectivityState::Offline => shared.mark_all_stale(),
                ConnectivityState::Online => Shared::retry_degraded(&shared),
            }
        })
    }

    /// Receiver for subscription failures.
    pub fn errors(&self) -> broadcast::Receiver<SyncFailure> {
        self.shared.failures.subscribe()
    }

    pub fn status(&self, query: &Query) -> Option<QueryStatus> {
        self.shared.registry.read().get(query).map(|state| state.status)
    }

    pub fn observer_count(&self, query: &Query) -> usize {
        self.shared
            .registry
            .read()
            .get(query)
            .map_or(0, |state| state.observers.len())
    }

    /// Queries that currently hold a remote subscription.
    pub fn live_queries(&self) -> Vec<Query> {
        self.shared
            .registry
            .read()
            .iter()
            .filter(|(_, state)| state.link.is_some())
            .map(|(query, _)| query.clone())
            .collect()
    }
}

impl<T> Drop for SyncCache<T> {
    fn drop(&mut self) {
        let links: Vec<Link> = self
            .shared
            .registry
            .write()
            .drain()
            .filter_map(|(_, state)| state.link)
            .collect();
        for link in links {
            link.task.abort();
            self.shared.remote.close(link.remote_id);
        }
    }
}

// =============================================================================
// Shared internals
// =============================================================================

impl<T> Shared<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn register(
        self: &Arc<Self>,
        query: Query,
        callback: Option<UpdateCallback<T>>,
    ) -> SubscriptionHandle {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        let observer = Arc::new(Observer {
            callback,
            active: AtomicBool::new(true),
            last_seen: AtomicU64::new(0),
        });

        let attempt = {
            let mut registry = self.registry.write();
            let state = registry.entry(query.clone()).or_insert_with(QueryState::new);
            state.observers.insert(id, observer);
            let idle = state.link.is_none() && state.opening.is_none();
            if idle && state.status != QueryStatus::Degraded {
                let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                state.opening = Some(attempt);
                Some(attempt)
            } else {
                None
            }
        };

        if let Some(attempt) = attempt {
            Self::open(self, &query, attempt);
        } else {
            debug!(%query, observer = id, "Attached to existing subscription");
        }

        SubscriptionHandle { id, query }
    }

    fn unregister(&self, handle: &SubscriptionHandle) -> bool {
        let link = {
            let mut registry = self.registry.write();
            let Some(state) = registry.get_mut(&handle.query) else {
                return false;
            };
            let Some(observer) = state.observers.remove(&handle.id) else {
                return false;
            };
            observer.active.store(false, Ordering::Release);

            if !state.observers.is_empty() {
                return true;
            }
            registry.remove(&handle.query).and_then(|state| state.link)
        };

        match link {
            Some(link) => {
                link.task.abort();
                self.remote.close(link.remote_id);
                info!(
                    query = %handle.query,
                    remote = %link.remote_id,
                    "Last observer left, subscription closed"
                );
            }
            None => debug!(query = %handle.query, "Last observer left"),
        }
        true
    }

    /// Opens the remote subscription for `query` and spawns its pump task.
    ///
    /// The registry lock is not held across `subscribe`, so by the time it
    /// returns the entry may be gone, recreated, or owned by a newer
    /// attempt. Only the attempt recorded in `opening` installs its link.
    fn open(self: &Arc<Self>, query: &Query, attempt: u64) {
        let result = self.remote.subscribe(query);

        let mut registry = self.registry.write();
        let owned = registry
            .get(query)
            .map_or(false, |state| state.opening == Some(attempt) && state.link.is_none());
        if !owned {
            drop(registry);
            if let Ok(sub) = result {
                debug!(%query, remote = %sub.id, "Open attempt superseded, closing");
                self.remote.close(sub.id);
            }
            return;
        }
        let Some(state) = registry.get_mut(query) else {
            return;
        };
        state.opening = None;

        match result {
            Ok(RemoteSubscription { id, snapshots }) => {
                let shared = Arc::clone(self);
                let pump_query = query.clone();
                let task = self.runtime.spawn(async move {
                    let mut snapshots = snapshots;
                    while let Some(message) = snapshots.recv().await {
                        match message {
                            Ok(snapshot) => shared.apply(&pump_query, id, snapshot),
                            Err(error) => shared.push_failed(&pump_query, id, error),
                        }
                    }
                    shared.stream_ended(&pump_query, id);
                });
                state.link = Some(Link { remote_id: id, task });
                if state.status == QueryStatus::Degraded {
                    state.status = QueryStatus::Pending;
                }
                info!(%query, remote = %id, "Remote subscription opened");
            }
            Err(error) => {
                state.status = QueryStatus::Degraded;
                drop(registry);
                warn!(%query, %error, "Subscription failed, serving last-known data");
                self.report(query, error);
            }
        }
    }

    fn apply(&self, query: &Query, remote_id: RemoteSubscriptionId, snapshot: FullSnapshot) {
        let count = snapshot.documents.len();
        let items: Vec<MirroredDoc<T>> = snapshot
            .documents
            .into_iter()
            .filter_map(|doc| match decode::<T>(doc) {
                Ok(item) => Some(item),
                Err((id, error)) => {
                    warn!(%query, doc_id = %id, %error, "Skipping undecodable document");
                    None
                }
            })
            .collect();

        let (entry, observers) = {
            let mut registry = self.registry.write();
            let Some(state) = registry.get_mut(query) else {
                return;
            };
            if !is_current(state, remote_id) {
                return;
            }
            let version = state.next_version();
            let entry = Arc::new(CacheEntry::synced(items, snapshot.read_at, version));
            state.snapshot = Arc::clone(&entry);
            state.status = QueryStatus::Live;
            (entry, collect_observers(state))
        };

        debug!(%query, version = entry.version, documents = count, "Snapshot applied");
        notify(&entry, &observers);
    }

    fn push_failed(&self, query: &Query, remote_id: RemoteSubscriptionId, error: RemoteError) {
        let (entry, observers) = {
            let mut registry = self.registry.write();
            let Some(state) = registry.get_mut(query) else {
                return;
            };
            if !is_current(state, remote_id) {
                return;
            }
            let entry = Arc::new(state.snapshot.marked_stale(state.next_version()));
            state.snapshot = Arc::clone(&entry);
            state.status = QueryStatus::Degraded;
            (entry, collect_observers(state))
        };

        warn!(%query, %error, "Push error, keeping previous snapshot");
        self.report(query, error);
        notify(&entry, &observers);
    }

    fn stream_ended(&self, query: &Query, remote_id: RemoteSubscriptionId) {
        {
            let mut registry = self.registry.write();
            let Some(state) = registry.get_mut(query) else {
                return;
            };
            if !is_current(state, remote_id) {
                return;
            }
            state.link = None;
            state.status = QueryStatus::Degraded;
            if !state.snapshot.is_stale {
                let version = state.next_version();
                state.snapshot = Arc::new(state.snapshot.marked_stale(version));
            }
        }

        warn!(%query, remote = %remote_id, "Remote stream ended");
        self.report(query, RemoteError::unavailable("subscription stream ended"));
    }

    fn mark_all_stale(&self) {
        let mut registry = self.registry.write();
        let mut marked = 0usize;
        for state in registry.values_mut() {
            if !state.snapshot.is_stale {
                let version = state.next_version();
                state.snapshot = Arc::new(state.snapshot.marked_stale(version));
                marked += 1;
            }
        }
        debug!(entries = marked, "Entries marked stale");
    }

    fn retry_degraded(self: &Arc<Self>) {
        let queries: Vec<(Query, u64)> = {
            let mut registry = self.registry.write();
            registry
                .iter_mut()
                .filter(|(_, state)| {
                    state.status == QueryStatus::Degraded
                        && state.link.is_none()
                        && state.opening.is_none()
                })
                .map(|(query, state)| {
                    let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                    state.opening = Some(attempt);
                    (query.clone(), attempt)
                })
                .collect()
        };

        for (query, attempt) in queries {
            info!(%query, "Retrying degraded subscription");
            Self::open(self, &query, attempt);
        }
    }

    fn report(&self, query: &Query, error: RemoteError) {
        // No receivers is fine: nobody is watching the error channel.
        let _ = self.failures.send(SyncFailure {
            query: query.clone(),
            error,
            at: Utc::now(),
        });
    }
}

fn is_current<T>(state: &QueryState<T>, remote_id: RemoteSubscriptionId) -> bool {
    state.link.as_ref().map(|link| link.remote_id) == Some(remote_id)
}

fn collect_observers<T>(state: &QueryState<T>) -> Vec<Arc<Observer<T>>> {
    state
        .observers
        .values()
        .filter(|observer| observer.callback.is_some())
        .cloned()
        .collect()
}

/// Runs callbacks outside the registry lock. Observers detached since
/// collection, or that already saw a newer version, are skipped.
fn notify<T>(entry: &CacheEntry<T>, observers: &[Arc<Observer<T>>]) {
    for observer in observers {
        if !observer.active.load(Ordering::Acquire) {
            continue;
        }
        if observer.last_seen.fetch_max(entry.version, Ordering::AcqRel) >= entry.version {
            continue;
        }
        if let Some(callback) = &observer.callback {
            callback(entry);
        }
    }
}

type DecodeResult<T> = Result<MirroredDoc<T>, (String, serde_json::Error)>;

fn decode<T: DeserializeOwned>(doc: Document) -> DecodeResult<T> {
    let Document { id, mut fields } = doc;
    if let Value::Object(map) = &mut fields {
        map.entry("id").or_insert_with(|| Value::String(id.clone()));
    }
    match serde_json::from_value(fields) {
        Ok(data) => Ok(MirroredDoc { id, data }),
        Err(err) => Err((id, err)),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
