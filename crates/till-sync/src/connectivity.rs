//! # Connectivity Monitor
//!
//! Tracks whether the device can reach the remote store and fans
//! transitions out to listeners.
//!
//! ## State Machine
//! ```text
//!            signal(Offline)
//!   ┌────────┐ ──────────────► ┌─────────┐
//!   │ ONLINE │                 │ OFFLINE │
//!   └────────┘ ◄────────────── └─────────┘
//!            signal(Online)
//!
//!   Same-state signals are coalesced: listeners only see edges.
//! ```
//!
//! Listeners run synchronously on the signalling thread, in registration
//! order. A listener must not call [`ConnectivityMonitor::signal`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "ONLINE"),
            ConnectivityState::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Returned by [`ConnectivityMonitor::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(ConnectivityState) + Send + Sync>;

struct Inner {
    state: ConnectivityState,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

/// Edge-triggered ONLINE/OFFLINE tracker.
pub struct ConnectivityMonitor {
    inner: Mutex<Inner>,
    /// Serializes `signal` so listeners observe transitions in order.
    delivery: Mutex<()>,
    state_tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (state_tx, _) = watch::channel(initial);
        ConnectivityMonitor {
            inner: Mutex::new(Inner {
                state: initial,
                listeners: Vec::new(),
                next_listener: 1,
            }),
            delivery: Mutex::new(()),
            state_tx,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    pub fn state(&self) -> ConnectivityState {
        self.inner.lock().state
    }

    /// Registers a listener called on every transition.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = ListenerId(inner.next_listener);
        inner.next_listener += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the listener was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        inner.listeners.len() != before
    }

    /// Applies a platform signal. Returns true if it was a transition.
    pub fn signal(&self, state: ConnectivityState) -> bool {
        let _delivery = self.delivery.lock();

        let listeners: Vec<Listener> = {
            let mut inner = self.inner.lock();
            if inner.state == state {
                debug!(%state, "Duplicate connectivity signal ignored");
                return false;
            }
            inner.state = state;
            inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        info!(%state, listeners = listeners.len(), "Connectivity changed");
        self.state_tx.send_replace(state);
        for listener in listeners {
            listener(state);
        }
        true
    }

    /// Receiver that always holds the current state.
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    /// Feeds platform events from `events` into [`signal`](Self::signal)
    /// until the sender side closes.
    pub fn drive(self: Arc<Self>, mut events: mpsc::Receiver<ConnectivityState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(state) = events.recv().await {
                self.signal(state);
            }
            debug!("Connectivity event source closed");
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        ConnectivityMonitor::new(ConnectivityState::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn recorder(
        monitor: &ConnectivityMonitor,
        tag: &'static str,
        log: &Arc<StdMutex<Vec<String>>>,
    ) -> ListenerId {
        let log = log.clone();
        monitor.add_listener(move |state| {
            log.lock().unwrap().push(format!("{}:{}", tag, state));
        })
    }

    #[test]
    fn test_transitions_notify_in_registration_order() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
        let log = Arc::new(StdMutex::new(Vec::new()));
        recorder(&monitor, "a", &log);
        recorder(&monitor, "b", &log);

        assert!(monitor.signal(ConnectivityState::Offline));
        assert!(!monitor.is_online());
        assert!(monitor.signal(ConnectivityState::Online));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:OFFLINE", "b:OFFLINE", "a:ONLINE", "b:ONLINE"]
        );
    }

    #[test]
    fn test_duplicate_signals_are_coalesced() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
        let log = Arc::new(StdMutex::new(Vec::new()));
        recorder(&monitor, "a", &log);

        assert!(!monitor.signal(ConnectivityState::Online));
        assert!(monitor.signal(ConnectivityState::Offline));
        assert!(!monitor.signal(ConnectivityState::Offline));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let monitor = ConnectivityMonitor::default();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let a = recorder(&monitor, "a", &log);
        recorder(&monitor, "b", &log);

        assert!(monitor.remove_listener(a));
        assert!(!monitor.remove_listener(a));
        monitor.signal(ConnectivityState::Offline);
        assert_eq!(*log.lock().unwrap(), vec!["b:OFFLINE"]);
    }

    #[tokio::test]
    async fn test_watch_follows_state() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        let mut rx = monitor.watch();
        assert_eq!(*rx.borrow(), ConnectivityState::Offline);

        monitor.signal(ConnectivityState::Online);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectivityState::Online);
    }

    #[tokio::test]
    async fn test_drive_consumes_platform_events() {
        let monitor = Arc::new(ConnectivityMonitor::new(ConnectivityState::Online));
        let (tx, rx) = mpsc::channel(8);
        let task = monitor.clone().drive(rx);

        tx.send(ConnectivityState::Offline).await.unwrap();
        tx.send(ConnectivityState::Offline).await.unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(monitor.state(), ConnectivityState::Offline);
    }
}
