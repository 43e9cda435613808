//! # In-Memory Remote Source
//!
//! A process-local [`RemoteSource`] that keeps collections in memory and
//! pushes a full snapshot to every matching subscription after each write.
//! Used by the test suites and the `price_check` binary.
//!
//! ## Fault Injection
//! ```text
//! deny(collection)          subscribe() → Err(permission-denied)
//! fail(collection, err)     pushes Err(err) on every live subscription
//! drop_streams(collection)  ends every live stream (lost connection)
//! ```

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{RemoteError, RemoteErrorKind};
use crate::query::{Direction, Query};
use crate::remote::{
    Document, FullSnapshot, RemoteSource, RemoteSubscription, RemoteSubscriptionId,
    SnapshotResult, WriteAck, WriteOp, WriteRequest,
};

struct LiveSubscription {
    query: Query,
    tx: mpsc::UnboundedSender<SnapshotResult>,
}

#[derive(Default)]
struct Inner {
    /// Documents per collection, in insertion order.
    collections: HashMap<String, Vec<Document>>,
    subscriptions: HashMap<RemoteSubscriptionId, LiveSubscription>,
    denied: HashSet<String>,
    next_subscription: u64,
    subscribe_calls: u64,
    persistence_clears: u64,
}

/// In-memory remote document store.
#[derive(Default)]
pub struct InMemoryRemote {
    inner: Mutex<Inner>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a document directly, bypassing the `Result` of [`RemoteSource::write`].
    pub fn put(&self, collection: &str, doc_id: &str, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut inner = self.inner.lock();
        upsert(&mut inner, collection, doc_id, fields, false);
        broadcast(&mut inner, collection);
    }

    /// Makes future subscriptions to `collection` fail with permission-denied.
    pub fn deny(&self, collection: &str) {
        self.inner.lock().denied.insert(collection.to_string());
    }

    pub fn allow(&self, collection: &str) {
        self.inner.lock().denied.remove(collection);
    }

    /// Pushes `error` on every live subscription of `collection`.
    pub fn fail(&self, collection: &str, error: RemoteError) {
        let inner = self.inner.lock();
        for sub in inner
            .subscriptions
            .values()
            .filter(|s| s.query.collection_name() == collection)
        {
            let _ = sub.tx.send(Err(error.clone()));
        }
    }

    /// Ends every live stream on `collection` without closing it cleanly.
    pub fn drop_streams(&self, collection: &str) {
        let mut inner = self.inner.lock();
        inner
            .subscriptions
            .retain(|_, sub| sub.query.collection_name() != collection);
    }

    /// Number of subscriptions currently open.
    pub fn live_subscriptions(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Number of open subscriptions for one query.
    pub fn live_subscriptions_for(&self, query: &Query) -> usize {
        self.inner
            .lock()
            .subscriptions
            .values()
            .filter(|s| &s.query == query)
            .count()
    }

    /// Number of successful `subscribe` calls since creation.
    pub fn subscribe_calls(&self) -> u64 {
        self.inner.lock().subscribe_calls
    }

    pub fn persistence_clears(&self) -> u64 {
        self.inner.lock().persistence_clears
    }

    /// Current contents of `collection`, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.inner
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl RemoteSource for InMemoryRemote {
    fn subscribe(&self, query: &Query) -> Result<RemoteSubscription, RemoteError> {
        let mut inner = self.inner.lock();
        if inner.denied.contains(query.collection_name()) {
            return Err(RemoteError::permission_denied(format!(
                "read access to '{}' denied",
                query.collection_name()
            )));
        }

        inner.next_subscription += 1;
        inner.subscribe_calls += 1;
        let id = RemoteSubscriptionId(inner.next_subscription);
        let (tx, rx) = mpsc::unbounded_channel();

        // Like a real listener, the current result set is pushed right away.
        let _ = tx.send(Ok(snapshot_for(&inner, query)));
        inner.subscriptions.insert(
            id,
            LiveSubscription {
                query: query.clone(),
                tx,
            },
        );
        debug!(%id, %query, "In-memory subscription opened");

        Ok(RemoteSubscription { id, snapshots: rx })
    }

    fn close(&self, subscription: RemoteSubscriptionId) {
        if self.inner.lock().subscriptions.remove(&subscription).is_some() {
            debug!(id = %subscription, "In-memory subscription closed");
        }
    }

    fn write(&self, request: WriteRequest) -> Result<WriteAck, RemoteError> {
        let mut inner = self.inner.lock();
        if inner.denied.contains(&request.collection) {
            return Err(RemoteError::permission_denied(format!(
                "write access to '{}' denied",
                request.collection
            )));
        }

        let doc_id = request
            .doc_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match request.op {
            WriteOp::Set(fields) => upsert(&mut inner, &request.collection, &doc_id, fields, false),
            WriteOp::Merge(fields) => {
                upsert(&mut inner, &request.collection, &doc_id, fields, true)
            }
            WriteOp::Delete => {
                let docs = inner.collections.entry(request.collection.clone()).or_default();
                let before = docs.len();
                docs.retain(|d| d.id != doc_id);
                if docs.len() == before {
                    return Err(RemoteError::new(
                        RemoteErrorKind::NotFound,
                        format!("{}/{} does not exist", request.collection, doc_id),
                    ));
                }
            }
        }

        broadcast(&mut inner, &request.collection);
        Ok(WriteAck {
            doc_id,
            committed_at: Utc::now(),
        })
    }

    fn clear_local_persistence(&self) -> Result<(), RemoteError> {
        self.inner.lock().persistence_clears += 1;
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn upsert(
    inner: &mut Inner,
    collection: &str,
    doc_id: &str,
    fields: Map<String, Value>,
    merge: bool,
) {
    let docs = inner.collections.entry(collection.to_string()).or_default();
    match docs.iter_mut().find(|d| d.id == doc_id) {
        Some(existing) => match (&mut existing.fields, merge) {
            (Value::Object(current), true) => current.extend(fields),
            (slot, _) => *slot = Value::Object(fields),
        },
        None => docs.push(Document::new(doc_id, Value::Object(fields))),
    }
}

/// Pushes a fresh snapshot to every subscription on `collection`, dropping
/// subscriptions whose receiver is gone.
fn broadcast(inner: &mut Inner, collection: &str) {
    let targets: Vec<(RemoteSubscriptionId, Query)> = inner
        .subscriptions
        .iter()
        .filter(|(_, s)| s.query.collection_name() == collection)
        .map(|(id, s)| (*id, s.query.clone()))
        .collect();

    for (id, query) in targets {
        let snapshot = snapshot_for(inner, &query);
        let delivered = inner
            .subscriptions
            .get(&id)
            .map(|s| s.tx.send(Ok(snapshot)).is_ok())
            .unwrap_or(false);
        if !delivered {
            trace!(%id, "Receiver gone, dropping subscription");
            inner.subscriptions.remove(&id);
        }
    }
}

fn snapshot_for(inner: &Inner, query: &Query) -> FullSnapshot {
    let mut documents: Vec<Document> = inner
        .collections
        .get(query.collection_name())
        .map(|docs| docs.iter().filter(|d| matches_filters(d, query)).cloned().collect())
        .unwrap_or_default();

    if let Some(order) = query.ordering() {
        documents.sort_by(|a, b| {
            let ord = compare_fields(a.fields.get(&order.field), b.fields.get(&order.field));
            match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });
    }

    FullSnapshot {
        documents,
        read_at: Utc::now(),
    }
}

fn matches_filters(doc: &Document, query: &Query) -> bool {
    query.filters().iter().all(|flt| {
        let value = if flt.field == "id" {
            Some(Value::String(doc.id.clone()))
        } else {
            doc.fields.get(&flt.field).cloned()
        };
        match value {
            Some(Value::String(s)) => s == flt.value,
            Some(other) => other.to_string() == flt.value,
            None => false,
        }
    })
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn next(sub: &mut RemoteSubscription) -> FullSnapshot {
        sub.snapshots.try_recv().unwrap().unwrap()
    }

    #[test]
    fn test_subscribe_pushes_current_state() {
        let remote = InMemoryRemote::new();
        remote.put("products", "p1", json!({"brand": "Acme"}));

        let mut sub = remote.subscribe(&Query::collection("products")).unwrap();
        let snap = next(&mut sub);
        assert_eq!(snap.documents.len(), 1);
        assert_eq!(snap.documents[0].id, "p1");
    }

    #[test]
    fn test_writes_push_full_snapshots_in_order() {
        let remote = InMemoryRemote::new();
        let query = Query::collection("rules").order_by("createdAt", Direction::Descending);
        let mut sub = remote.subscribe(&query).unwrap();
        assert!(next(&mut sub).documents.is_empty());

        remote.put("rules", "old", json!({"createdAt": "2025-01-01T00:00:00Z"}));
        remote.put("rules", "new", json!({"createdAt": "2025-02-01T00:00:00Z"}));

        assert_eq!(next(&mut sub).documents.len(), 1);
        let ids: Vec<_> = next(&mut sub).documents.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_filters_select_documents() {
        let remote = InMemoryRemote::new();
        remote.put("products", "p1", json!({"brand": "Acme", "active": true}));
        remote.put("products", "p2", json!({"brand": "Other", "active": true}));

        let query = Query::collection("products").filter("brand", "Acme").filter("active", "true");
        let mut sub = remote.subscribe(&query).unwrap();
        let ids: Vec<_> = next(&mut sub).documents.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["p1"]);
    }

    #[test]
    fn test_merge_and_delete() {
        let remote = InMemoryRemote::new();
        remote.put("settings", "store", json!({"storeName": "A", "phone": "1"}));
        remote
            .write(WriteRequest {
                collection: "settings".into(),
                doc_id: Some("store".into()),
                op: WriteOp::Merge(json!({"storeName": "B"}).as_object().cloned().unwrap()),
            })
            .unwrap();
        let docs = remote.documents("settings");
        assert_eq!(docs[0].fields, json!({"storeName": "B", "phone": "1"}));

        remote.write(WriteRequest::delete("settings", "store")).unwrap();
        assert!(remote.documents("settings").is_empty());

        let err = remote.write(WriteRequest::delete("settings", "store")).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    }

    #[test]
    fn test_new_document_gets_generated_id() {
        let remote = InMemoryRemote::new();
        let ack = remote
            .write(WriteRequest {
                collection: "rules".into(),
                doc_id: None,
                op: WriteOp::Set(Map::new()),
            })
            .unwrap();
        assert!(!ack.doc_id.is_empty());
        assert_eq!(remote.documents("rules")[0].id, ack.doc_id);
    }

    #[test]
    fn test_denied_collection() {
        let remote = InMemoryRemote::new();
        remote.deny("rules");
        let err = remote.subscribe(&Query::collection("rules")).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::PermissionDenied);
        assert_eq!(remote.subscribe_calls(), 0);

        remote.allow("rules");
        assert!(remote.subscribe(&Query::collection("rules")).is_ok());
    }

    #[test]
    fn test_close_and_drop_streams() {
        let remote = InMemoryRemote::new();
        let a = remote.subscribe(&Query::collection("rules")).unwrap();
        let mut b = remote.subscribe(&Query::collection("products")).unwrap();
        assert_eq!(remote.live_subscriptions(), 2);

        remote.close(a.id);
        remote.close(a.id);
        assert_eq!(remote.live_subscriptions(), 1);

        remote.drop_streams("products");
        assert_eq!(remote.live_subscriptions(), 0);
        let _ = next(&mut b);
        assert!(matches!(
            b.snapshots.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
