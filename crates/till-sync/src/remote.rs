//! # Remote Source Contract
//!
//! The document store client is an external collaborator. This module
//! defines the narrow surface the cache consumes from it.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        RemoteSource                                     │
//! │                                                                         │
//! │  subscribe(query) ──► RemoteSubscription                                │
//! │                         id ........ passed back to close()              │
//! │                         snapshots . ordered stream of                   │
//! │                                     Ok(FullSnapshot) | Err(RemoteError) │
//! │                                                                         │
//! │  FullSnapshot = complete, ordered set of matching documents (not diff) │
//! │                                                                         │
//! │  close(id)               stop pushing for that subscription             │
//! │  write(WriteRequest)     point write; the result shows up later as a   │
//! │                          snapshot on every matching subscription       │
//! │  clear_local_persistence drop any on-device copy the client keeps      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reconnection and backoff are the remote source's own business; a stream
//! that ends is treated by the cache as a lost subscription.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{RemoteError, SyncError, SyncResult};
use crate::query::Query;

/// Identifier of one live remote subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteSubscriptionId(pub u64);

impl std::fmt::Display for RemoteSubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A document as delivered by the remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        Document {
            id: id.into(),
            fields,
        }
    }
}

/// The complete, ordered result set of a query at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct FullSnapshot {
    pub documents: Vec<Document>,
    pub read_at: DateTime<Utc>,
}

/// One item of a subscription stream.
pub type SnapshotResult = Result<FullSnapshot, RemoteError>;

/// A live subscription handed out by [`RemoteSource::subscribe`].
#[derive(Debug)]
pub struct RemoteSubscription {
    pub id: RemoteSubscriptionId,
    pub snapshots: mpsc::UnboundedReceiver<SnapshotResult>,
}

// =============================================================================
// Writes
// =============================================================================

/// What a write does to its target document.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Replace the document with `fields`.
    Set(Map<String, Value>),
    /// Merge `fields` into the existing document (creating it if missing).
    Merge(Map<String, Value>),
    /// Remove the document.
    Delete,
}

/// A point write against one document.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub collection: String,
    /// `None` asks the source to allocate a new id.
    pub doc_id: Option<String>,
    pub op: WriteOp,
}

impl WriteRequest {
    /// Builds a full-document write from any serializable value.
    ///
    /// An `id` field in the serialized value is dropped; the id travels in
    /// `doc_id`.
    pub fn set<T: Serialize>(
        collection: impl Into<String>,
        doc_id: Option<String>,
        value: &T,
    ) -> SyncResult<Self> {
        let mut fields = match serde_json::to_value(value)? {
            Value::Object(map) => map,
            other => {
                return Err(SyncError::InvalidDocument(format!(
                    "expected an object, got {}",
                    other
                )))
            }
        };
        fields.remove("id");
        Ok(WriteRequest {
            collection: collection.into(),
            doc_id: doc_id.filter(|id| !id.is_empty()),
            op: WriteOp::Set(fields),
        })
    }

    pub fn delete(collection: impl Into<String>, doc_id: impl Into<String>) -> Self {
        WriteRequest {
            collection: collection.into(),
            doc_id: Some(doc_id.into()),
            op: WriteOp::Delete,
        }
    }
}

/// Acknowledgement of a committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    pub doc_id: String,
    pub committed_at: DateTime<Utc>,
}

// =============================================================================
// RemoteSource Trait
// =============================================================================

/// A push-capable remote document store.
///
/// Implementations must deliver snapshots of one subscription in order.
pub trait RemoteSource: Send + Sync {
    /// Opens a live subscription. The first snapshot may arrive at any time
    /// after this returns.
    fn subscribe(&self, query: &Query) -> Result<RemoteSubscription, RemoteError>;

    /// Closes a subscription. Unknown ids are ignored.
    fn close(&self, subscription: RemoteSubscriptionId);

    /// Performs a point write.
    fn write(&self, request: WriteRequest) -> Result<WriteAck, RemoteError>;

    /// Discards any on-device copy kept by the client.
    fn clear_local_persistence(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}
