//! # Settings Mirror
//!
//! Serves the singleton store settings document with hardcoded fallbacks,
//! so branding renders before the first sync and while offline.

use std::sync::Arc;

use parking_lot::Mutex;
use till_core::validation::validate_store_settings;
use till_core::{CoreError, StoreSettings};
use tracing::{debug, info};

use crate::cache::{SubscriptionHandle, SyncCache};
use crate::config::CacheConfig;
use crate::error::{SyncError, SyncResult};
use crate::query::Query;
use crate::remote::{RemoteSource, WriteAck, WriteRequest};

pub struct SettingsMirror {
    cache: Arc<SyncCache<StoreSettings>>,
    query: Query,
    doc_id: String,
    defaults: StoreSettings,
    handle: Mutex<Option<SubscriptionHandle>>,
}

impl SettingsMirror {
    pub fn new(
        cache: Arc<SyncCache<StoreSettings>>,
        query: Query,
        doc_id: impl Into<String>,
        defaults: StoreSettings,
    ) -> Self {
        SettingsMirror {
            cache,
            query,
            doc_id: doc_id.into(),
            defaults,
            handle: Mutex::new(None),
        }
    }

    pub fn from_config(cache: Arc<SyncCache<StoreSettings>>, config: &CacheConfig) -> Self {
        Self::new(
            cache,
            config.settings_query(),
            config.settings_doc_id(),
            config.fallback_settings(),
        )
    }

    /// Starts mirroring the settings document. Idempotent.
    pub fn mount(&self) {
        let mut handle = self.handle.lock();
        if handle.is_none() {
            *handle = Some(self.cache.subscribe(self.query.clone()));
            debug!(query = %self.query, doc_id = %self.doc_id, "Settings mirror mounted");
        }
    }

    /// Returns false if the mirror was not mounted.
    pub fn unmount(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => self.cache.unsubscribe(&handle),
            None => false,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// The mirrored settings, with blank fields filled from the defaults.
    ///
    /// Falls back to the first document of the collection when the
    /// configured id is missing, and to the defaults when nothing is
    /// mirrored. Last-known values are served while stale.
    pub fn current(&self) -> StoreSettings {
        let entry = self.cache.current_snapshot(&self.query);
        let mirrored = entry
            .get(&self.doc_id)
            .or_else(|| entry.values().next())
            .cloned();
        match mirrored {
            Some(settings) => settings.or_defaults(&self.defaults),
            None => self.defaults.clone(),
        }
    }

    /// True before the first sync, after a clear, and while degraded.
    pub fn is_stale(&self) -> bool {
        self.cache.current_snapshot(&self.query).is_stale()
    }

    /// Drops mirrored settings until the next push. Safe to call repeatedly
    /// and without a prior [`mount`](Self::mount).
    pub fn clear_cache(&self) -> SyncResult<()> {
        self.cache.clear_cache()
    }

    pub fn defaults(&self) -> &StoreSettings {
        &self.defaults
    }

    /// Writes `settings` to the mirrored document. Mounted mirrors pick the
    /// change up on the next push.
    pub fn write(
        &self,
        remote: &dyn RemoteSource,
        settings: &StoreSettings,
    ) -> SyncResult<WriteAck> {
        write_settings(remote, self.query.collection_name(), &self.doc_id, settings)
    }
}

impl Drop for SettingsMirror {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Validates `settings` and replaces the settings document `doc_id`.
///
/// Remote refusals come back as [`SyncError::WriteRejected`] unchanged.
pub fn write_settings(
    remote: &dyn RemoteSource,
    collection: &str,
    doc_id: &str,
    settings: &StoreSettings,
) -> SyncResult<WriteAck> {
    validate_store_settings(settings).map_err(CoreError::Validation)?;

    let request = WriteRequest::set(collection, Some(doc_id.to_string()), settings)?;
    let ack = remote.write(request).map_err(SyncError::WriteRejected)?;
    info!(doc_id = %ack.doc_id, collection, "Store settings written");
    Ok(ack)
}
