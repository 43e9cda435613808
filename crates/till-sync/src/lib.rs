//! # till-sync: Live Mirrors for Till
//!
//! Keeps local mirrors of remote collections fresh through push
//! subscriptions, degrades to last-known data when offline, and serves the
//! live discount engine and store settings from those mirrors.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Mirror Architecture                            │
//! │                                                                         │
//! │  ┌──────────────────────┐        ┌──────────────────────────────────┐  │
//! │  │  ConnectivityMonitor │ edges  │          SyncCache<T>            │  │
//! │  │  ONLINE / OFFLINE    ├───────►│  OFFLINE → mark entries stale    │  │
//! │  └──────────────────────┘        │  ONLINE  → retry degraded        │  │
//! │                                  └───────┬──────────────▲───────────┘  │
//! │                                          │ subscribe    │ snapshots    │
//! │                                  ┌───────▼──────────────┴───────────┐  │
//! │                                  │     RemoteSource (document store)│  │
//! │                                  └──────────────────────────────────┘  │
//! │                                                                         │
//! │  Consumers (read current_snapshot, never block):                       │
//! │  ┌────────────────────┐  ┌────────────────────┐  ┌──────────────────┐  │
//! │  │ DiscountRuleEngine │  │  MirroredCatalog   │  │  SettingsMirror  │  │
//! │  │ SyncCache<Rule>    │  │  SyncCache<Product>│  │  SyncCache<      │  │
//! │  │                    │  │                    │  │   StoreSettings> │  │
//! │  └────────────────────┘  └────────────────────┘  └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`cache`] - `SyncCache<T>` with multiplexed subscriptions
//! - [`config`] - Collection names and channel sizing (TOML + env)
//! - [`connectivity`] - ONLINE/OFFLINE monitor
//! - [`discounts`] - Live discount engine, product catalogs, rule writes
//! - [`error`] - Sync and remote error types
//! - [`memory`] - In-process `RemoteSource`
//! - [`query`] - Canonical query keys
//! - [`remote`] - The `RemoteSource` contract
//! - [`settings`] - Store settings mirror with fallbacks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use till_sync::{
//!     CacheConfig, ConnectivityMonitor, DiscountRuleEngine, MirroredCatalog, SyncCache,
//! };
//!
//! let config = CacheConfig::load_or_default(None);
//! let monitor = ConnectivityMonitor::default();
//!
//! let rules = Arc::new(SyncCache::with_config(remote.clone(), &config)?);
//! rules.attach(&monitor);
//! let products = Arc::new(SyncCache::with_config(remote.clone(), &config)?);
//! products.attach(&monitor);
//!
//! let catalog = Arc::new(MirroredCatalog::from_config(products, &config));
//! catalog.mount();
//! let engine = DiscountRuleEngine::from_config(rules, &config, catalog);
//! engine.mount();
//!
//! let quote = engine.quote("sku-123", chrono::Utc::now())?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod discounts;
pub mod error;
pub mod memory;
pub mod query;
pub mod remote;
pub mod settings;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::{
    CacheEntry, MirroredDoc, QueryStatus, SubscriptionHandle, SyncCache, SyncFailure,
};
pub use config::CacheConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityState, ListenerId};
pub use discounts::{
    delete_rule, write_rule, DiscountRuleEngine, MirroredCatalog, ProductCatalog, StaticCatalog,
};
pub use error::{RemoteError, RemoteErrorKind, SyncError, SyncResult};
pub use memory::InMemoryRemote;
pub use query::{Direction, Query};
pub use remote::{
    Document, FullSnapshot, RemoteSource, RemoteSubscription, RemoteSubscriptionId, WriteAck,
    WriteOp, WriteRequest,
};
pub use settings::{write_settings, SettingsMirror};
