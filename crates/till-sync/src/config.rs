//! # Cache Configuration
//!
//! Collection names, channel sizing and fallback branding for the mirrors.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_RULES_COLLECTION=discountRules                                │
//! │     TILL_SETTINGS_DOC_ID=store                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/cache.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.till.pos/cache.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # cache.toml
//! [collections]
//! discount_rules = "discountRules"
//! inventory = "products"
//! settings = "settings"
//! settings_doc_id = "store"
//!
//! [channels]
//! error_capacity = 64
//!
//! [defaults]
//! store_name = "Till Store"
//! logo_url = "/assets/logo.svg"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use till_core::{StoreSettings, DEFAULT_LOGO_URL, DEFAULT_STORE_NAME};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::query::{Direction, Query};

// =============================================================================
// Collections
// =============================================================================

/// Remote collection names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSettings {
    #[serde(default = "default_rules_collection")]
    pub discount_rules: String,

    #[serde(default = "default_inventory_collection")]
    pub inventory: String,

    #[serde(default = "default_settings_collection")]
    pub settings: String,

    /// Id of the singleton settings document.
    #[serde(default = "default_settings_doc_id")]
    pub settings_doc_id: String,
}

fn default_rules_collection() -> String {
    "discountRules".to_string()
}

fn default_inventory_collection() -> String {
    "products".to_string()
}

fn default_settings_collection() -> String {
    "settings".to_string()
}

fn default_settings_doc_id() -> String {
    "store".to_string()
}

impl Default for CollectionSettings {
    fn default() -> Self {
        CollectionSettings {
            discount_rules: default_rules_collection(),
            inventory: default_inventory_collection(),
            settings: default_settings_collection(),
            settings_doc_id: default_settings_doc_id(),
        }
    }
}

// =============================================================================
// Channels
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Buffered failures per error receiver before the oldest are dropped.
    #[serde(default = "default_error_capacity")]
    pub error_capacity: usize,
}

fn default_error_capacity() -> usize {
    64
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            error_capacity: default_error_capacity(),
        }
    }
}

// =============================================================================
// Fallback Branding
// =============================================================================

/// Branding served before the settings document has synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSettings {
    #[serde(default = "default_store_name")]
    pub store_name: String,

    #[serde(default = "default_logo_url")]
    pub logo_url: String,
}

fn default_store_name() -> String {
    DEFAULT_STORE_NAME.to_string()
}

fn default_logo_url() -> String {
    DEFAULT_LOGO_URL.to_string()
}

impl Default for DefaultSettings {
    fn default() -> Self {
        DefaultSettings {
            store_name: default_store_name(),
            logo_url: default_logo_url(),
        }
    }
}

// =============================================================================
// Main Cache Configuration
// =============================================================================

/// Complete cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub collections: CollectionSettings,

    #[serde(default)]
    pub channels: ChannelSettings,

    #[serde(default)]
    pub defaults: DefaultSettings,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (cache.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading cache config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load cache config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Cache config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        let names = [
            ("collections.discount_rules", &self.collections.discount_rules),
            ("collections.inventory", &self.collections.inventory),
            ("collections.settings", &self.collections.settings),
            ("collections.settings_doc_id", &self.collections.settings_doc_id),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(SyncError::InvalidConfig(format!("{} must not be empty", field)));
            }
            if value.contains('/') {
                return Err(SyncError::InvalidConfig(format!(
                    "{} must be a single path segment, got: {}",
                    field, value
                )));
            }
        }

        if self.channels.error_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "error_capacity must be greater than 0".into(),
            ));
        }

        if self.defaults.store_name.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "defaults.store_name must not be empty".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("TILL_RULES_COLLECTION") {
            debug!(collection = %name, "Overriding rules collection from environment");
            self.collections.discount_rules = name;
        }

        if let Ok(name) = std::env::var("TILL_INVENTORY_COLLECTION") {
            debug!(collection = %name, "Overriding inventory collection from environment");
            self.collections.inventory = name;
        }

        if let Ok(name) = std::env::var("TILL_SETTINGS_COLLECTION") {
            self.collections.settings = name;
        }

        if let Ok(id) = std::env::var("TILL_SETTINGS_DOC_ID") {
            self.collections.settings_doc_id = id;
        }

        if let Ok(capacity) = std::env::var("TILL_ERROR_CHANNEL_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(c) => self.channels.error_capacity = c,
                Err(_) => warn!(value = %capacity, "Ignoring non-numeric error channel capacity"),
            }
        }

        if let Ok(name) = std::env::var("TILL_DEFAULT_STORE_NAME") {
            self.defaults.store_name = name;
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "pos")
            .map(|dirs| dirs.config_dir().join("cache.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Every discount rule, newest first.
    pub fn rules_query(&self) -> Query {
        Query::collection(&self.collections.discount_rules)
            .order_by("createdAt", Direction::Descending)
    }

    pub fn inventory_query(&self) -> Query {
        Query::collection(&self.collections.inventory)
    }

    /// The settings collection; the mirror picks the singleton out of it.
    pub fn settings_query(&self) -> Query {
        Query::collection(&self.collections.settings)
    }

    pub fn settings_doc_id(&self) -> &str {
        &self.collections.settings_doc_id
    }

    /// Settings served when nothing has been mirrored.
    pub fn fallback_settings(&self) -> StoreSettings {
        StoreSettings {
            store_name: self.defaults.store_name.clone(),
            logo_url: self.defaults.logo_url.clone(),
            ..StoreSettings::default()
        }
    }
}
