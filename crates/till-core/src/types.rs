//! # Domain Types
//!
//! Document shapes mirrored from the remote store.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  DiscountRule   │   │    Product      │   │ StoreSettings   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  kind / value   │   │  brand          │   │  storeName      │       │
//! │  │  scope / target │   │  model          │   │  logoUrl        │       │
//! │  │  activeFrom/To  │   │  price          │   │  address/phone  │       │
//! │  │  enabled        │   │  (read-only)    │   │  (singleton)    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │  DiscountKind   │   │ DiscountScope   │                             │
//! │  │  PERCENTAGE     │   │  GLOBAL         │                             │
//! │  │  FIXED_AMOUNT   │   │  BRAND / MODEL  │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Field names are camelCase on the wire because the documents are written
//! by the store's admin pages, not by this crate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{DEFAULT_LOGO_URL, DEFAULT_STORE_NAME};

// =============================================================================
// Discount Kind
// =============================================================================

/// How a discount's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    /// `value` is a percentage in [0, 100].
    Percentage,
    /// `value` is a currency amount subtracted from the price.
    FixedAmount,
}

// =============================================================================
// Discount Scope
// =============================================================================

/// The breadth of products a rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountScope {
    /// Every product.
    Global,
    /// Products whose brand equals the rule target.
    Brand,
    /// Products whose model equals the rule target.
    Model,
}

impl DiscountScope {
    /// Precedence rank: higher wins (MODEL > BRAND > GLOBAL).
    #[inline]
    pub const fn specificity(&self) -> u8 {
        match self {
            DiscountScope::Global => 0,
            DiscountScope::Brand => 1,
            DiscountScope::Model => 2,
        }
    }

    /// Whether the scope needs a non-empty `target`.
    #[inline]
    pub const fn requires_target(&self) -> bool {
        !matches!(self, DiscountScope::Global)
    }
}

impl std::fmt::Display for DiscountScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscountScope::Global => write!(f, "GLOBAL"),
            DiscountScope::Brand => write!(f, "BRAND"),
            DiscountScope::Model => write!(f, "MODEL"),
        }
    }
}

// =============================================================================
// Discount Rule
// =============================================================================

/// A time-bounded discount rule as stored in the `discountRules` collection.
///
/// ## Effective Window
/// ```text
///   enabled == false ─────────────────────────────► never effective
///
///   activeFrom (inclusive)              activeUntil (inclusive)
///        │◄──────────── effective ────────────►│
///   ─────┼─────────────────────────────────────┼─────► time
///        absent = always started               absent = never expires
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRule {
    /// Document id.
    #[serde(default)]
    pub id: String,

    /// Display label, non-empty.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub kind: DiscountKind,

    /// Percentage (0-100) or currency amount, depending on `kind`.
    #[ts(as = "String")]
    pub value: Decimal,

    pub scope: DiscountScope,

    /// Brand or model name for scoped rules; ignored for GLOBAL.
    #[serde(default)]
    pub target: String,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub active_from: Option<DateTime<Utc>>,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub active_until: Option<DateTime<Utc>>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl DiscountRule {
    /// Returns true if the rule is enabled and `at` lies inside its window.
    pub fn is_effective_at(&self, at: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        if matches!(self.active_from, Some(from) if at < from) {
            return false;
        }
        if matches!(self.active_until, Some(until) if at > until) {
            return false;
        }
        true
    }

    /// Returns true if the rule's scope matches the product.
    ///
    /// Target comparison is exact and case-sensitive. A scoped rule with an
    /// empty target never matches.
    pub fn matches(&self, product: &Product) -> bool {
        match self.scope {
            DiscountScope::Global => true,
            DiscountScope::Brand => !self.target.is_empty() && self.target == product.brand,
            DiscountScope::Model => !self.target.is_empty() && self.target == product.model,
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// Read-only product projection consumed from the inventory catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Document id.
    #[serde(default)]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    pub brand: String,

    pub model: String,

    /// Unit price; may carry more than two fractional digits.
    #[ts(as = "String")]
    pub price: Decimal,

    #[serde(default)]
    pub stock: Option<i64>,
}

// =============================================================================
// Store Settings
// =============================================================================

/// Store branding, mirrored from the singleton settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    #[serde(default)]
    pub store_name: String,

    #[serde(default)]
    pub logo_url: String,

    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            store_name: DEFAULT_STORE_NAME.to_string(),
            logo_url: DEFAULT_LOGO_URL.to_string(),
            address: None,
            phone: None,
        }
    }
}

impl StoreSettings {
    /// Fills blank fields from `fallback` so the UI never renders without
    /// branding.
    pub fn or_defaults(mut self, fallback: &StoreSettings) -> Self {
        if self.store_name.trim().is_empty() {
            self.store_name = fallback.store_name.clone();
        }
        if self.logo_url.trim().is_empty() {
            self.logo_url = fallback.logo_url.clone();
        }
        if self.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
            self.address = fallback.address.clone();
        }
        if self.phone.as_deref().map_or(true, |p| p.trim().is_empty()) {
            self.phone = fallback.phone.clone();
        }
        self
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
