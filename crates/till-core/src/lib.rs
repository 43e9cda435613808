//! # till-core: Pure Pricing Logic for Till
//!
//! Domain types, validation and the discount rule resolver. Everything in
//! this crate is a deterministic function of its inputs.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Till Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Remote document store (push snapshots)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ subscribe / write                      │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               till-sync (SyncCache, mirrors)                    │   │
//! │  │    rules mirror • inventory mirror • settings mirror            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ point-in-time snapshots                │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ discount  │  │ validation│  │   │
//! │  │   │  Rule     │  │   Money   │  │  resolve  │  │   rules   │  │   │
//! │  │   │  Product  │  │  half-up  │  │  apply    │  │  settings │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO ASYNC • PURE FUNCTIONS                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Mirrored document types (DiscountRule, Product, StoreSettings)
//! - [`money`] - Money type in minor units with half-up rounding
//! - [`discount`] - Rule resolution and price application
//! - [`error`] - Domain error types
//! - [`validation`] - Structural validation of documents

pub mod discount;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

pub use discount::{ExcludedRule, PriceQuote, Resolution, ResolvedDiscount};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Store name shown before the settings document has synced.
pub const DEFAULT_STORE_NAME: &str = "Till Store";

/// Logo shown before the settings document has synced.
pub const DEFAULT_LOGO_URL: &str = "/assets/logo.svg";
