//! # Validation Module
//!
//! Structural validation for mirrored documents.
//!
//! ## Where Validation Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Admin form (write path)                                      │
//! │  └── validate_discount_rule() before the document is written           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Remote store                                                 │
//! │  └── Security rules; may reject the write (WriteRejected)              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Resolution (read path)                                       │
//! │  └── Every mirrored rule is re-checked; invalid rules are excluded     │
//! │      from resolution instead of failing the whole price lookup         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use till_core::validation::validate_discount_rule;
//! # fn rule() -> till_core::DiscountRule { unimplemented!() }
//!
//! validate_discount_rule(&rule()).unwrap();
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::types::{DiscountKind, DiscountRule, StoreSettings};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length for display labels.
pub const MAX_NAME_LEN: usize = 100;

// =============================================================================
// Discount Rules
// =============================================================================

/// Validates a discount rule.
///
/// ## Rules
/// - `name` must not be blank, at most 100 characters
/// - `value` must not be negative
/// - PERCENTAGE `value` must be in [0, 100]
/// - BRAND / MODEL scope requires a non-blank `target`
/// - `activeUntil` must not precede `activeFrom`
pub fn validate_discount_rule(rule: &DiscountRule) -> ValidationResult<()> {
    validate_label("name", &rule.name)?;

    if rule.value < Decimal::ZERO {
        return Err(ValidationError::MustBeNonNegative {
            field: "value".to_string(),
        });
    }

    if rule.kind == DiscountKind::Percentage && rule.value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::OutOfRange {
            field: "value".to_string(),
            min: "0".to_string(),
            max: "100".to_string(),
        });
    }

    if rule.scope.requires_target() && rule.target.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "target".to_string(),
        });
    }

    if let (Some(from), Some(until)) = (rule.active_from, rule.active_until) {
        if until < from {
            return Err(ValidationError::InvalidWindow);
        }
    }

    Ok(())
}

// =============================================================================
// Store Settings
// =============================================================================

/// Validates the settings document before it is written.
///
/// Blank fields are allowed (readers fall back to defaults); non-blank
/// values must be well formed.
pub fn validate_store_settings(settings: &StoreSettings) -> ValidationResult<()> {
    if settings.store_name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "storeName".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    let logo = settings.logo_url.trim();
    if !logo.is_empty() && logo.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "logoUrl".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

fn validate_label(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiscountScope;
    use chrono::{TimeZone, Utc};

    fn valid_rule() -> DiscountRule {
        DiscountRule {
            id: "r1".to_string(),
            name: "Clearance".to_string(),
            description: None,
            kind: DiscountKind::Percentage,
            value: Decimal::new(25, 0),
            scope: DiscountScope::Model,
            target: "X200".to_string(),
            active_from: None,
            active_until: None,
            enabled: true,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_valid_rule_passes() {
        assert!(validate_discount_rule(&valid_rule()).is_ok());
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut rule = valid_rule();
        rule.name = "   ".to_string();
        assert!(matches!(
            validate_discount_rule(&rule),
            Err(ValidationError::Required { field }) if field == "name"
        ));
    }

    #[test]
    fn test_scoped_rule_requires_target() {
        let mut rule = valid_rule();
        rule.target = String::new();
        assert!(matches!(
            validate_discount_rule(&rule),
            Err(ValidationError::Required { field }) if field == "target"
        ));

        rule.scope = DiscountScope::Global;
        assert!(validate_discount_rule(&rule).is_ok());
    }

    #[test]
    fn test_value_bounds() {
        let mut rule = valid_rule();
        rule.value = Decimal::new(-1, 0);
        assert!(matches!(
            validate_discount_rule(&rule),
            Err(ValidationError::MustBeNonNegative { .. })
        ));

        rule.value = Decimal::new(101, 0);
        assert!(matches!(
            validate_discount_rule(&rule),
            Err(ValidationError::OutOfRange { .. })
        ));

        // Fixed amounts have no upper bound.
        rule.kind = DiscountKind::FixedAmount;
        assert!(validate_discount_rule(&rule).is_ok());

        rule.value = Decimal::ZERO;
        assert!(validate_discount_rule(&rule).is_ok());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut rule = valid_rule();
        rule.active_from = Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
        rule.active_until = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(
            validate_discount_rule(&rule),
            Err(ValidationError::InvalidWindow)
        );
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = StoreSettings::default();
        assert!(validate_store_settings(&settings).is_ok());

        settings.logo_url = "https://cdn.example.com/my logo.png".to_string();
        assert!(validate_store_settings(&settings).is_err());

        settings.logo_url = String::new();
        settings.store_name = "A".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            validate_store_settings(&settings),
            Err(ValidationError::TooLong { .. })
        ));
    }
}
