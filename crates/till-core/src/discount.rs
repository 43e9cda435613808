//! # Discount Resolution
//!
//! Picks the single discount rule that applies to a product at an instant,
//! and computes the discounted price.
//!
//! ## Resolution Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     resolve(rules, product, at)                         │
//! │                                                                         │
//! │  mirrored rules                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate ──── invalid ───► Resolution.excluded (caller logs them)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  effective at `at`?  (enabled && activeFrom <= at <= activeUntil)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  scope matches product?  GLOBAL | BRAND == brand | MODEL == model      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  precedence (total order, highest wins):                               │
//! │    1. scope      MODEL > BRAND > GLOBAL                                │
//! │    2. updatedAt  newest first (absent = oldest)                        │
//! │    3. id         lexicographically smallest                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Resolution.winner  (one rule, never stacked)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use chrono::Utc;
//! use rust_decimal::Decimal;
//! use till_core::discount;
//! use till_core::{DiscountKind, DiscountRule, DiscountScope, Product};
//!
//! let rule = DiscountRule {
//!     id: "spring".into(),
//!     name: "Spring sale".into(),
//!     description: None,
//!     kind: DiscountKind::Percentage,
//!     value: Decimal::new(10, 0),
//!     scope: DiscountScope::Global,
//!     target: String::new(),
//!     active_from: None,
//!     active_until: None,
//!     enabled: true,
//!     created_at: None,
//!     updated_at: None,
//! };
//! let product = Product {
//!     id: "p1".into(),
//!     name: "Phone case".into(),
//!     brand: "Acme".into(),
//!     model: "C1".into(),
//!     price: Decimal::new(19995, 3), // 19.995
//!     stock: None,
//! };
//!
//! let resolved = discount::resolve([&rule], &product, Utc::now()).winner.unwrap();
//! assert_eq!(discount::apply(&product, &resolved).cents(), 1800);
//! ```

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{DiscountKind, DiscountRule, DiscountScope, Product};
use crate::validation::validate_discount_rule;

// =============================================================================
// Resolution Types
// =============================================================================

/// The rule selected for a product, frozen at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDiscount {
    pub rule_id: String,
    pub rule_name: String,
    pub kind: DiscountKind,
    #[ts(as = "String")]
    pub value: Decimal,
    pub scope: DiscountScope,
    pub target: String,
}

impl From<&DiscountRule> for ResolvedDiscount {
    fn from(rule: &DiscountRule) -> Self {
        ResolvedDiscount {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            kind: rule.kind,
            value: rule.value,
            scope: rule.scope,
            target: rule.target.clone(),
        }
    }
}

/// A mirrored rule left out of resolution because it failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedRule {
    pub rule_id: String,
    pub reason: ValidationError,
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The winning rule, if any rule matched.
    pub winner: Option<ResolvedDiscount>,
    /// Invalid rules skipped during this resolution.
    pub excluded: Vec<ExcludedRule>,
}

/// Price breakdown for a single product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub product_id: String,
    /// List price rounded to minor units.
    pub original: Money,
    pub final_price: Money,
    /// `original - final_price`, never negative.
    pub discount: Money,
    /// Present whenever a rule won, even one with value 0.
    pub applied: Option<ResolvedDiscount>,
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolves the best-matching effective rule for `product` at `at`.
///
/// Invalid rules never abort resolution; they are reported in
/// [`Resolution::excluded`].
pub fn resolve<'a, I>(rules: I, product: &Product, at: DateTime<Utc>) -> Resolution
where
    I: IntoIterator<Item = &'a DiscountRule>,
{
    let mut excluded = Vec::new();
    let mut best: Option<&DiscountRule> = None;

    for rule in rules {
        if let Err(reason) = validate_discount_rule(rule) {
            excluded.push(ExcludedRule {
                rule_id: rule.id.clone(),
                reason,
            });
            continue;
        }

        if !rule.is_effective_at(at) || !rule.matches(product) {
            continue;
        }

        best = match best {
            Some(current) if precedence(current, rule) != Ordering::Less => Some(current),
            _ => Some(rule),
        };
    }

    Resolution {
        winner: best.map(ResolvedDiscount::from),
        excluded,
    }
}

/// Total order over matching rules; `Greater` means `a` wins over `b`.
pub fn precedence(a: &DiscountRule, b: &DiscountRule) -> Ordering {
    a.scope
        .specificity()
        .cmp(&b.scope.specificity())
        .then_with(|| a.updated_at.cmp(&b.updated_at))
        .then_with(|| b.id.cmp(&a.id))
}

// =============================================================================
// Application
// =============================================================================

/// Computes the final price for `product` under `resolved`.
///
/// The discount math is done in exact decimals and rounded half-up to minor
/// units once, at the end. The result is never negative.
pub fn apply(product: &Product, resolved: &ResolvedDiscount) -> Money {
    let price = product.price;
    let raw = match resolved.kind {
        DiscountKind::Percentage => {
            price * (Decimal::ONE - resolved.value / Decimal::ONE_HUNDRED)
        }
        DiscountKind::FixedAmount => price - resolved.value,
    };
    Money::from_decimal(raw).clamp_non_negative()
}

/// Resolves and applies in one step, returning the price breakdown together
/// with any rules excluded as invalid.
pub fn quote<'a, I>(
    rules: I,
    product: &Product,
    at: DateTime<Utc>,
) -> (PriceQuote, Vec<ExcludedRule>)
where
    I: IntoIterator<Item = &'a DiscountRule>,
{
    let Resolution { winner, excluded } = resolve(rules, product, at);
    let original = Money::from_decimal(product.price).clamp_non_negative();
    let final_price = match &winner {
        Some(resolved) => apply(product, resolved),
        None => original,
    };

    let quote = PriceQuote {
        product_id: product.id.clone(),
        original,
        final_price,
        discount: (original - final_price).clamp_non_negative(),
        applied: winner,
    };
    (quote, excluded)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn rule(id: &str, scope: DiscountScope, target: &str, pct: i64) -> DiscountRule {
        DiscountRule {
            id: id.to_string(),
            name: format!("Rule {}", id),
            description: None,
            kind: DiscountKind::Percentage,
            value: Decimal::new(pct, 0),
            scope,
            target: target.to_string(),
            active_from: None,
            active_until: None,
            enabled: true,
            created_at: None,
            updated_at: Some(ts(2025, 1, 1)),
        }
    }

    fn product(price: Decimal) -> Product {
        Product {
            id: "p1".to_string(),
            name: "Galaxy S24".to_string(),
            brand: "Samsung".to_string(),
            model: "S24".to_string(),
            price,
            stock: Some(3),
        }
    }

    fn winner_id(rules: &[DiscountRule], p: &Product, at: DateTime<Utc>) -> Option<String> {
        resolve(rules, p, at).winner.map(|w| w.rule_id)
    }

    #[test]
    fn test_model_beats_brand_and_global() {
        let p = product(Decimal::new(100, 0));
        let rules = vec![
            rule("global", DiscountScope::Global, "", 50),
            rule("brand", DiscountScope::Brand, "Samsung", 30),
            rule("model", DiscountScope::Model, "S24", 5),
        ];
        assert_eq!(winner_id(&rules, &p, ts(2025, 6, 1)).as_deref(), Some("model"));
    }

    #[test]
    fn test_brand_beats_global() {
        let p = product(Decimal::new(100, 0));
        let rules = vec![
            rule("brand", DiscountScope::Brand, "Samsung", 30),
            rule("global", DiscountScope::Global, "", 50),
        ];
        assert_eq!(winner_id(&rules, &p, ts(2025, 6, 1)).as_deref(), Some("brand"));
    }

    #[test]
    fn test_non_matching_scopes_fall_through_to_global() {
        let p = product(Decimal::new(100, 0));
        let rules = vec![
            rule("other-model", DiscountScope::Model, "S23", 40),
            rule("other-brand", DiscountScope::Brand, "Apple", 40),
            rule("global", DiscountScope::Global, "", 10),
        ];
        assert_eq!(winner_id(&rules, &p, ts(2025, 6, 1)).as_deref(), Some("global"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let p = product(Decimal::new(100, 0));
        let rules = vec![rule("other", DiscountScope::Brand, "Apple", 10)];
        assert!(resolve(&rules, &p, ts(2025, 6, 1)).winner.is_none());
        assert!(resolve(&Vec::<DiscountRule>::new(), &p, ts(2025, 6, 1)).winner.is_none());
    }

    #[test]
    fn test_expired_window_is_ignored() {
        let p = product(Decimal::new(100, 0));
        let mut january = rule("jan", DiscountScope::Global, "", 10);
        january.active_from = Some(ts(2025, 1, 1));
        january.active_until = Some(ts(2025, 1, 31));

        let rules = vec![january];
        assert!(winner_id(&rules, &p, ts(2025, 1, 15)).is_some());
        assert!(winner_id(&rules, &p, ts(2025, 2, 1)).is_none());
        assert!(winner_id(&rules, &p, ts(2024, 12, 31)).is_none());
    }

    #[test]
    fn test_disabled_model_rule_loses_to_enabled_brand_rule() {
        let p = product(Decimal::new(100, 0));
        let mut model = rule("model", DiscountScope::Model, "S24", 5);
        model.enabled = false;
        let rules = vec![model, rule("brand", DiscountScope::Brand, "Samsung", 30)];
        assert_eq!(winner_id(&rules, &p, ts(2025, 6, 1)).as_deref(), Some("brand"));
    }

    #[test]
    fn test_tie_broken_by_newest_update() {
        let p = product(Decimal::new(100, 0));
        let older = rule("a", DiscountScope::Brand, "Samsung", 10);
        let mut newer = rule("b", DiscountScope::Brand, "Samsung", 20);
        newer.updated_at = Some(ts(2025, 3, 1));
        let mut undated = rule("0", DiscountScope::Brand, "Samsung", 30);
        undated.updated_at = None;

        let rules = vec![older, newer, undated];
        assert_eq!(winner_id(&rules, &p, ts(2025, 6, 1)).as_deref(), Some("b"));
    }

    #[test]
    fn test_tie_broken_by_smallest_id_regardless_of_order() {
        let p = product(Decimal::new(100, 0));
        let a = rule("rule-a", DiscountScope::Brand, "Samsung", 10);
        let b = rule("rule-b", DiscountScope::Brand, "Samsung", 20);

        let forward = vec![a.clone(), b.clone()];
        let backward = vec![b, a];
        for _ in 0..3 {
            assert_eq!(winner_id(&forward, &p, ts(2025, 6, 1)).as_deref(), Some("rule-a"));
            assert_eq!(winner_id(&backward, &p, ts(2025, 6, 1)).as_deref(), Some("rule-a"));
        }
    }

    #[test]
    fn test_invalid_rules_are_excluded_not_fatal() {
        let p = product(Decimal::new(100, 0));
        let broken = rule("broken", DiscountScope::Model, "", 90);
        let mut negative = rule("negative", DiscountScope::Global, "", 0);
        negative.value = Decimal::new(-5, 0);
        let rules = vec![broken, negative, rule("ok", DiscountScope::Brand, "Samsung", 10)];

        let resolution = resolve(&rules, &p, ts(2025, 6, 1));
        assert_eq!(resolution.winner.map(|w| w.rule_id).as_deref(), Some("ok"));
        let ids: Vec<_> = resolution.excluded.iter().map(|e| e.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["broken", "negative"]);
    }

    #[test]
    fn test_percentage_rounds_half_up_once() {
        let p = product(Decimal::new(19995, 3)); // 19.995
        let resolved = ResolvedDiscount::from(&rule("r", DiscountScope::Global, "", 10));
        assert_eq!(apply(&p, &resolved).cents(), 1800);
    }

    #[test]
    fn test_fixed_amount_never_negative() {
        let p = product(Decimal::new(500, 2)); // 5.00
        let mut fixed = rule("fixed", DiscountScope::Global, "", 0);
        fixed.kind = DiscountKind::FixedAmount;
        fixed.value = Decimal::new(1000, 2); // 10.00
        assert_eq!(apply(&p, &ResolvedDiscount::from(&fixed)), Money::zero());
    }

    #[test]
    fn test_fixed_amount_subtracts() {
        let p = product(Decimal::new(12999, 3)); // 12.999
        let mut fixed = rule("fixed", DiscountScope::Global, "", 0);
        fixed.kind = DiscountKind::FixedAmount;
        fixed.value = Decimal::new(250, 2);
        // 12.999 - 2.50 = 10.499 → 10.50
        assert_eq!(apply(&p, &ResolvedDiscount::from(&fixed)).cents(), 1050);
    }

    #[test]
    fn test_full_percentage_is_free() {
        let p = product(Decimal::new(4999, 2));
        let resolved = ResolvedDiscount::from(&rule("r", DiscountScope::Global, "", 100));
        assert_eq!(apply(&p, &resolved), Money::zero());
    }

    #[test]
    fn test_apply_is_idempotent() {
        let p = product(Decimal::new(3333, 2));
        let resolved = ResolvedDiscount::from(&rule("r", DiscountScope::Global, "", 15));
        let first = apply(&p, &resolved);
        let second = apply(&p, &resolved);
        assert_eq!(first, second);
        assert_eq!(p.price, Decimal::new(3333, 2));
    }

    #[test]
    fn test_zero_value_rule_is_still_reported() {
        let p = product(Decimal::new(1000, 2));
        let rules = vec![rule("zero", DiscountScope::Global, "", 0)];
        let (quote, excluded) = quote(&rules, &p, ts(2025, 6, 1));
        assert!(excluded.is_empty());
        assert_eq!(quote.final_price, quote.original);
        assert!(quote.discount.is_zero());
        assert_eq!(quote.applied.map(|a| a.rule_id).as_deref(), Some("zero"));
    }

    #[test]
    fn test_quote_breakdown() {
        let p = product(Decimal::new(8000, 2));
        let rules = vec![rule("r", DiscountScope::Model, "S24", 25)];
        let (quote, _) = quote(&rules, &p, ts(2025, 6, 1));
        assert_eq!(quote.original.cents(), 8000);
        assert_eq!(quote.final_price.cents(), 6000);
        assert_eq!(quote.discount.cents(), 2000);
    }

    #[test]
    fn test_quote_without_rules_keeps_price() {
        let p = product(Decimal::new(19995, 3));
        let (quote, _) = quote(std::iter::empty(), &p, ts(2025, 6, 1));
        assert!(quote.applied.is_none());
        assert_eq!(quote.final_price.cents(), 2000);
        assert!(quote.discount.is_zero());
    }
}
