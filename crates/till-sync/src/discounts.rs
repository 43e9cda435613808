//! # Live Discount Resolution
//!
//! Binds the pure resolver in [`till_core::discount`] to the mirrored rule
//! set and a product catalog.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SyncCache<DiscountRule> ──current_snapshot──┐                          │
//! │                                              ▼                          │
//! │  ProductCatalog ──product(id)──► DiscountRuleEngine::quote(id, at)      │
//! │    StaticCatalog                             │                          │
//! │    MirroredCatalog (SyncCache<Product>)      │ discount::resolve        │
//! │                                              │ discount::apply          │
//! │                                              ▼                          │
//! │                                         PriceQuote                      │
//! │                                                                         │
//! │  Invalid rules are excluded and logged once per snapshot version.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rules are only ever written through [`write_rule`] / [`delete_rule`]; the
//! engine itself never mutates them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use till_core::discount::{self, ExcludedRule, PriceQuote, ResolvedDiscount};
use till_core::validation::validate_discount_rule;
use till_core::{CoreError, CoreResult, DiscountRule, Money, Product};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, SubscriptionHandle, SyncCache};
use crate::config::CacheConfig;
use crate::error::{SyncError, SyncResult};
use crate::query::Query;
use crate::remote::{RemoteSource, WriteAck, WriteRequest};

// =============================================================================
// Product Catalog
// =============================================================================

/// Read-only product lookup.
pub trait ProductCatalog: Send + Sync {
    fn product(&self, id: &str) -> Option<Product>;
}

/// Fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    products: HashMap<String, Product>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl FromIterator<Product> for StaticCatalog {
    fn from_iter<I: IntoIterator<Item = Product>>(iter: I) -> Self {
        let mut catalog = StaticCatalog::new();
        for product in iter {
            catalog.insert(product);
        }
        catalog
    }
}

impl ProductCatalog for StaticCatalog {
    fn product(&self, id: &str) -> Option<Product> {
        self.products.get(id).cloned()
    }
}

/// Catalog backed by the inventory mirror.
pub struct MirroredCatalog {
    cache: Arc<SyncCache<Product>>,
    query: Query,
    handle: Mutex<Option<SubscriptionHandle>>,
}

impl MirroredCatalog {
    pub fn new(cache: Arc<SyncCache<Product>>, query: Query) -> Self {
        MirroredCatalog {
            cache,
            query,
            handle: Mutex::new(None),
        }
    }

    pub fn from_config(cache: Arc<SyncCache<Product>>, config: &CacheConfig) -> Self {
        Self::new(cache, config.inventory_query())
    }

    /// Starts mirroring the inventory. Idempotent.
    pub fn mount(&self) {
        let mut handle = self.handle.lock();
        if handle.is_none() {
            *handle = Some(self.cache.subscribe(self.query.clone()));
        }
    }

    /// Returns false if the catalog was not mounted.
    pub fn unmount(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => self.cache.unsubscribe(&handle),
            None => false,
        }
    }

    pub fn snapshot(&self) -> CacheEntry<Product> {
        self.cache.current_snapshot(&self.query)
    }

    pub fn is_stale(&self) -> bool {
        self.snapshot().is_stale()
    }
}

impl ProductCatalog for MirroredCatalog {
    fn product(&self, id: &str) -> Option<Product> {
        self.snapshot().get(id).cloned()
    }
}

impl Drop for MirroredCatalog {
    fn drop(&mut self) {
        self.unmount();
    }
}

// =============================================================================
// Discount Rule Engine
// =============================================================================

/// Invalid rule ids already logged for one snapshot version.
#[derive(Default)]
struct ReportedRules {
    version: u64,
    rule_ids: HashSet<String>,
}

/// Resolves discounts against the live rule mirror.
pub struct DiscountRuleEngine {
    rules: Arc<SyncCache<DiscountRule>>,
    query: Query,
    catalog: Arc<dyn ProductCatalog>,
    handle: Mutex<Option<SubscriptionHandle>>,
    reported: Mutex<ReportedRules>,
}

impl DiscountRuleEngine {
    pub fn new(
        rules: Arc<SyncCache<DiscountRule>>,
        query: Query,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Self {
        DiscountRuleEngine {
            rules,
            query,
            catalog,
            handle: Mutex::new(None),
            reported: Mutex::new(ReportedRules::default()),
        }
    }

    pub fn from_config(
        rules: Arc<SyncCache<DiscountRule>>,
        config: &CacheConfig,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Self {
        Self::new(rules, config.rules_query(), catalog)
    }

    /// Starts mirroring the rule collection. Idempotent.
    pub fn mount(&self) {
        let mut handle = self.handle.lock();
        if handle.is_none() {
            *handle = Some(self.rules.subscribe(self.query.clone()));
            debug!(query = %self.query, "Discount engine mounted");
        }
    }

    /// Returns false if the engine was not mounted.
    pub fn unmount(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => self.rules.unsubscribe(&handle),
            None => false,
        }
    }

    /// The rule set resolution currently runs against.
    pub fn rules(&self) -> CacheEntry<DiscountRule> {
        self.rules.current_snapshot(&self.query)
    }

    /// True while the rule set is not known to be current.
    pub fn is_stale(&self) -> bool {
        self.rules().is_stale()
    }

    /// The single applicable discount for `product` at `at`, if any.
    pub fn resolve(&self, product: &Product, at: DateTime<Utc>) -> Option<ResolvedDiscount> {
        let rules = self.rules();
        let resolution = discount::resolve(rules.values(), product, at);
        self.report_excluded(rules.version(), &resolution.excluded);
        resolution.winner
    }

    /// Final price of `product` under `resolved`.
    pub fn apply(&self, product: &Product, resolved: &ResolvedDiscount) -> Money {
        discount::apply(product, resolved)
    }

    /// Looks the product up in the catalog, then resolves.
    pub fn resolve_by_id(
        &self,
        product_id: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<ResolvedDiscount>> {
        let product = self.lookup(product_id)?;
        Ok(self.resolve(&product, at))
    }

    /// Price breakdown for a catalog product.
    pub fn quote(&self, product_id: &str, at: DateTime<Utc>) -> CoreResult<PriceQuote> {
        let product = self.lookup(product_id)?;
        Ok(self.quote_product(&product, at))
    }

    /// Price breakdown for a product the caller already holds.
    pub fn quote_product(&self, product: &Product, at: DateTime<Utc>) -> PriceQuote {
        let rules = self.rules();
        let (quote, excluded) = discount::quote(rules.values(), product, at);
        self.report_excluded(rules.version(), &excluded);
        quote
    }

    fn lookup(&self, product_id: &str) -> CoreResult<Product> {
        self.catalog
            .product(product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
    }

    fn report_excluded(&self, version: u64, excluded: &[ExcludedRule]) {
        if excluded.is_empty() {
            return;
        }
        let mut reported = self.reported.lock();
        if reported.version != version {
            reported.version = version;
            reported.rule_ids.clear();
        }
        for rule in excluded {
            if reported.rule_ids.insert(rule.rule_id.clone()) {
                warn!(
                    rule_id = %rule.rule_id,
                    reason = %rule.reason,
                    "Excluding invalid discount rule"
                );
            }
        }
    }
}

impl Drop for DiscountRuleEngine {
    fn drop(&mut self) {
        self.unmount();
    }
}

// =============================================================================
// Rule Writes
// =============================================================================

/// Validates `rule` and writes it to `collection`. An empty id creates a new
/// document.
///
/// Remote refusals come back as [`SyncError::WriteRejected`] unchanged.
pub fn write_rule(
    remote: &dyn RemoteSource,
    collection: &str,
    rule: &DiscountRule,
) -> SyncResult<WriteAck> {
    validate_discount_rule(rule).map_err(|source| CoreError::InvalidRule {
        rule_id: rule.id.clone(),
        source,
    })?;

    let request = WriteRequest::set(collection, Some(rule.id.clone()), rule)?;
    let ack = remote.write(request).map_err(SyncError::WriteRejected)?;
    info!(rule_id = %ack.doc_id, collection, "Discount rule written");
    Ok(ack)
}

pub fn delete_rule(
    remote: &dyn RemoteSource,
    collection: &str,
    rule_id: &str,
) -> SyncResult<WriteAck> {
    let ack = remote
        .write(WriteRequest::delete(collection, rule_id))
        .map_err(SyncError::WriteRejected)?;
    info!(rule_id, collection, "Discount rule deleted");
    Ok(ack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use crate::memory::InMemoryRemote;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;
    use std::time::Duration;
    use till_core::{DiscountKind, DiscountScope};

    const RULES: &str = "discountRules";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn product(id: &str, brand: &str, model: &str, price: &str) -> Product {
        Product {
            id: id.into(),
            name: format!("{} {}", brand, model),
            brand: brand.into(),
            model: model.into(),
            price: dec(price),
            stock: None,
        }
    }

    fn rule(
        id: &str,
        kind: DiscountKind,
        value: &str,
        scope: DiscountScope,
        target: &str,
    ) -> DiscountRule {
        DiscountRule {
            id: id.into(),
            name: format!("Rule {}", id),
            description: None,
            kind,
            value: dec(value),
            scope,
            target: target.into(),
            active_from: None,
            active_until: None,
            enabled: true,
            created_at: None,
            updated_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        remote: Arc<InMemoryRemote>,
        engine: DiscountRuleEngine,
    }

    fn fixture(products: Vec<Product>) -> Fixture {
        let remote = Arc::new(InMemoryRemote::new());
        let cache = Arc::new(SyncCache::<DiscountRule>::new(remote.clone()).unwrap());
        let catalog: Arc<dyn ProductCatalog> =
            Arc::new(products.into_iter().collect::<StaticCatalog>());
        let engine = DiscountRuleEngine::from_config(cache, &CacheConfig::default(), catalog);
        Fixture { remote, engine }
    }

    async fn wait_for_rules(engine: &DiscountRuleEngine, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let rules = engine.rules();
                if !rules.is_stale() && rules.len() == count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("rules not mirrored in time");
    }

    #[tokio::test]
    async fn test_quote_uses_mirrored_rules() {
        let fx = fixture(vec![product("p1", "Acme", "X1", "19.995")]);
        let global = rule("r1", DiscountKind::Percentage, "10", DiscountScope::Global, "");
        write_rule(fx.remote.as_ref(), RULES, &global).unwrap();

        fx.engine.mount();
        wait_for_rules(&fx.engine, 1).await;

        let quote = fx.engine.quote("p1", now()).unwrap();
        assert_eq!(quote.final_price, Money::from_cents(1800));
        assert_eq!(quote.applied.map(|r| r.rule_id), Some("r1".to_string()));
    }

    #[tokio::test]
    async fn test_model_rule_beats_brand_and_global() {
        let fx = fixture(vec![product("p1", "Acme", "X1", "100.00")]);
        for r in [
            rule("g", DiscountKind::Percentage, "50", DiscountScope::Global, ""),
            rule("b", DiscountKind::Percentage, "30", DiscountScope::Brand, "Acme"),
            rule("m", DiscountKind::FixedAmount, "5", DiscountScope::Model, "X1"),
        ] {
            write_rule(fx.remote.as_ref(), RULES, &r).unwrap();
        }
        fx.engine.mount();
        wait_for_rules(&fx.engine, 3).await;

        let winner = fx.engine.resolve_by_id("p1", now()).unwrap().unwrap();
        assert_eq!(winner.rule_id, "m");
        assert_eq!(fx.engine.quote("p1", now()).unwrap().final_price, Money::from_cents(9500));
    }

    #[tokio::test]
    async fn test_live_rule_edit_changes_resolution() {
        let fx = fixture(vec![product("p1", "Acme", "X1", "10.00")]);
        fx.engine.mount();
        wait_for_rules(&fx.engine, 0).await;
        assert!(fx.engine.resolve_by_id("p1", now()).unwrap().is_none());

        let brand = rule("b1", DiscountKind::FixedAmount, "1", DiscountScope::Brand, "Acme");
        write_rule(fx.remote.as_ref(), RULES, &brand).unwrap();
        wait_for_rules(&fx.engine, 1).await;
        assert_eq!(fx.engine.quote("p1", now()).unwrap().final_price, Money::from_cents(900));

        delete_rule(fx.remote.as_ref(), RULES, "b1").unwrap();
        wait_for_rules(&fx.engine, 0).await;
        assert_eq!(fx.engine.quote("p1", now()).unwrap().final_price, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn test_invalid_mirrored_rule_is_excluded() {
        let fx = fixture(vec![product("p1", "Acme", "X1", "10.00")]);
        // Bypasses write-time validation, as a foreign writer could.
        fx.remote.put(
            RULES,
            "bad",
            json!({
                "name": "Broken",
                "kind": "PERCENTAGE",
                "value": "150",
                "scope": "MODEL",
                "target": "X1"
            }),
        );
        fx.remote.put(
            RULES,
            "ok",
            json!({
                "name": "Brand",
                "kind": "PERCENTAGE",
                "value": "10",
                "scope": "BRAND",
                "target": "Acme"
            }),
        );
        fx.engine.mount();
        wait_for_rules(&fx.engine, 2).await;

        let winner = fx.engine.resolve_by_id("p1", now()).unwrap().unwrap();
        assert_eq!(winner.rule_id, "ok");
        // Repeat resolutions stay consistent.
        assert_eq!(fx.engine.resolve_by_id("p1", now()).unwrap().unwrap().rule_id, "ok");
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let fx = fixture(vec![]);
        fx.engine.mount();
        assert!(matches!(
            fx.engine.quote("missing", now()),
            Err(CoreError::ProductNotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_stale_before_first_sync_and_unmount() {
        let fx = fixture(vec![]);
        assert!(fx.engine.is_stale());
        assert!(!fx.engine.unmount());

        fx.engine.mount();
        fx.engine.mount();
        assert_eq!(fx.remote.live_subscriptions(), 1);
        wait_for_rules(&fx.engine, 0).await;
        assert!(!fx.engine.is_stale());

        assert!(fx.engine.unmount());
        assert_eq!(fx.remote.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_mirrored_catalog() {
        let remote = Arc::new(InMemoryRemote::new());
        remote.put("products", "p1", json!({"brand": "Acme", "model": "X1", "price": 12.5}));
        let cache = Arc::new(SyncCache::<Product>::new(remote.clone()).unwrap());
        let catalog = MirroredCatalog::from_config(cache, &CacheConfig::default());
        assert!(catalog.product("p1").is_none());

        catalog.mount();
        tokio::time::timeout(Duration::from_secs(2), async {
            while catalog.is_stale() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let p1 = catalog.product("p1").unwrap();
        assert_eq!(p1.id, "p1");
        assert_eq!(p1.price, dec("12.5"));

        drop(catalog);
        assert_eq!(remote.live_subscriptions(), 0);
    }

    #[test]
    fn test_write_rule_validates_first() {
        let remote = InMemoryRemote::new();
        let bad = rule("r", DiscountKind::Percentage, "120", DiscountScope::Global, "");
        let err = write_rule(&remote, RULES, &bad).unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::InvalidRule { .. })));
        assert!(remote.documents(RULES).is_empty());
    }

    #[test]
    fn test_write_rule_surfaces_rejection() {
        let remote = InMemoryRemote::new();
        remote.deny(RULES);
        let good = rule("r", DiscountKind::FixedAmount, "1", DiscountScope::Global, "");
        match write_rule(&remote, RULES, &good) {
            Err(SyncError::WriteRejected(err)) => {
                assert_eq!(err.kind, RemoteErrorKind::PermissionDenied)
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_write_rule_allocates_id_for_new_rules() {
        let remote = InMemoryRemote::new();
        let new_rule = rule("", DiscountKind::FixedAmount, "2", DiscountScope::Global, "");
        let ack = write_rule(&remote, RULES, &new_rule).unwrap();
        assert!(!ack.doc_id.is_empty());
        assert_eq!(remote.documents(RULES)[0].id, ack.doc_id);
    }

    #[test]
    fn test_static_catalog() {
        let catalog: StaticCatalog = vec![product("a", "B", "M", "1")].into_iter().collect();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.product("a").is_some());
        assert!(catalog.product("b").is_none());
    }
}
