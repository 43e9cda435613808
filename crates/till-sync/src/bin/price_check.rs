//! # Price Check
//!
//! Mirrors a fixture through the live cache and prints resolved prices.
//!
//! ## Usage
//! ```bash
//! cargo run -p till-sync --bin price_check -- crates/till-sync/fixtures/pricing.json
//!
//! # Resolve at a specific instant
//! cargo run -p till-sync --bin price_check -- pricing.json --at 2025-02-01T00:00:00Z
//! ```
//!
//! ## Fixture Format
//! ```json
//! {
//!   "settings": { "storeName": "Corner Shop" },
//!   "products": [ { "id": "p1", "brand": "Acme", "model": "X1", "price": "19.995" } ],
//!   "rules": [
//!     { "id": "r1", "name": "Summer", "kind": "PERCENTAGE", "value": "10", "scope": "GLOBAL" }
//!   ]
//! }
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use till_core::{DiscountRule, Product, StoreSettings};
use till_sync::{
    CacheConfig, DiscountRuleEngine, InMemoryRemote, MirroredCatalog, RemoteSource, SettingsMirror,
    SyncCache,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    settings: Option<Value>,
    #[serde(default)]
    products: Vec<Value>,
    #[serde(default)]
    rules: Vec<Value>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut fixture_path: Option<String> = None;
    let mut at = Utc::now();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--at" | "-a" => {
                if i + 1 < args.len() {
                    at = DateTime::parse_from_rfc3339(&args[i + 1])?.with_timezone(&Utc);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            path => fixture_path = Some(path.to_string()),
        }
        i += 1;
    }

    let Some(path) = fixture_path else {
        print_usage();
        return Ok(());
    };

    let fixture: Fixture = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let config = CacheConfig::load_or_default(None);

    let remote = Arc::new(InMemoryRemote::new());
    seed(&remote, &config, &fixture);
    let source: Arc<dyn RemoteSource> = remote.clone();

    let rules = Arc::new(SyncCache::<DiscountRule>::with_config(source.clone(), &config)?);
    let products = Arc::new(SyncCache::<Product>::with_config(source.clone(), &config)?);
    let settings_cache = Arc::new(SyncCache::<StoreSettings>::with_config(source, &config)?);

    let catalog = Arc::new(MirroredCatalog::from_config(products, &config));
    catalog.mount();
    let engine = DiscountRuleEngine::from_config(rules, &config, catalog.clone());
    engine.mount();
    let settings = SettingsMirror::from_config(settings_cache, &config);
    settings.mount();

    let synced = tokio::time::timeout(Duration::from_secs(5), async {
        while engine.is_stale() || catalog.is_stale() || settings.is_stale() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if synced.is_err() {
        warn!("Mirrors did not sync in time, printing last-known data");
    }

    let store = settings.current();
    println!("{}", store.store_name);
    println!("Prices at {}", at.to_rfc3339());
    println!();

    for doc in catalog.snapshot().items() {
        let quote = engine.quote_product(&doc.data, at);
        let applied = quote
            .applied
            .as_ref()
            .map(|rule| format!("{} ({} {})", rule.rule_name, rule.scope, rule.rule_id))
            .unwrap_or_else(|| "no discount".to_string());
        println!(
            "  {:<12} {:>10} -> {:>10}  {}",
            doc.id, quote.original, quote.final_price, applied
        );
    }

    info!(
        products = catalog.snapshot().len(),
        rules = engine.rules().len(),
        "Price check complete"
    );
    Ok(())
}

/// Writes fixture documents into the in-memory store. Documents keep their
/// `id` field as the document id, or get their list position.
fn seed(remote: &InMemoryRemote, config: &CacheConfig, fixture: &Fixture) {
    if let Some(settings) = &fixture.settings {
        remote.put(&config.collections.settings, config.settings_doc_id(), settings.clone());
    }
    for (pos, product) in fixture.products.iter().enumerate() {
        remote.put(&config.collections.inventory, &doc_id(product, pos), product.clone());
    }
    for (pos, rule) in fixture.rules.iter().enumerate() {
        remote.put(&config.collections.discount_rules, &doc_id(rule, pos), rule.clone());
    }
}

fn doc_id(doc: &Value, pos: usize) -> String {
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("doc-{}", pos + 1))
}

fn print_usage() {
    println!("Till Price Check");
    println!();
    println!("Usage: price_check <FIXTURE.json> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -a, --at <RFC3339>   Resolve discounts at this instant (default: now)");
    println!("  -h, --help           Show this help message");
}

/// Log level via `RUST_LOG`, defaulting to debug for till crates.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,till=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();
}
