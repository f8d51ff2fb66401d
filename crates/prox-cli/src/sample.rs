//! Built-in sample batches and JSON file loading for the ingest commands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use prox_core::{DealDraft, UserSeed};

fn week(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, day).expect("valid sample date")
}

pub fn sample_deals() -> Vec<DealDraft> {
    let deal = |retailer: &str, product: &str, size: &str, category: &str, price: f64| DealDraft {
        retailer: retailer.to_string(),
        product: product.to_string(),
        size: size.to_string(),
        category: category.to_string(),
        price,
        start: week(1),
        end: week(7),
    };
    vec![
        deal("Acme", "Whole Milk", "1 gal", "dairy", 3.49),
        deal("Acme", "Sourdough Bread", "24 oz", "bakery", 4.29),
        deal("Acme", "Bananas", "1 lb", "produce", 0.59),
        deal("Save-Mart", "Whole Milk", "1 gal", "dairy", 3.29),
        deal("Save-Mart", "Large Eggs", "12 ct", "dairy", 2.99),
        deal("Save-Mart", "Chicken Breast", "1 lb", "meat", 4.99),
        deal("FreshCo", "Avocados", "each", "produce", 1.25),
        deal("FreshCo", "Greek Yogurt", "32 oz", "dairy", 5.49),
    ]
}

pub fn sample_users() -> Vec<UserSeed> {
    let user = |name: &str, email: &str, preferred: &[&str]| UserSeed {
        name: name.to_string(),
        email: email.to_string(),
        preferred_retailers: preferred.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        user("Alice Nguyen", "alice@example.com", &["Acme", "FreshCo"]),
        user("Ben Carter", "ben@example.com", &["Save-Mart"]),
        user("Chloe Park", "chloe@example.com", &["Acme", "Save-Mart", "FreshCo"]),
    ]
}

pub fn load_deals(path: &Path) -> Result<Vec<DealDraft>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn load_users(path: &Path) -> Result<Vec<UserSeed>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
