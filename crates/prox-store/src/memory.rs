//! In-memory [`DealStore`] backend.
//!
//! Backs the unit tests of every crate that consumes the store contract. It
//! counts operations (so "this path performs zero store calls" is provable)
//! and can inject per-table faults to exercise the error taxonomy.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use prox_core::UserSeed;
use uuid::Uuid;

use crate::{
    DealJoinRow, DealStore, NewDeal, RetailerRef, StoreError, UserRow, REQUIRED_TABLES,
};

#[derive(Debug, Clone)]
struct RetailerRow {
    id: Uuid,
    name: String,
}

#[derive(Debug, Clone)]
struct ProductRow {
    id: Uuid,
    name: String,
    size: String,
    category: String,
}

#[derive(Debug, Clone)]
struct DealRow {
    id: Uuid,
    retailer_id: Uuid,
    product_id: Uuid,
    price: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Default)]
struct Inner {
    retailers: Vec<RetailerRow>,
    products: Vec<ProductRow>,
    deals: Vec<DealRow>,
    users: Vec<UserRow>,
    ops: u64,
    missing: HashSet<String>,
    failing: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total store operations issued so far, including failed ones.
    pub fn ops_count(&self) -> u64 {
        self.lock().ops
    }

    /// Makes every operation against `table` fail as
    /// [`StoreError::MissingTable`].
    pub fn mark_table_missing(&self, table: &str) {
        self.lock().missing.insert(table.to_string());
    }

    /// Makes every operation against `table` fail with an opaque
    /// [`StoreError::Query`].
    pub fn fail_table(&self, table: &str) {
        self.lock().failing.insert(table.to_string());
    }

    pub fn retailer_count(&self) -> usize {
        self.lock().retailers.len()
    }

    pub fn retailer_names(&self) -> Vec<String> {
        self.lock().retailers.iter().map(|r| r.name.clone()).collect()
    }

    pub fn product_count(&self) -> usize {
        self.lock().products.len()
    }

    pub fn deal_count(&self) -> usize {
        self.lock().deals.len()
    }

    /// Stored deal tuples `(retailer_id, product_id, price, start, end)` in
    /// insertion order, bypassing the operation counter.
    pub fn deal_records(&self) -> Vec<(Uuid, Uuid, String, NaiveDate, NaiveDate)> {
        self.lock()
            .deals
            .iter()
            .map(|d| {
                (
                    d.retailer_id,
                    d.product_id,
                    d.price.clone(),
                    d.start_date,
                    d.end_date,
                )
            })
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn users_snapshot(&self) -> Vec<UserRow> {
        self.lock().users.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    fn guard(inner: &mut Inner, table: &str) -> Result<(), StoreError> {
        inner.ops += 1;
        if inner.missing.contains(table) {
            return Err(StoreError::MissingTable {
                table: table.to_string(),
                message: format!("relation \"{table}\" does not exist"),
            });
        }
        if inner.failing.contains(table) {
            return Err(StoreError::Query {
                message: format!("injected failure on table '{table}'"),
                code: None,
            });
        }
        Ok(())
    }

    fn join_row(inner: &Inner, deal: &DealRow) -> DealJoinRow {
        let retailer = inner.retailers.iter().find(|r| r.id == deal.retailer_id);
        let product = inner.products.iter().find(|p| p.id == deal.product_id);
        DealJoinRow {
            id: deal.id,
            retailer_id: deal.retailer_id,
            product_id: deal.product_id,
            price: deal.price.clone(),
            start_date: deal.start_date,
            end_date: deal.end_date,
            retailer_name: retailer.map(|r| r.name.clone()),
            product_name: product.map(|p| p.name.clone()),
            product_size: product.map(|p| p.size.clone()),
            category: product.map(|p| p.category.clone()),
        }
    }

    fn cheapest_first(mut rows: Vec<DealJoinRow>, limit: i64) -> Vec<DealJoinRow> {
        rows.sort_by(|a, b| {
            let pa: f64 = a.price.parse().unwrap_or(f64::MAX);
            let pb: f64 = b.price.parse().unwrap_or(f64::MAX);
            pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
        });
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        rows
    }
}

#[async_trait]
impl DealStore for MemoryStore {
    async fn retailer_id_by_name(&self, name: &str) -> Result<Option<Uuid>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "retailers")?;
        Ok(inner.retailers.iter().find(|r| r.name == name).map(|r| r.id))
    }

    async fn insert_retailer(&self, name: &str) -> Result<Uuid, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "retailers")?;
        let id = Uuid::new_v4();
        inner.retailers.push(RetailerRow {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn product_id_by_key(
        &self,
        name: &str,
        size: &str,
        category: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "products")?;
        Ok(inner
            .products
            .iter()
            .find(|p| p.name == name && p.size == size && p.category == category)
            .map(|p| p.id))
    }

    async fn insert_product(
        &self,
        name: &str,
        size: &str,
        category: &str,
    ) -> Result<Uuid, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "products")?;
        let id = Uuid::new_v4();
        inner.products.push(ProductRow {
            id,
            name: name.to_string(),
            size: size.to_string(),
            category: category.to_string(),
        });
        Ok(id)
    }

    async fn deal_id_by_offer(
        &self,
        retailer_id: Uuid,
        product_id: Uuid,
        start_date: NaiveDate,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "deals")?;
        Ok(inner
            .deals
            .iter()
            .find(|d| {
                d.retailer_id == retailer_id
                    && d.product_id == product_id
                    && d.start_date == start_date
            })
            .map(|d| d.id))
    }

    async fn insert_deal(&self, deal: &NewDeal) -> Result<Uuid, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "deals")?;
        let id = Uuid::new_v4();
        inner.deals.push(DealRow {
            id,
            retailer_id: deal.retailer_id,
            product_id: deal.product_id,
            price: format!("{:.2}", deal.price),
            start_date: deal.start_date,
            end_date: deal.end_date,
        });
        Ok(id)
    }

    async fn top_deals(&self, limit: i64) -> Result<Vec<DealJoinRow>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "deals")?;
        let rows = inner
            .deals
            .iter()
            .map(|d| Self::join_row(&inner, d))
            .collect();
        Ok(Self::cheapest_first(rows, limit))
    }

    async fn deals_for_retailers(
        &self,
        retailer_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<DealJoinRow>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "deals")?;
        let rows = inner
            .deals
            .iter()
            .filter(|d| retailer_ids.contains(&d.retailer_id))
            .map(|d| Self::join_row(&inner, d))
            .collect();
        Ok(Self::cheapest_first(rows, limit))
    }

    async fn retailers_by_names(&self, names: &[String]) -> Result<Vec<RetailerRef>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "retailers")?;
        Ok(inner
            .retailers
            .iter()
            .filter(|r| names.contains(&r.name))
            .map(|r| RetailerRef {
                id: r.id,
                name: r.name.clone(),
            })
            .collect())
    }

    async fn user_by_name(&self, name: &str) -> Result<Option<UserRow>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "users")?;
        Ok(inner.users.iter().find(|u| u.name == name).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "users")?;
        Ok(inner.users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, seed: &UserSeed) -> Result<Uuid, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "users")?;
        let id = Uuid::new_v4();
        inner.users.push(UserRow {
            id,
            name: seed.name.clone(),
            email: seed.email.clone(),
            preferred_retailers: seed.preferred_retailers.clone(),
        });
        Ok(id)
    }

    async fn update_user_email(
        &self,
        id: Uuid,
        email: &str,
        preferred_retailers: &[String],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "users")?;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.email = email.to_string();
            user.preferred_retailers = preferred_retailers.to_vec();
        }
        Ok(())
    }

    async fn update_user_name(
        &self,
        id: Uuid,
        name: &str,
        preferred_retailers: &[String],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "users")?;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.name = name.to_string();
            user.preferred_retailers = preferred_retailers.to_vec();
        }
        Ok(())
    }

    async fn set_user_email(&self, id: Uuid, email: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "users")?;
        if let Some(user) = inner.users.iter_mut().find(|u| u.id == id) {
            user.email = email.to_string();
        }
        Ok(())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "users")?;
        inner.users.retain(|u| u.id != id);
        Ok(())
    }

    async fn all_users(&self) -> Result<Vec<UserRow>, StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, "users")?;
        Ok(inner.users.clone())
    }

    async fn probe_table(&self, table: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::guard(&mut inner, table)?;
        if REQUIRED_TABLES.contains(&table) {
            Ok(())
        } else {
            Err(StoreError::Query {
                message: format!("unknown table '{table}'"),
                code: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[tokio::test]
    async fn lookups_round_trip_inserts() {
        let store = MemoryStore::new();
        let id = store.insert_retailer("Acme").await.expect("insert");
        assert_eq!(
            store.retailer_id_by_name("Acme").await.expect("lookup"),
            Some(id)
        );
        assert_eq!(
            store.retailer_id_by_name("acme").await.expect("lookup"),
            None
        );
    }

    #[tokio::test]
    async fn top_deals_orders_by_price_and_truncates() {
        let store = MemoryStore::new();
        let retailer = store.insert_retailer("Acme").await.expect("retailer");
        let product = store
            .insert_product("Milk", "1L", "dairy")
            .await
            .expect("product");
        for (price, day) in [(4.0, 1), (2.5, 2), (3.0, 3)] {
            store
                .insert_deal(&NewDeal {
                    retailer_id: retailer,
                    product_id: product,
                    price,
                    start_date: date(2025, 9, day),
                    end_date: date(2025, 9, day + 6),
                })
                .await
                .expect("deal");
        }

        let rows = store.top_deals(2).await.expect("top deals");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].price, "2.50");
        assert_eq!(rows[1].price, "3.00");
    }

    #[tokio::test]
    async fn operations_are_counted() {
        let store = MemoryStore::new();
        assert_eq!(store.ops_count(), 0);
        let _ = store.retailer_id_by_name("Acme").await;
        let _ = store.insert_retailer("Acme").await;
        assert_eq!(store.ops_count(), 2);
    }

    #[tokio::test]
    async fn injected_faults_surface_per_table() {
        let store = MemoryStore::new();
        store.mark_table_missing("deals");
        store.fail_table("users");

        let missing = store
            .deal_id_by_offer(Uuid::new_v4(), Uuid::new_v4(), date(2025, 9, 1))
            .await
            .expect_err("deals should be missing");
        assert!(missing.is_missing_table());

        let failing = store.all_users().await.expect_err("users should fail");
        assert!(!failing.is_missing_table());

        assert!(store.retailer_id_by_name("Acme").await.is_ok());
    }
}
