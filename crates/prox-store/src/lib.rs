//! Relational-store contract for the Prox pipeline, plus its Postgres and
//! in-memory backends.
//!
//! The ingestion and digest crates only ever talk to [`DealStore`]; which
//! backend sits behind it is an orchestration decision.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use prox_core::UserSeed;
use thiserror::Error;
use uuid::Uuid;

/// Tables the pipeline reads and writes. Probed by [`missing_tables`] before
/// a run is allowed to touch them.
pub const REQUIRED_TABLES: [&str; 4] = ["retailers", "products", "deals", "users"];

/// Postgres `undefined_table`.
const UNDEFINED_TABLE_CODE: &str = "42P01";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing table has not been provisioned.
    #[error("table '{table}' does not exist: {message}")]
    MissingTable { table: String, message: String },
    /// Any other backend failure, kept opaque.
    #[error("{message}")]
    Query {
        message: String,
        code: Option<String>,
    },
}

impl StoreError {
    pub fn is_missing_table(&self) -> bool {
        matches!(self, Self::MissingTable { .. })
    }
}

/// Canonical classification of a backend failure against `table`.
///
/// Promotes the "relation does not exist" family to
/// [`StoreError::MissingTable`], matching both the vendor error code and the
/// message substrings PostgREST-style clients surface. Every call site goes
/// through this one check rather than sniffing messages locally.
pub fn classify_failure(table: &str, message: String, code: Option<String>) -> StoreError {
    let missing = code.as_deref() == Some(UNDEFINED_TABLE_CODE)
        || message.contains("does not exist")
        || message.contains("schema cache");
    if missing {
        StoreError::MissingTable {
            table: table.to_string(),
            message,
        }
    } else {
        StoreError::Query { message, code }
    }
}

/// Insert payload for a deal whose retailer and product have already been
/// resolved to ids.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeal {
    pub retailer_id: Uuid,
    pub product_id: Uuid,
    pub price: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Deal row joined against retailers and products.
///
/// Joined columns stay optional: a dangling reference must not sink the whole
/// query, so defaulting is left to the read side. `price` is the decimal text
/// exactly as stored; it is parsed to a float only at the presentation edge.
#[derive(Debug, Clone, PartialEq)]
pub struct DealJoinRow {
    pub id: Uuid,
    pub retailer_id: Uuid,
    pub product_id: Uuid,
    pub price: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub retailer_name: Option<String>,
    pub product_name: Option<String>,
    pub product_size: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub preferred_retailers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetailerRef {
    pub id: Uuid,
    pub name: String,
}

/// Narrow read/write contract over the four-table schema.
///
/// Lookup-then-insert callers (see `prox-ingest`) are not atomic across these
/// methods; the UNIQUE constraints in the schema are the authoritative
/// backstop and the application-level checks are a fast path only.
#[async_trait]
pub trait DealStore: Send + Sync {
    async fn retailer_id_by_name(&self, name: &str) -> Result<Option<Uuid>, StoreError>;
    async fn insert_retailer(&self, name: &str) -> Result<Uuid, StoreError>;

    async fn product_id_by_key(
        &self,
        name: &str,
        size: &str,
        category: &str,
    ) -> Result<Option<Uuid>, StoreError>;
    async fn insert_product(
        &self,
        name: &str,
        size: &str,
        category: &str,
    ) -> Result<Uuid, StoreError>;

    /// Looks a deal up by its dedup triple `(retailer, product, start_date)`.
    async fn deal_id_by_offer(
        &self,
        retailer_id: Uuid,
        product_id: Uuid,
        start_date: NaiveDate,
    ) -> Result<Option<Uuid>, StoreError>;
    async fn insert_deal(&self, deal: &NewDeal) -> Result<Uuid, StoreError>;

    /// All deals joined with retailer/product, cheapest first, truncated to
    /// `limit`.
    async fn top_deals(&self, limit: i64) -> Result<Vec<DealJoinRow>, StoreError>;
    /// Same shape as [`DealStore::top_deals`], restricted to the given
    /// retailer ids.
    async fn deals_for_retailers(
        &self,
        retailer_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<DealJoinRow>, StoreError>;
    /// Exact set-membership lookup of retailers by name.
    async fn retailers_by_names(&self, names: &[String]) -> Result<Vec<RetailerRef>, StoreError>;

    async fn user_by_name(&self, name: &str) -> Result<Option<UserRow>, StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError>;
    async fn insert_user(&self, seed: &UserSeed) -> Result<Uuid, StoreError>;
    /// Sets email and preferences on an existing row, leaving the name alone.
    async fn update_user_email(
        &self,
        id: Uuid,
        email: &str,
        preferred_retailers: &[String],
    ) -> Result<(), StoreError>;
    /// Sets name and preferences on an existing row, leaving the email alone.
    async fn update_user_name(
        &self,
        id: Uuid,
        name: &str,
        preferred_retailers: &[String],
    ) -> Result<(), StoreError>;
    /// Rewrites only the email column.
    async fn set_user_email(&self, id: Uuid, email: &str) -> Result<(), StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError>;
    async fn all_users(&self) -> Result<Vec<UserRow>, StoreError>;

    /// Cheap existence probe used by the schema precondition check.
    async fn probe_table(&self, table: &str) -> Result<(), StoreError>;
}

/// Probes every required table and returns the subset that is missing.
///
/// A probe failing for any reason other than an absent table propagates as an
/// error rather than passing the check.
pub async fn missing_tables(store: &dyn DealStore) -> Result<Vec<String>, StoreError> {
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        match store.probe_table(table).await {
            Ok(()) => {}
            Err(err) if err.is_missing_table() => missing.push(table.to_string()),
            Err(err) => return Err(err),
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_table_code_classifies_as_missing() {
        let err = classify_failure(
            "retailers",
            "something went wrong".to_string(),
            Some("42P01".to_string()),
        );
        assert!(err.is_missing_table());
    }

    #[test]
    fn does_not_exist_message_classifies_as_missing() {
        let err = classify_failure(
            "products",
            "relation \"products\" does not exist".to_string(),
            None,
        );
        match err {
            StoreError::MissingTable { table, .. } => assert_eq!(table, "products"),
            other => panic!("expected MissingTable, got {other:?}"),
        }
    }

    #[test]
    fn schema_cache_message_classifies_as_missing() {
        let err = classify_failure(
            "deals",
            "could not find the table in the schema cache".to_string(),
            None,
        );
        assert!(err.is_missing_table());
    }

    #[test]
    fn other_failures_stay_opaque() {
        let err = classify_failure(
            "deals",
            "duplicate key value violates unique constraint".to_string(),
            Some("23505".to_string()),
        );
        assert!(!err.is_missing_table());
        match err {
            StoreError::Query { code, .. } => assert_eq!(code.as_deref(), Some("23505")),
            other => panic!("expected Query, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_tables_reports_only_absent_tables() {
        let store = MemoryStore::new();
        store.mark_table_missing("deals");
        store.mark_table_missing("users");

        let missing = missing_tables(&store).await.expect("probe should succeed");
        assert_eq!(missing, vec!["deals".to_string(), "users".to_string()]);
    }

    #[tokio::test]
    async fn missing_tables_is_empty_on_healthy_schema() {
        let store = MemoryStore::new();
        let missing = missing_tables(&store).await.expect("probe should succeed");
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn missing_tables_propagates_unrelated_probe_failures() {
        let store = MemoryStore::new();
        store.fail_table("products");
        assert!(missing_tables(&store).await.is_err());
    }
}
