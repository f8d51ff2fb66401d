//! Postgres [`DealStore`] backend over a sqlx connection pool.

use async_trait::async_trait;
use chrono::NaiveDate;
use prox_core::UserSeed;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    classify_failure, DealJoinRow, DealStore, NewDeal, RetailerRef, StoreError, UserRow,
    REQUIRED_TABLES,
};

const DEAL_JOIN_SELECT: &str = "\
SELECT d.id, d.retailer_id, d.product_id, d.price::text AS price, \
       d.start_date, d.end_date, \
       r.name AS retailer_name, \
       p.name AS product_name, p.size AS product_size, p.category \
  FROM deals d \
  LEFT JOIN retailers r ON r.id = d.retailer_id \
  LEFT JOIN products p ON p.id = d.product_id";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|err| StoreError::Query {
                message: format!("connecting to database: {err}"),
                code: None,
            })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        tracing::info!("applying schema migrations");
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Query {
                message: format!("running migrations: {err}"),
                code: None,
            })
    }

    fn map_err(table: &str, err: sqlx::Error) -> StoreError {
        let code = match &err {
            sqlx::Error::Database(db) => db.code().map(|c| c.to_string()),
            _ => None,
        };
        classify_failure(table, err.to_string(), code)
    }

    fn deal_join_row(row: &sqlx::postgres::PgRow) -> Result<DealJoinRow, sqlx::Error> {
        Ok(DealJoinRow {
            id: row.try_get("id")?,
            retailer_id: row.try_get("retailer_id")?,
            product_id: row.try_get("product_id")?,
            price: row.try_get("price")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            retailer_name: row.try_get("retailer_name")?,
            product_name: row.try_get("product_name")?,
            product_size: row.try_get("product_size")?,
            category: row.try_get("category")?,
        })
    }

    fn user_row(row: &sqlx::postgres::PgRow) -> Result<UserRow, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            preferred_retailers: row.try_get("preferred_retailers")?,
        })
    }
}

#[async_trait]
impl DealStore for PgStore {
    async fn retailer_id_by_name(&self, name: &str) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query("SELECT id FROM retailers WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::map_err("retailers", e))?;
        row.map(|r| r.try_get("id"))
            .transpose()
            .map_err(|e| Self::map_err("retailers", e))
    }

    async fn insert_retailer(&self, name: &str) -> Result<Uuid, StoreError> {
        sqlx::query("INSERT INTO retailers (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .and_then(|r| r.try_get("id"))
            .map_err(|e| Self::map_err("retailers", e))
    }

    async fn product_id_by_key(
        &self,
        name: &str,
        size: &str,
        category: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let row =
            sqlx::query("SELECT id FROM products WHERE name = $1 AND size = $2 AND category = $3")
                .bind(name)
                .bind(size)
                .bind(category)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Self::map_err("products", e))?;
        row.map(|r| r.try_get("id"))
            .transpose()
            .map_err(|e| Self::map_err("products", e))
    }

    async fn insert_product(
        &self,
        name: &str,
        size: &str,
        category: &str,
    ) -> Result<Uuid, StoreError> {
        sqlx::query("INSERT INTO products (name, size, category) VALUES ($1, $2, $3) RETURNING id")
            .bind(name)
            .bind(size)
            .bind(category)
            .fetch_one(&self.pool)
            .await
            .and_then(|r| r.try_get("id"))
            .map_err(|e| Self::map_err("products", e))
    }

    async fn deal_id_by_offer(
        &self,
        retailer_id: Uuid,
        product_id: Uuid,
        start_date: NaiveDate,
    ) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query(
            "SELECT id FROM deals WHERE retailer_id = $1 AND product_id = $2 AND start_date = $3",
        )
        .bind(retailer_id)
        .bind(product_id)
        .bind(start_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_err("deals", e))?;
        row.map(|r| r.try_get("id"))
            .transpose()
            .map_err(|e| Self::map_err("deals", e))
    }

    async fn insert_deal(&self, deal: &NewDeal) -> Result<Uuid, StoreError> {
        sqlx::query(
            "INSERT INTO deals (retailer_id, product_id, price, start_date, end_date) \
             VALUES ($1, $2, $3::numeric, $4, $5) RETURNING id",
        )
        .bind(deal.retailer_id)
        .bind(deal.product_id)
        .bind(deal.price.to_string())
        .bind(deal.start_date)
        .bind(deal.end_date)
        .fetch_one(&self.pool)
        .await
        .and_then(|r| r.try_get("id"))
        .map_err(|e| Self::map_err("deals", e))
    }

    async fn top_deals(&self, limit: i64) -> Result<Vec<DealJoinRow>, StoreError> {
        let sql = format!("{DEAL_JOIN_SELECT} ORDER BY d.price ASC LIMIT $1");
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::map_err("deals", e))?;
        rows.iter()
            .map(Self::deal_join_row)
            .collect::<Result<_, _>>()
            .map_err(|e| Self::map_err("deals", e))
    }

    async fn deals_for_retailers(
        &self,
        retailer_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<DealJoinRow>, StoreError> {
        let sql =
            format!("{DEAL_JOIN_SELECT} WHERE d.retailer_id = ANY($1) ORDER BY d.price ASC LIMIT $2");
        let rows = sqlx::query(&sql)
            .bind(retailer_ids.to_vec())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::map_err("deals", e))?;
        rows.iter()
            .map(Self::deal_join_row)
            .collect::<Result<_, _>>()
            .map_err(|e| Self::map_err("deals", e))
    }

    async fn retailers_by_names(&self, names: &[String]) -> Result<Vec<RetailerRef>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM retailers WHERE name = ANY($1)")
            .bind(names.to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::map_err("retailers", e))?;
        rows.iter()
            .map(|r| {
                Ok(RetailerRef {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(|e| Self::map_err("retailers", e))
    }

    async fn user_by_name(&self, name: &str) -> Result<Option<UserRow>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, email, preferred_retailers FROM users WHERE name = $1 LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_err("users", e))?;
        row.as_ref()
            .map(Self::user_row)
            .transpose()
            .map_err(|e| Self::map_err("users", e))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, email, preferred_retailers FROM users WHERE email = $1 LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_err("users", e))?;
        row.as_ref()
            .map(Self::user_row)
            .transpose()
            .map_err(|e| Self::map_err("users", e))
    }

    async fn insert_user(&self, seed: &UserSeed) -> Result<Uuid, StoreError> {
        sqlx::query(
            "INSERT INTO users (name, email, preferred_retailers) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&seed.name)
        .bind(&seed.email)
        .bind(&seed.preferred_retailers)
        .fetch_one(&self.pool)
        .await
        .and_then(|r| r.try_get("id"))
        .map_err(|e| Self::map_err("users", e))
    }

    async fn update_user_email(
        &self,
        id: Uuid,
        email: &str,
        preferred_retailers: &[String],
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET email = $2, preferred_retailers = $3 WHERE id = $1")
            .bind(id)
            .bind(email)
            .bind(preferred_retailers.to_vec())
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_err("users", e))
    }

    async fn update_user_name(
        &self,
        id: Uuid,
        name: &str,
        preferred_retailers: &[String],
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET name = $2, preferred_retailers = $3 WHERE id = $1")
            .bind(id)
            .bind(name)
            .bind(preferred_retailers.to_vec())
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_err("users", e))
    }

    async fn set_user_email(&self, id: Uuid, email: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET email = $2 WHERE id = $1")
            .bind(id)
            .bind(email)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_err("users", e))
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_err("users", e))
    }

    async fn all_users(&self) -> Result<Vec<UserRow>, StoreError> {
        let rows = sqlx::query("SELECT id, name, email, preferred_retailers FROM users")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::map_err("users", e))?;
        rows.iter()
            .map(Self::user_row)
            .collect::<Result<_, _>>()
            .map_err(|e| Self::map_err("users", e))
    }

    async fn probe_table(&self, table: &str) -> Result<(), StoreError> {
        if !REQUIRED_TABLES.contains(&table) {
            return Err(StoreError::Query {
                message: format!("unknown table '{table}'"),
                code: None,
            });
        }
        // Table names cannot be bound as parameters; `table` is restricted to
        // the fixed REQUIRED_TABLES set above.
        let sql = format!("SELECT 1 FROM {table} LIMIT 1");
        sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_err(table, e))
    }
}
