//! Read side of the pipeline: deal queries, digest rendering, and the
//! outbound mail client.

pub mod mail;
pub mod render;

use std::sync::Arc;

use prox_core::{Deal, User};
use prox_store::{DealJoinRow, DealStore, StoreError};
use thiserror::Error;
use uuid::Uuid;

/// Deals shown per digest when the caller does not say otherwise.
pub const DEFAULT_DEAL_LIMIT: i64 = 6;

#[derive(Debug, Error)]
pub enum DigestError {
    /// A read query failed. Not retried.
    #[error("failed to fetch {entity}: {message}")]
    Fetch {
        entity: &'static str,
        message: String,
    },
    /// A stored price did not parse as a decimal number.
    #[error("deal {id} has non-numeric price '{raw}'")]
    BadPrice { id: Uuid, raw: String },
}

fn fetch_error(entity: &'static str, err: StoreError) -> DigestError {
    DigestError::Fetch {
        entity,
        message: err.to_string(),
    }
}

/// Composes the read queries the digests are built from.
pub struct DealsReader {
    store: Arc<dyn DealStore>,
}

impl DealsReader {
    pub fn new(store: Arc<dyn DealStore>) -> Self {
        Self { store }
    }

    /// The cheapest `limit` deals across all retailers.
    pub async fn top_deals(&self, limit: i64) -> Result<Vec<Deal>, DigestError> {
        let rows = self
            .store
            .top_deals(limit)
            .await
            .map_err(|e| fetch_error("deals", e))?;
        rows.into_iter().map(flatten_row).collect()
    }

    /// The cheapest `limit` deals among the named retailers.
    ///
    /// Retailer names resolve to ids first; when none match, the result is an
    /// empty list and the deals table is never queried. That short-circuit is
    /// deliberate, not an error.
    pub async fn deals_for_retailers(
        &self,
        retailer_names: &[String],
        limit: i64,
    ) -> Result<Vec<Deal>, DigestError> {
        let retailers = self
            .store
            .retailers_by_names(retailer_names)
            .await
            .map_err(|e| fetch_error("retailers", e))?;
        if retailers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = retailers.iter().map(|r| r.id).collect();
        let rows = self
            .store
            .deals_for_retailers(&ids, limit)
            .await
            .map_err(|e| fetch_error("deals", e))?;
        rows.into_iter().map(flatten_row).collect()
    }

    /// Every subscriber, verbatim. Absent data is an empty list, never null.
    pub async fn all_users(&self) -> Result<Vec<User>, DigestError> {
        let rows = self
            .store
            .all_users()
            .await
            .map_err(|e| fetch_error("users", e))?;
        Ok(rows
            .into_iter()
            .map(|row| User {
                id: row.id,
                name: row.name,
                email: row.email,
                preferred_retailers: row.preferred_retailers,
            })
            .collect())
    }
}

/// Flattens a joined row, defaulting absent joins ("Unknown" names, empty
/// size/category) and parsing the decimal price text.
fn flatten_row(row: DealJoinRow) -> Result<Deal, DigestError> {
    let price: f64 = row.price.trim().parse().map_err(|_| DigestError::BadPrice {
        id: row.id,
        raw: row.price.clone(),
    })?;
    Ok(Deal {
        id: row.id,
        retailer_id: row.retailer_id,
        product_id: row.product_id,
        price,
        start_date: row.start_date,
        end_date: row.end_date,
        retailer_name: row.retailer_name.unwrap_or_else(|| "Unknown".to_string()),
        product_name: row.product_name.unwrap_or_else(|| "Unknown".to_string()),
        product_size: row.product_size.unwrap_or_default(),
        category: row.category.unwrap_or_default(),
    })
}
