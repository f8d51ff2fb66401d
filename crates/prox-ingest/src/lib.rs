//! Batch ingestion pipeline: identity resolution for retailers/products,
//! deal deduplication, and subscriber-roster reconciliation.
//!
//! The pipeline is at-least-once and idempotent: re-running it over the same
//! input leaves the store unchanged apart from log output.

mod reconcile;

pub use reconcile::{decide, ReconcileAction, ReconcileSummary, Reconciler};

use std::sync::Arc;

use prox_core::DealDraft;
use prox_store::{DealStore, NewDeal, StoreError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    /// A required table is absent. Fatal; the schema has to be provisioned
    /// before ingestion can run.
    #[error("table '{table}' does not exist; run `prox migrate` to provision the schema (store said: {message})")]
    SchemaMissing { table: String, message: String },
    /// Retailer or product identity resolution failed for a reason other
    /// than a missing table. Fatal for the batch.
    #[error("failed to create {entity}: {message}")]
    CreateFailed {
        entity: &'static str,
        message: String,
    },
    /// The deal write (or its dedup lookup) failed. Fatal for the batch:
    /// duplicates are soft, write failures are hard stops.
    #[error("failed to insert deal: {message}")]
    InsertFailed { message: String },
}

fn resolve_error(entity: &'static str, err: StoreError) -> IngestError {
    match err {
        StoreError::MissingTable { table, message } => {
            IngestError::SchemaMissing { table, message }
        }
        other => IngestError::CreateFailed {
            entity,
            message: other.to_string(),
        },
    }
}

fn deal_error(err: StoreError) -> IngestError {
    match err {
        StoreError::MissingTable { table, message } => {
            IngestError::SchemaMissing { table, message }
        }
        other => IngestError::InsertFailed {
            message: other.to_string(),
        },
    }
}

/// Outcome of a single deal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealOutcome {
    Inserted,
    /// The dedup triple already had a row; the existing row is kept verbatim.
    Skipped,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Resolves entities and writes deals through the store contract.
pub struct Ingestor {
    store: Arc<dyn DealStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn DealStore>) -> Self {
        Self { store }
    }

    /// Returns the id for `name`, inserting the retailer on first reference.
    ///
    /// Lookup-then-insert is not atomic: a concurrent run can insert the same
    /// name between the two calls. The schema's UNIQUE constraint is the
    /// backstop; this check only keeps the common path cheap. Names compare
    /// exactly, with no case or whitespace normalization.
    async fn resolve_retailer(&self, name: &str) -> Result<Uuid, IngestError> {
        if let Some(id) = self
            .store
            .retailer_id_by_name(name)
            .await
            .map_err(|e| resolve_error("retailer", e))?
        {
            return Ok(id);
        }
        self.store
            .insert_retailer(name)
            .await
            .map_err(|e| resolve_error("retailer", e))
    }

    /// Returns the id for the `(name, size, category)` triple, inserting the
    /// product on first reference. Same non-atomicity caveat as
    /// [`Ingestor::resolve_retailer`].
    async fn resolve_product(
        &self,
        name: &str,
        size: &str,
        category: &str,
    ) -> Result<Uuid, IngestError> {
        if let Some(id) = self
            .store
            .product_id_by_key(name, size, category)
            .await
            .map_err(|e| resolve_error("product", e))?
        {
            return Ok(id);
        }
        self.store
            .insert_product(name, size, category)
            .await
            .map_err(|e| resolve_error("product", e))
    }

    /// Ingests one deal record: resolve ids, then skip-if-exists on the
    /// `(retailer, product, start_date)` triple. A duplicate keeps the stored
    /// row verbatim even when the new submission carries a different price or
    /// end date.
    pub async fn ingest_one(&self, draft: &DealDraft) -> Result<DealOutcome, IngestError> {
        let retailer_id = self.resolve_retailer(&draft.retailer).await?;
        let product_id = self
            .resolve_product(&draft.product, &draft.size, &draft.category)
            .await?;

        let existing = self
            .store
            .deal_id_by_offer(retailer_id, product_id, draft.start)
            .await
            .map_err(deal_error)?;
        if existing.is_some() {
            info!(
                retailer = %draft.retailer,
                product = %draft.product,
                start = %draft.start,
                "deal already exists, skipping"
            );
            return Ok(DealOutcome::Skipped);
        }

        self.store
            .insert_deal(&NewDeal {
                retailer_id,
                product_id,
                price: draft.price,
                start_date: draft.start,
                end_date: draft.end,
            })
            .await
            .map_err(deal_error)?;

        info!(
            retailer = %draft.retailer,
            product = %draft.product,
            price = draft.price,
            "ingested deal"
        );
        Ok(DealOutcome::Inserted)
    }

    /// Ingests a batch strictly in input order.
    ///
    /// Duplicates are logged and skipped; any write failure aborts the rest
    /// of the batch. An empty batch performs no store operations at all.
    pub async fn ingest_batch(&self, drafts: &[DealDraft]) -> Result<IngestSummary, IngestError> {
        if drafts.is_empty() {
            return Ok(IngestSummary::default());
        }

        info!(count = drafts.len(), "starting deal ingestion");
        let mut summary = IngestSummary::default();
        for draft in drafts {
            match self.ingest_one(draft).await? {
                DealOutcome::Inserted => summary.inserted += 1,
                DealOutcome::Skipped => summary.skipped += 1,
            }
        }
        info!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            "deal ingestion complete"
        );
        Ok(summary)
    }
}
