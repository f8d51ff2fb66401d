//! Subscriber roster reconciliation.
//!
//! Neither name nor email is an authoritative key for a subscriber, so each
//! seed is matched against the users table by both and the outcome reduced to
//! one of four actions. The decision itself is a pure function; the store
//! writes happen afterwards.

use std::sync::Arc;

use prox_core::UserSeed;
use prox_store::{DealStore, StoreError, UserRow};
use tracing::{error, info};
use uuid::Uuid;

/// The single action chosen for one seed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// No row matches either key: insert a fresh subscriber.
    Create,
    /// A row matches the seed's name and no *distinct* row owns the email:
    /// update that row's email and preferences in place.
    UpdateByName { id: Uuid },
    /// Only the email matches: treat it as the identity anchor and rename the
    /// row in place.
    UpdateByEmail { id: Uuid },
    /// Name and email match different rows. The name match wins; the row that
    /// merely shares the new email is assumed stale and is deleted before the
    /// surviving row is updated.
    ResolveConflict { keep: Uuid, evict: Uuid },
}

/// Pure decision table over the rows found by name and by email.
pub fn decide(by_name: Option<&UserRow>, by_email: Option<&UserRow>) -> ReconcileAction {
    match (by_name, by_email) {
        (None, None) => ReconcileAction::Create,
        (Some(named), None) => ReconcileAction::UpdateByName { id: named.id },
        (Some(named), Some(mailed)) if named.id == mailed.id => {
            ReconcileAction::UpdateByName { id: named.id }
        }
        (Some(named), Some(mailed)) => ReconcileAction::ResolveConflict {
            keep: named.id,
            evict: mailed.id,
        },
        (None, Some(mailed)) => ReconcileAction::UpdateByEmail { id: mailed.id },
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub conflicts_resolved: usize,
    pub failed: usize,
}

/// Merges seed batches into the users table, best-effort per record.
pub struct Reconciler {
    store: Arc<dyn DealStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DealStore>) -> Self {
        Self { store }
    }

    /// Reconciles seeds strictly in input order; later records observe the
    /// effects of earlier ones. A failing record is logged and skipped so a
    /// bad entry never blocks the rest of the roster. An empty batch performs
    /// no store operations.
    pub async fn reconcile(&self, seeds: &[UserSeed]) -> ReconcileSummary {
        if seeds.is_empty() {
            return ReconcileSummary::default();
        }

        info!(count = seeds.len(), "reconciling subscriber roster");
        let mut summary = ReconcileSummary::default();
        for seed in seeds {
            match self.reconcile_one(seed).await {
                Ok(ReconcileAction::Create) => {
                    info!(user = %seed.name, email = %seed.email, "created subscriber");
                    summary.created += 1;
                }
                Ok(ReconcileAction::UpdateByName { .. })
                | Ok(ReconcileAction::UpdateByEmail { .. }) => {
                    info!(user = %seed.name, email = %seed.email, "updated subscriber");
                    summary.updated += 1;
                }
                Ok(ReconcileAction::ResolveConflict { .. }) => {
                    info!(user = %seed.name, email = %seed.email, "resolved subscriber conflict");
                    summary.conflicts_resolved += 1;
                }
                Err(err) => {
                    error!(user = %seed.name, error = %err, "failed to reconcile subscriber");
                    summary.failed += 1;
                }
            }
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            conflicts = summary.conflicts_resolved,
            failed = summary.failed,
            "roster reconciliation complete"
        );
        summary
    }

    async fn reconcile_one(&self, seed: &UserSeed) -> Result<ReconcileAction, StoreError> {
        let by_name = self.store.user_by_name(&seed.name).await?;
        let by_email = self.store.user_by_email(&seed.email).await?;
        let action = decide(by_name.as_ref(), by_email.as_ref());

        match action {
            ReconcileAction::Create => {
                self.store.insert_user(seed).await?;
            }
            ReconcileAction::UpdateByName { id } => {
                self.store
                    .update_user_email(id, &seed.email, &seed.preferred_retailers)
                    .await?;
            }
            ReconcileAction::UpdateByEmail { id } => {
                self.store
                    .update_user_name(id, &seed.name, &seed.preferred_retailers)
                    .await?;
            }
            ReconcileAction::ResolveConflict { keep, evict } => {
                info!(email = %seed.email, "removing subscriber with conflicting email");
                self.store.delete_user(evict).await?;
                self.store
                    .update_user_email(keep, &seed.email, &seed.preferred_retailers)
                    .await?;
            }
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prox_store::MemoryStore;

    fn seed(name: &str, email: &str) -> UserSeed {
        UserSeed {
            name: name.to_string(),
            email: email.to_string(),
            preferred_retailers: vec!["Acme".to_string()],
        }
    }

    fn row(name: &str, email: &str) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            preferred_retailers: Vec::new(),
        }
    }

    fn harness() -> (Arc<MemoryStore>, Reconciler) {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());
        (store, reconciler)
    }

    #[test]
    fn decision_table_covers_all_four_actions() {
        let alice = row("Alice", "old@x");
        let bob = row("Bob", "new@x");

        assert_eq!(decide(None, None), ReconcileAction::Create);
        assert_eq!(
            decide(Some(&alice), None),
            ReconcileAction::UpdateByName { id: alice.id }
        );
        assert_eq!(
            decide(None, Some(&bob)),
            ReconcileAction::UpdateByEmail { id: bob.id }
        );
        assert_eq!(
            decide(Some(&alice), Some(&bob)),
            ReconcileAction::ResolveConflict {
                keep: alice.id,
                evict: bob.id
            }
        );
    }

    #[test]
    fn same_row_matching_both_keys_is_a_plain_update() {
        let alice = row("Alice", "alice@x");
        assert_eq!(
            decide(Some(&alice), Some(&alice)),
            ReconcileAction::UpdateByName { id: alice.id }
        );
    }

    #[tokio::test]
    async fn unknown_seed_creates_a_subscriber() {
        let (store, reconciler) = harness();
        let summary = reconciler.reconcile(&[seed("Alice", "alice@x")]).await;

        assert_eq!(summary.created, 1);
        let users = store.users_snapshot();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Alice");
        assert_eq!(users[0].email, "alice@x");
        assert_eq!(users[0].preferred_retailers, vec!["Acme".to_string()]);
    }

    #[tokio::test]
    async fn name_match_updates_email_in_place() {
        let (store, reconciler) = harness();
        store
            .insert_user(&seed("Alice", "old@x"))
            .await
            .expect("existing row");

        let summary = reconciler.reconcile(&[seed("Alice", "new@x")]).await;

        assert_eq!(summary.updated, 1);
        let users = store.users_snapshot();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Alice");
        assert_eq!(users[0].email, "new@x");
    }

    #[tokio::test]
    async fn email_match_updates_name_in_place() {
        let (store, reconciler) = harness();
        let id = store
            .insert_user(&seed("Old Name", "shared@x"))
            .await
            .expect("existing row");

        let summary = reconciler.reconcile(&[seed("New Name", "shared@x")]).await;

        assert_eq!(summary.updated, 1);
        let users = store.users_snapshot();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, id);
        assert_eq!(users[0].name, "New Name");
        assert_eq!(users[0].email, "shared@x");
    }

    #[tokio::test]
    async fn conflicting_sibling_is_deleted_and_name_match_keeps_the_email() {
        let (store, reconciler) = harness();
        store
            .insert_user(&seed("Alice", "old@x"))
            .await
            .expect("alice");
        store
            .insert_user(&seed("Bob", "new@x"))
            .await
            .expect("bob");

        let summary = reconciler.reconcile(&[seed("Alice", "new@x")]).await;

        assert_eq!(summary.conflicts_resolved, 1);
        let users = store.users_snapshot();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Alice");
        assert_eq!(users[0].email, "new@x");
    }

    #[tokio::test]
    async fn later_records_see_earlier_effects() {
        let (store, reconciler) = harness();
        let summary = reconciler
            .reconcile(&[seed("Alice", "first@x"), seed("Alice", "second@x")])
            .await;

        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        let users = store.users_snapshot();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "second@x");
    }

    #[tokio::test]
    async fn record_failures_are_isolated() {
        let (store, reconciler) = harness();
        store.fail_table("users");

        let summary = reconciler
            .reconcile(&[seed("Alice", "alice@x"), seed("Bob", "bob@x")])
            .await;

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.created, 0);
    }

    #[tokio::test]
    async fn empty_roster_touches_nothing() {
        let (store, reconciler) = harness();
        let summary = reconciler.reconcile(&[]).await;
        assert_eq!(summary, ReconcileSummary::default());
        assert_eq!(store.ops_count(), 0);
    }
}
