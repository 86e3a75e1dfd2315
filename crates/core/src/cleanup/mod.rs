//! Relationship cleanup: a product with no group membership is deleted.
//!
//! Every check runs under the product row lock, so calling any operation again
//! is always safe and a second call finds nothing left to do.

pub mod membership;


use std::sync::Arc;

use serde::Serialize;
use stockroom_shared::types::{GroupId, ProductId};
use tracing::{debug, info};

use crate::stock::{StockError, StockStore, StockTx};

pub use membership::{GroupMembershipService, MembershipRemoval};

/// What happened to a product after one of its memberships went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// The product had no membership left and was deleted with its movements.
    Deleted,
    /// The product still belongs to at least one group.
    Retained {
        /// Remaining membership count.
        memberships: u64,
    },
    /// The product no longer existed.
    AlreadyGone,
}

/// Result of deleting a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCleanupReport {
    /// The group.
    pub group_id: GroupId,
    /// False when the group did not exist.
    pub group_deleted: bool,
    /// Members deleted because this group was their last one.
    pub deleted_products: Vec<ProductId>,
    /// Members kept because they belong to another group.
    pub retained_products: Vec<ProductId>,
}

impl GroupCleanupReport {
    const fn missing(group_id: GroupId) -> Self {
        Self {
            group_id,
            group_deleted: false,
            deleted_products: Vec::new(),
            retained_products: Vec::new(),
        }
    }
}

/// Deletes products that lost their last group membership.
pub struct CleanupService<S> {
    store: Arc<S>,
}

impl<S> Clone for CleanupService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: StockStore> CleanupService<S> {
    /// Creates a cleanup service over a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Re-checks a product after one of its memberships was removed.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout`, `Contention` or `Storage` on infrastructure failure.
    pub async fn on_membership_removed(
        &self,
        product_id: ProductId,
    ) -> Result<CleanupOutcome, StockError> {
        let mut tx = self.store.begin().await?;

        if tx.lock_product(product_id).await?.is_none() {
            tx.rollback().await?;
            debug!(product_id = %product_id, "Cleanup skipped, product already gone");
            return Ok(CleanupOutcome::AlreadyGone);
        }

        let memberships = tx.membership_count(product_id, None).await?;
        if memberships > 0 {
            tx.rollback().await?;
            debug!(product_id = %product_id, memberships, "Product retained");
            return Ok(CleanupOutcome::Retained { memberships });
        }

        tx.delete_product(product_id).await?;
        tx.commit().await?;

        info!(product_id = %product_id, "Orphaned product deleted");
        Ok(CleanupOutcome::Deleted)
    }

    /// Deletes a group and every member product with no other membership.
    ///
    /// Member rows are locked in ascending id order. A missing group is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout`, `Contention` or `Storage` on infrastructure failure;
    /// nothing is deleted in that case.
    pub async fn on_group_deleted(
        &self,
        group_id: GroupId,
    ) -> Result<GroupCleanupReport, StockError> {
        let mut tx = self.store.begin().await?;

        let Some(mut members) = tx.group_members(group_id).await? else {
            tx.rollback().await?;
            debug!(group_id = %group_id, "Group already gone");
            return Ok(GroupCleanupReport::missing(group_id));
        };
        members.sort_unstable();

        let mut deleted_products = Vec::new();
        let mut retained_products = Vec::new();

        for product_id in members {
            if tx.lock_product(product_id).await?.is_none() {
                continue;
            }
            if tx.membership_count(product_id, Some(group_id)).await? == 0 {
                tx.delete_product(product_id).await?;
                deleted_products.push(product_id);
            } else {
                retained_products.push(product_id);
            }
        }

        let group_deleted = tx.delete_group(group_id).await?;
        tx.commit().await?;

        info!(
            group_id = %group_id,
            deleted = deleted_products.len(),
            retained = retained_products.len(),
            "Group deleted"
        );

        Ok(GroupCleanupReport {
            group_id,
            group_deleted,
            deleted_products,
            retained_products,
        })
    }
}
