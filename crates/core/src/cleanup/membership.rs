//! Group membership changes with their cleanup run inline.

use std::sync::Arc;

use serde::Serialize;
use stockroom_shared::types::{GroupId, ProductId};
use tracing::info;

use super::{CleanupOutcome, CleanupService, GroupCleanupReport};
use crate::stock::{StockError, StockStore};

/// Result of removing a product from a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipRemoval {
    /// The product.
    pub product_id: ProductId,
    /// The group.
    pub group_id: GroupId,
    /// False if the product was not a member of the group.
    pub edge_removed: bool,
    /// What cleanup did with the product.
    #[serde(flatten)]
    pub outcome: CleanupOutcome,
}

/// Grouping boundary: every change that can orphan a product goes through here.
///
/// Cleanup runs synchronously after the membership change commits, so the
/// caller sees the final state when the call returns.
pub struct GroupMembershipService<S> {
    store: Arc<S>,
    cleanup: CleanupService<S>,
}

impl<S> Clone for GroupMembershipService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cleanup: self.cleanup.clone(),
        }
    }
}

impl<S: StockStore> GroupMembershipService<S> {
    /// Creates the service over a shared store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            cleanup: CleanupService::new(Arc::clone(&store)),
            store,
        }
    }

    /// Removes a product from a group, then deletes the product if that was its
    /// last group.
    ///
    /// Removing an edge that does not exist still re-checks the product.
    ///
    /// # Errors
    ///
    /// - `ProductNotFound` if the edge did not exist and neither does the product.
    /// - `LockTimeout`, `Contention` or `Storage` on infrastructure failure.
    pub async fn remove_membership(
        &self,
        product_id: ProductId,
        group_id: GroupId,
    ) -> Result<MembershipRemoval, StockError> {
        let edge_removed = self.store.remove_membership(product_id, group_id).await?;

        if !edge_removed && self.store.find_product(product_id).await?.is_none() {
            return Err(StockError::ProductNotFound(product_id));
        }
        if edge_removed {
            info!(product_id = %product_id, group_id = %group_id, "Product removed from group");
        }

        let outcome = self.cleanup.on_membership_removed(product_id).await?;

        Ok(MembershipRemoval {
            product_id,
            group_id,
            edge_removed,
            outcome,
        })
    }

    /// Deletes a group, cascading to products left without any group.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout`, `Contention` or `Storage` on infrastructure failure.
    pub async fn delete_group(&self, group_id: GroupId) -> Result<GroupCleanupReport, StockError> {
        self.cleanup.on_group_deleted(group_id).await
    }

    /// Returns the cleanup service.
    #[must_use]
    pub const fn cleanup(&self) -> &CleanupService<S> {
        &self.cleanup
    }
}
