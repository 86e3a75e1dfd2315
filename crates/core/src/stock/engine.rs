//! Stock ledger engine: apply, reverse and edit under a product row lock.
//!
//! Every operation runs as one store transaction:
//! 1. Validate the request (no lock taken for invalid input)
//! 2. Lock the product row
//! 3. Read the quantity under the lock and plan the change
//! 4. Persist quantity and movement log together, then commit
//!
//! Any early return drops the transaction, which rolls it back and releases
//! the lock.

use std::sync::Arc;

use chrono::Utc;
use stockroom_shared::types::{MovementId, ProductId};
use tracing::{info, warn};

use super::error::StockError;
use super::store::{StockStore, StockTx};
use super::types::{Direction, Movement, MovementRequest, Product, ReversalReceipt};
use super::validation::{plan_apply, plan_edit, plan_reversal, validate_amount};

/// Serializes all quantity changes for a product through its row lock.
pub struct StockLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for StockLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: StockStore> StockLedger<S> {
    /// Creates a ledger over a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Applies a new movement and returns it with its audit snapshot.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if the amount is not positive.
    /// - `ProductNotFound` if the product does not exist.
    /// - `InsufficientStock` if an `Out` exceeds the quantity on hand.
    /// - `LockTimeout`, `Contention` or `Storage` on infrastructure failure.
    pub async fn apply(&self, request: MovementRequest) -> Result<Movement, StockError> {
        let amount = validate_amount(request.amount)?;

        let mut tx = self.store.begin().await?;
        let product = lock_existing(&mut tx, request.product_id).await?;

        let change = plan_apply(product.id, product.quantity, request.direction, amount)?;

        let movement = Movement {
            id: MovementId::new(),
            product_id: product.id,
            direction: request.direction,
            amount,
            actor: request.actor,
            reason: request.reason,
            created_at: Utc::now(),
            quantity_before: change.before,
            quantity_after: change.after,
        };

        tx.update_quantity(product.id, change.after).await?;
        tx.insert_movement(&movement).await?;
        tx.commit().await?;

        info!(
            product_id = %product.id,
            movement_id = %movement.id,
            direction = %movement.direction,
            amount,
            quantity_before = change.before,
            quantity_after = change.after,
            "Stock movement applied"
        );
        warn_if_below_threshold(&product, change.before, change.after);

        Ok(movement)
    }

    /// Removes a movement and restores the quantity it changed.
    ///
    /// # Errors
    ///
    /// - `MovementNotFound` if the movement does not exist, including when a
    ///   concurrent reversal removed it while this call waited for the lock.
    /// - `WouldGoNegative` if undoing an `In` would drive the quantity below zero.
    /// - `LockTimeout`, `Contention` or `Storage` on infrastructure failure.
    pub async fn reverse(&self, movement_id: MovementId) -> Result<ReversalReceipt, StockError> {
        let preview = self
            .store
            .find_movement(movement_id)
            .await?
            .ok_or(StockError::MovementNotFound(movement_id))?;

        let mut tx = self.store.begin().await?;
        let (product, movement) = lock_movement(&mut tx, preview.product_id, movement_id).await?;

        let change = plan_reversal(&movement, product.quantity)?;

        tx.update_quantity(product.id, change.after).await?;
        if !tx.delete_movement(movement.id).await? {
            return Err(StockError::MovementNotFound(movement_id));
        }
        tx.commit().await?;

        info!(
            product_id = %product.id,
            movement_id = %movement.id,
            direction = %movement.direction,
            amount = movement.amount,
            quantity_before = change.before,
            quantity_after = change.after,
            "Stock movement reversed"
        );

        Ok(ReversalReceipt {
            movement_id: movement.id,
            product_id: product.id,
            quantity_before: change.before,
            quantity_after: change.after,
        })
    }

    /// Replaces a movement's direction and amount.
    ///
    /// The old row is deleted and a new row takes its place with a fresh id and
    /// timestamp; actor and reason carry over. Both the reversal of the old
    /// effect and the application of the new one happen under one lock.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if the new amount is not positive.
    /// - `MovementNotFound` if the movement does not exist.
    /// - `WouldGoNegative` if the final quantity would be below zero.
    /// - `LockTimeout`, `Contention` or `Storage` on infrastructure failure.
    pub async fn edit(
        &self,
        movement_id: MovementId,
        direction: Direction,
        amount: i64,
    ) -> Result<Movement, StockError> {
        let amount = validate_amount(amount)?;

        let preview = self
            .store
            .find_movement(movement_id)
            .await?
            .ok_or(StockError::MovementNotFound(movement_id))?;

        let mut tx = self.store.begin().await?;
        let (product, old) = lock_movement(&mut tx, preview.product_id, movement_id).await?;

        let change = plan_edit(&old, product.quantity, direction, amount)?;

        let replacement = Movement {
            id: MovementId::new(),
            product_id: product.id,
            direction,
            amount,
            actor: old.actor,
            reason: old.reason.clone(),
            created_at: Utc::now(),
            quantity_before: change.before,
            quantity_after: change.after,
        };

        tx.update_quantity(product.id, change.after).await?;
        if !tx.delete_movement(old.id).await? {
            return Err(StockError::MovementNotFound(movement_id));
        }
        tx.insert_movement(&replacement).await?;
        tx.commit().await?;

        info!(
            product_id = %product.id,
            old_movement_id = %old.id,
            new_movement_id = %replacement.id,
            old_direction = %old.direction,
            old_amount = old.amount,
            new_direction = %direction,
            new_amount = amount,
            quantity_before = change.before,
            quantity_after = change.after,
            "Stock movement edited"
        );
        warn_if_below_threshold(&product, change.before, change.after);

        Ok(replacement)
    }
}

/// Locks a product that must exist.
async fn lock_existing<T: StockTx>(tx: &mut T, product_id: ProductId) -> Result<Product, StockError> {
    tx.lock_product(product_id)
        .await?
        .ok_or(StockError::ProductNotFound(product_id))
}

/// Locks the movement's product, then re-reads the movement under that lock.
async fn lock_movement<T: StockTx>(
    tx: &mut T,
    product_id: ProductId,
    movement_id: MovementId,
) -> Result<(Product, Movement), StockError> {
    // A deleted product took its movements with it.
    let product = tx
        .lock_product(product_id)
        .await?
        .ok_or(StockError::MovementNotFound(movement_id))?;

    let movement = tx
        .find_movement(movement_id)
        .await?
        .ok_or(StockError::MovementNotFound(movement_id))?;

    Ok((product, movement))
}

fn warn_if_below_threshold(product: &Product, before: i64, quantity: i64) {
    if quantity < before && product.below_threshold(quantity) {
        warn!(
            product_id = %product.id,
            quantity,
            restock_threshold = product.restock_threshold,
            "Product below restock threshold"
        );
    }
}
