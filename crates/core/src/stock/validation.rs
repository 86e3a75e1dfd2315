//! Quantity arithmetic and business rule validation for stock movements.
//!
//! These functions are pure: the engine calls them with the quantity it read
//! under the product lock and persists whatever they return.

use stockroom_shared::types::ProductId;

use super::error::StockError;
use super::types::{Direction, Movement};

/// A before/after pair of product quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityChange {
    /// Quantity observed under the lock.
    pub before: i64,
    /// Quantity to persist.
    pub after: i64,
}

/// Validates a requested movement amount.
///
/// # Errors
///
/// Returns `InvalidAmount` if the amount is zero or negative.
pub fn validate_amount(amount: i64) -> Result<i64, StockError> {
    if amount <= 0 {
        return Err(StockError::InvalidAmount(amount));
    }
    Ok(amount)
}

/// Adds `delta` to `quantity`, returning `None` on overflow.
fn shifted(quantity: i64, delta: i64) -> Option<i64> {
    quantity.checked_add(delta)
}

/// Plans applying a new movement to a product holding `quantity`.
///
/// # Errors
///
/// - `InvalidAmount` if the amount is not positive or overflows the quantity.
/// - `InsufficientStock` if the result would be negative.
pub fn plan_apply(
    product_id: ProductId,
    quantity: i64,
    direction: Direction,
    amount: i64,
) -> Result<QuantityChange, StockError> {
    let amount = validate_amount(amount)?;
    let after = shifted(quantity, direction.delta(amount)).ok_or(StockError::InvalidAmount(amount))?;

    if after < 0 {
        return Err(StockError::InsufficientStock {
            product_id,
            available: quantity,
            requested: amount,
        });
    }

    Ok(QuantityChange {
        before: quantity,
        after,
    })
}

/// Plans removing `movement`'s effect from a product holding `quantity`.
///
/// # Errors
///
/// Returns `WouldGoNegative` if the inverse delta would drive the quantity below zero.
pub fn plan_reversal(movement: &Movement, quantity: i64) -> Result<QuantityChange, StockError> {
    let after = shifted(quantity, movement.direction.inverse_delta(movement.amount))
        .ok_or(StockError::InvalidAmount(movement.amount))?;

    if after < 0 {
        return Err(StockError::WouldGoNegative {
            movement_id: movement.id,
            product_id: movement.product_id,
            resulting: after,
        });
    }

    Ok(QuantityChange {
        before: quantity,
        after,
    })
}

/// Plans replacing `movement` with a movement of `amount` in `direction`.
///
/// The old effect is backed out and the new one applied as a single net
/// change; only the final quantity must stay non-negative.
///
/// # Errors
///
/// - `InvalidAmount` if the new amount is not positive or overflows the quantity.
/// - `WouldGoNegative` if the final quantity would be below zero.
pub fn plan_edit(
    movement: &Movement,
    quantity: i64,
    direction: Direction,
    amount: i64,
) -> Result<QuantityChange, StockError> {
    let amount = validate_amount(amount)?;
    let after = movement
        .direction
        .inverse_delta(movement.amount)
        .checked_add(direction.delta(amount))
        .and_then(|net| shifted(quantity, net))
        .ok_or(StockError::InvalidAmount(amount))?;

    if after < 0 {
        return Err(StockError::WouldGoNegative {
            movement_id: movement.id,
            product_id: movement.product_id,
            resulting: after,
        });
    }

    Ok(QuantityChange {
        before: quantity,
        after,
    })
}

/// Recomputes a product quantity from its movement log.
///
/// Returns `None` if the sum overflows.
#[must_use]
pub fn replay(movements: &[Movement]) -> Option<i64> {
    movements
        .iter()
        .try_fold(0i64, |total, movement| total.checked_add(movement.delta()))
}
