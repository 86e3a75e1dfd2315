//! Recomputes a product's quantity from its movement log.
//!
//! Audit snapshots are never rewritten after a reversal, so the chain of
//! `quantity_before`/`quantity_after` values may have gaps. The report shows
//! where those gaps are; it does not repair anything.

use serde::Serialize;
use stockroom_shared::types::{MovementId, ProductId};
use tracing::warn;

use super::error::StockError;
use super::store::StockStore;
use super::types::Movement;
use super::validation::replay;

/// A place where one movement's `quantity_before` differs from the previous
/// movement's `quantity_after`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditGap {
    /// The movement whose snapshot does not continue the chain.
    pub movement_id: MovementId,
    /// `quantity_after` of the preceding movement (0 for the first one).
    pub expected_before: i64,
    /// The recorded `quantity_before`.
    pub recorded_before: i64,
}

/// Result of reconciling a product against its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// The product.
    pub product_id: ProductId,
    /// The cached quantity on the product row.
    pub cached_quantity: i64,
    /// Σ IN − Σ OUT over the log.
    pub replayed_quantity: i64,
    /// Number of movements in the log.
    pub movement_count: usize,
    /// Breaks in the audit snapshot chain.
    pub audit_gaps: Vec<AuditGap>,
}

impl ReconcileReport {
    /// True when the cached quantity equals the replayed one.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.cached_quantity == self.replayed_quantity
    }

    /// True when every snapshot continues from the previous one.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.audit_gaps.is_empty()
    }
}

/// Finds breaks in the snapshot chain of a log in creation order.
#[must_use]
pub fn audit_gaps(movements: &[Movement]) -> Vec<AuditGap> {
    let mut expected = 0;
    let mut gaps = Vec::new();

    for movement in movements {
        if movement.quantity_before != expected {
            gaps.push(AuditGap {
                movement_id: movement.id,
                expected_before: expected,
                recorded_before: movement.quantity_before,
            });
        }
        expected = movement.quantity_after;
    }

    gaps
}

/// Compares a product's cached quantity with its movement log.
///
/// The read is not taken under the product lock; run it when the product is
/// idle for an exact answer.
///
/// # Errors
///
/// - `ProductNotFound` if the product does not exist.
/// - `Storage` if the log sum overflows or the store fails.
pub async fn reconcile<S: StockStore>(
    store: &S,
    product_id: ProductId,
) -> Result<ReconcileReport, StockError> {
    let product = store
        .find_product(product_id)
        .await?
        .ok_or(StockError::ProductNotFound(product_id))?;
    let movements = store.movements_for_product(product_id).await?;

    let replayed_quantity = replay(&movements).ok_or_else(|| {
        StockError::Storage(format!("movement log of product {product_id} overflows"))
    })?;

    let report = ReconcileReport {
        product_id,
        cached_quantity: product.quantity,
        replayed_quantity,
        movement_count: movements.len(),
        audit_gaps: audit_gaps(&movements),
    };

    if !report.is_consistent() {
        warn!(
            product_id = %product_id,
            cached = report.cached_quantity,
            replayed = report.replayed_quantity,
            "Cached quantity differs from movement log"
        );
    }

    Ok(report)
}
