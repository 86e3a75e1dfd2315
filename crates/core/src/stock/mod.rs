//! Stock ledger: products, movements and the engine that keeps them consistent.
//!
//! - Domain types for products, movements and groups
//! - Quantity planning and business rule validation
//! - The transactional store seam and an in-memory implementation
//! - The ledger engine (apply, reverse, edit)
//! - Reconciliation of cached quantities against the movement log

pub mod engine;
pub mod error;
pub mod memory;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod ledger_props;
#[cfg(test)]
mod tests;

pub use engine::StockLedger;
pub use error::StockError;
pub use memory::{InMemoryStockStore, InMemoryTx};
pub use reconcile::{AuditGap, ReconcileReport, audit_gaps, reconcile};
pub use store::{StockStore, StockTx};
pub use types::{
    Direction, Group, Movement, MovementRequest, MovementView, NewProduct, Product,
    ReversalReceipt,
};
pub use validation::{QuantityChange, plan_apply, plan_edit, plan_reversal, replay, validate_amount};
