//! Core business logic for Stockroom.
//!
//! This crate holds the stock ledger with ZERO web or database dependencies.
//! Persistence is reached only through the [`stock::StockStore`] trait.
//!
//! # Modules
//!
//! - `stock` - Products, movements, the ledger engine and reconciliation
//! - `cleanup` - Deleting products that lost their last group

pub mod cleanup;
pub mod stock;

pub use cleanup::{CleanupOutcome, CleanupService, GroupCleanupReport, GroupMembershipService};
pub use stock::{StockError, StockLedger, StockStore, StockTx};
