//! Persistence seams for the stock ledger.
//!
//! This trait pair is implemented by the db crate (PostgreSQL) and by
//! [`super::memory::InMemoryStockStore`]. The engine only talks to them.
//!
//! Implementors of [`StockTx`] MUST:
//! 1. Make every write invisible to other transactions until `commit`
//! 2. Hold each lock taken by `lock_product` until commit or rollback
//! 3. Block (up to a bounded timeout) when another transaction holds the lock,
//!    returning `StockError::LockTimeout` when the wait expires; a zero
//!    timeout waits indefinitely
//! 4. Roll back when dropped without `commit`
//! 5. Cascade `delete_product` to the product's movements and memberships
//! 6. Lock the group row in `group_members` until commit or rollback, and make
//!    `StockStore::add_membership` wait for both the group and product rows

use std::future::Future;

use stockroom_shared::types::{GroupId, MovementId, ProductId};

use super::error::StockError;
use super::types::{Group, Movement, NewProduct, Product};

/// One open transaction against the stock store.
pub trait StockTx: Send {
    /// Locks the product row exclusively and returns its current state.
    ///
    /// Returns `Ok(None)` without holding a lock if the product does not exist.
    /// Locking a product already locked by this transaction returns immediately.
    fn lock_product(
        &mut self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, StockError>> + Send;

    /// Persists a new quantity for a product locked by this transaction.
    fn update_quantity(
        &mut self,
        id: ProductId,
        quantity: i64,
    ) -> impl Future<Output = Result<(), StockError>> + Send;

    /// Reads a movement as seen by this transaction.
    fn find_movement(
        &mut self,
        id: MovementId,
    ) -> impl Future<Output = Result<Option<Movement>, StockError>> + Send;

    /// Appends a movement.
    fn insert_movement(
        &mut self,
        movement: &Movement,
    ) -> impl Future<Output = Result<(), StockError>> + Send;

    /// Deletes a movement. Returns false if it did not exist.
    fn delete_movement(
        &mut self,
        id: MovementId,
    ) -> impl Future<Output = Result<bool, StockError>> + Send;

    /// Counts the product's group memberships, optionally ignoring one group.
    fn membership_count(
        &mut self,
        product_id: ProductId,
        excluding: Option<GroupId>,
    ) -> impl Future<Output = Result<u64, StockError>> + Send;

    /// Locks the group row and lists its products in ascending id order.
    ///
    /// Returns `Ok(None)` if the group does not exist.
    fn group_members(
        &mut self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<Option<Vec<ProductId>>, StockError>> + Send;

    /// Deletes a product together with its movements and memberships.
    fn delete_product(
        &mut self,
        id: ProductId,
    ) -> impl Future<Output = Result<bool, StockError>> + Send;

    /// Deletes a group together with its memberships.
    fn delete_group(
        &mut self,
        id: GroupId,
    ) -> impl Future<Output = Result<bool, StockError>> + Send;

    /// Commits all writes and releases every lock.
    fn commit(self) -> impl Future<Output = Result<(), StockError>> + Send;

    /// Discards all writes and releases every lock.
    fn rollback(self) -> impl Future<Output = Result<(), StockError>> + Send;
}

/// A transactional store holding products, movements and group memberships.
pub trait StockStore: Send + Sync + 'static {
    /// Transaction handle type.
    type Tx: StockTx + 'static;

    /// Opens a transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StockError>> + Send;

    // ========== Catalog (outside the ledger protocol) ==========

    /// Registers a product with quantity zero.
    fn create_product(
        &self,
        input: NewProduct,
    ) -> impl Future<Output = Result<Product, StockError>> + Send;

    /// Reads a product.
    fn find_product(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, StockError>> + Send;

    /// Reads a movement.
    fn find_movement(
        &self,
        id: MovementId,
    ) -> impl Future<Output = Result<Option<Movement>, StockError>> + Send;

    /// Lists a product's movements in creation order.
    fn movements_for_product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<Movement>, StockError>> + Send;

    // ========== Grouping boundary ==========

    /// Creates a group.
    fn create_group(&self, name: &str) -> impl Future<Output = Result<Group, StockError>> + Send;

    /// Adds a product to a group. Adding an existing membership is a no-op.
    ///
    /// Waits for any transaction holding the group or product row, so a
    /// membership never lands on a group or product being deleted.
    fn add_membership(
        &self,
        product_id: ProductId,
        group_id: GroupId,
    ) -> impl Future<Output = Result<(), StockError>> + Send;

    /// Removes a product from a group. Returns false if the edge did not exist.
    fn remove_membership(
        &self,
        product_id: ProductId,
        group_id: GroupId,
    ) -> impl Future<Output = Result<bool, StockError>> + Send;
}
