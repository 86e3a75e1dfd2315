//! In-memory stock store with per-row locks.
//!
//! Each product and group row has its own `tokio::sync::Mutex`. A transaction
//! keeps the owned guard of every row it locked and stages its writes; `commit`
//! applies them in one step under the table write lock. Dropping a transaction
//! discards the staged writes and releases its row locks, which is a rollback.
//!
//! Lock order is group before product, both in group deletion and in
//! `add_membership`.
//!
//! The table lock is a std `RwLock` and is never held across an `.await`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use stockroom_shared::LedgerConfig;
use stockroom_shared::types::{GroupId, MovementId, ProductId};
use tokio::sync::OwnedMutexGuard;

use super::error::StockError;
use super::store::{StockStore, StockTx};
use super::types::{Group, Movement, NewProduct, Product};

type RowLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Default)]
struct RowLocks {
    products: HashMap<ProductId, RowLock>,
    groups: HashMap<GroupId, RowLock>,
}

impl RowLocks {
    fn product(&mut self, id: ProductId) -> RowLock {
        Arc::clone(self.products.entry(id).or_default())
    }

    fn group(&mut self, id: GroupId) -> RowLock {
        Arc::clone(self.groups.entry(id).or_default())
    }
}

/// Waits for a row lock. A zero timeout waits indefinitely.
async fn acquire(row: RowLock, timeout: Duration) -> Option<OwnedMutexGuard<()>> {
    if timeout.is_zero() {
        return Some(row.lock_owned().await);
    }
    tokio::time::timeout(timeout, row.lock_owned()).await.ok()
}

fn group_lock_timeout(id: GroupId) -> StockError {
    StockError::Contention(format!("group {id} is locked by another transaction"))
}

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    /// Append order is creation order.
    movements: Vec<Movement>,
    groups: HashMap<GroupId, Group>,
    memberships: BTreeSet<(ProductId, GroupId)>,
}

impl Tables {
    fn delete_product(&mut self, id: ProductId) -> bool {
        self.movements.retain(|m| m.product_id != id);
        self.memberships.retain(|(product_id, _)| *product_id != id);
        self.products.remove(&id).is_some()
    }

    fn delete_group(&mut self, id: GroupId) -> bool {
        self.memberships.retain(|(_, group_id)| *group_id != id);
        self.groups.remove(&id).is_some()
    }
}

#[derive(Debug, Clone)]
enum Write {
    Quantity(ProductId, i64),
    InsertMovement(Movement),
    DeleteMovement(MovementId),
    DeleteProduct(ProductId),
    DeleteGroup(GroupId),
}

fn poisoned<T>(_: T) -> StockError {
    StockError::Storage("in-memory store lock poisoned".to_string())
}

/// Stock store kept entirely in process memory.
#[derive(Debug)]
pub struct InMemoryStockStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: Arc<Mutex<RowLocks>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::new(LedgerConfig::default().lock_timeout())
    }
}

impl InMemoryStockStore {
    /// Creates an empty store whose row locks wait at most `lock_timeout`.
    ///
    /// A zero `lock_timeout` waits indefinitely.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            row_locks: Arc::new(Mutex::new(RowLocks::default())),
            lock_timeout,
        }
    }

    /// Creates an empty store configured from the ledger settings.
    #[must_use]
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.lock_timeout())
    }

    /// Returns how many group memberships the product currently has.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the table lock is poisoned.
    pub fn membership_count(&self, product_id: ProductId) -> Result<usize, StockError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .memberships
            .iter()
            .filter(|(p, _)| *p == product_id)
            .count())
    }

    /// Returns true if the group exists.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the table lock is poisoned.
    pub fn group_exists(&self, group_id: GroupId) -> Result<bool, StockError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.groups.contains_key(&group_id))
    }
}

impl StockStore for InMemoryStockStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StockError> {
        Ok(InMemoryTx {
            tables: Arc::clone(&self.tables),
            row_locks: Arc::clone(&self.row_locks),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            held_groups: HashMap::new(),
            writes: Vec::new(),
        })
    }

    async fn create_product(&self, input: NewProduct) -> Result<Product, StockError> {
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(),
            name: input.name,
            description: input.description,
            price: input.price,
            quantity: 0,
            restock_threshold: input.restock_threshold,
            created_at: now,
            updated_at: now,
        };

        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, StockError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.products.get(&id).cloned())
    }

    async fn find_movement(&self, id: MovementId) -> Result<Option<Movement>, StockError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.movements.iter().find(|m| m.id == id).cloned())
    }

    async fn movements_for_product(&self, product_id: ProductId) -> Result<Vec<Movement>, StockError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .movements
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn create_group(&self, name: &str) -> Result<Group, StockError> {
        let group = Group {
            id: GroupId::new(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn add_membership(&self, product_id: ProductId, group_id: GroupId) -> Result<(), StockError> {
        let check = |tables: &Tables| {
            if !tables.products.contains_key(&product_id) {
                return Err(StockError::ProductNotFound(product_id));
            }
            if !tables.groups.contains_key(&group_id) {
                return Err(StockError::GroupNotFound(group_id));
            }
            Ok(())
        };
        check(&*self.tables.read().map_err(poisoned)?)?;

        let (group_row, product_row) = {
            let mut locks = self.row_locks.lock().map_err(poisoned)?;
            (locks.group(group_id), locks.product(product_id))
        };
        let _group = acquire(group_row, self.lock_timeout)
            .await
            .ok_or_else(|| group_lock_timeout(group_id))?;
        let _product = acquire(product_row, self.lock_timeout)
            .await
            .ok_or(StockError::LockTimeout(product_id))?;

        // Either row may have been deleted by the transaction we waited for.
        let mut tables = self.tables.write().map_err(poisoned)?;
        check(&*tables)?;
        tables.memberships.insert((product_id, group_id));
        Ok(())
    }

    async fn remove_membership(
        &self,
        product_id: ProductId,
        group_id: GroupId,
    ) -> Result<bool, StockError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        Ok(tables.memberships.remove(&(product_id, group_id)))
    }
}

/// Transaction over an [`InMemoryStockStore`].
pub struct InMemoryTx {
    tables: Arc<RwLock<Tables>>,
    row_locks: Arc<Mutex<RowLocks>>,
    lock_timeout: Duration,
    held: HashMap<ProductId, OwnedMutexGuard<()>>,
    held_groups: HashMap<GroupId, OwnedMutexGuard<()>>,
    writes: Vec<Write>,
}

impl std::fmt::Debug for InMemoryTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTx")
            .field("locked", &self.held.keys().collect::<Vec<_>>())
            .field("locked_groups", &self.held_groups.keys().collect::<Vec<_>>())
            .field("staged_writes", &self.writes.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryTx {
    fn group_exists(&self, id: GroupId) -> Result<bool, StockError> {
        if self.group_deleted(id) {
            return Ok(false);
        }
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.groups.contains_key(&id))
    }

    /// Locks the group row; returns false without locking if it does not exist.
    async fn lock_group(&mut self, id: GroupId) -> Result<bool, StockError> {
        if self.held_groups.contains_key(&id) {
            return self.group_exists(id);
        }
        if !self.group_exists(id)? {
            return Ok(false);
        }

        let row = self.row_locks.lock().map_err(poisoned)?.group(id);
        let guard = acquire(row, self.lock_timeout)
            .await
            .ok_or_else(|| group_lock_timeout(id))?;

        let exists = self.group_exists(id)?;
        if exists {
            self.held_groups.insert(id, guard);
        }
        Ok(exists)
    }

    fn product_deleted(&self, id: ProductId) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w, Write::DeleteProduct(p) if *p == id))
    }

    fn group_deleted(&self, id: GroupId) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w, Write::DeleteGroup(g) if *g == id))
    }

    /// The product as this transaction sees it: committed state plus staged writes.
    fn product_view(&self, id: ProductId) -> Result<Option<Product>, StockError> {
        let mut product = {
            let tables = self.tables.read().map_err(poisoned)?;
            tables.products.get(&id).cloned()
        };

        for write in &self.writes {
            match write {
                Write::Quantity(p, quantity) if *p == id => {
                    if let Some(product) = product.as_mut() {
                        product.quantity = *quantity;
                    }
                }
                Write::DeleteProduct(p) if *p == id => product = None,
                _ => {}
            }
        }

        Ok(product)
    }

    fn movement_view(&self, id: MovementId) -> Result<Option<Movement>, StockError> {
        let mut movement = {
            let tables = self.tables.read().map_err(poisoned)?;
            tables.movements.iter().find(|m| m.id == id).cloned()
        };

        for write in &self.writes {
            match write {
                Write::InsertMovement(m) if m.id == id => movement = Some(m.clone()),
                Write::DeleteMovement(m) if *m == id => movement = None,
                Write::DeleteProduct(p) if movement.as_ref().is_some_and(|m| m.product_id == *p) => {
                    movement = None;
                }
                _ => {}
            }
        }

        Ok(movement)
    }

    fn apply_writes(tables: &mut Tables, writes: Vec<Write>) -> (Vec<ProductId>, Vec<GroupId>) {
        let now = Utc::now();
        let mut deleted = Vec::new();
        let mut deleted_groups = Vec::new();

        for write in writes {
            match write {
                Write::Quantity(id, quantity) => {
                    if let Some(product) = tables.products.get_mut(&id) {
                        product.quantity = quantity;
                        product.updated_at = now;
                    }
                }
                Write::InsertMovement(movement) => tables.movements.push(movement),
                Write::DeleteMovement(id) => tables.movements.retain(|m| m.id != id),
                Write::DeleteProduct(id) => {
                    tables.delete_product(id);
                    deleted.push(id);
                }
                Write::DeleteGroup(id) => {
                    tables.delete_group(id);
                    deleted_groups.push(id);
                }
            }
        }

        (deleted, deleted_groups)
    }
}

impl StockTx for InMemoryTx {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StockError> {
        if self.held.contains_key(&id) {
            return self.product_view(id);
        }
        if self.product_view(id)?.is_none() {
            return Ok(None);
        }

        let row = self.row_locks.lock().map_err(poisoned)?.product(id);
        let guard = acquire(row, self.lock_timeout)
            .await
            .ok_or(StockError::LockTimeout(id))?;

        // The previous holder may have deleted the row.
        let product = self.product_view(id)?;
        if product.is_some() {
            self.held.insert(id, guard);
        }
        Ok(product)
    }

    async fn update_quantity(&mut self, id: ProductId, quantity: i64) -> Result<(), StockError> {
        if !self.held.contains_key(&id) {
            return Err(StockError::Storage(format!(
                "quantity update on product {id} without holding its lock"
            )));
        }
        if quantity < 0 {
            return Err(StockError::Storage(format!(
                "negative quantity {quantity} rejected for product {id}"
            )));
        }
        self.writes.push(Write::Quantity(id, quantity));
        Ok(())
    }

    async fn find_movement(&mut self, id: MovementId) -> Result<Option<Movement>, StockError> {
        self.movement_view(id)
    }

    async fn insert_movement(&mut self, movement: &Movement) -> Result<(), StockError> {
        if movement.amount <= 0 {
            return Err(StockError::Storage(format!(
                "non-positive amount {} rejected for movement {}",
                movement.amount, movement.id
            )));
        }
        if self.product_view(movement.product_id)?.is_none() {
            return Err(StockError::ProductNotFound(movement.product_id));
        }
        self.writes.push(Write::InsertMovement(movement.clone()));
        Ok(())
    }

    async fn delete_movement(&mut self, id: MovementId) -> Result<bool, StockError> {
        if self.movement_view(id)?.is_none() {
            return Ok(false);
        }
        self.writes.push(Write::DeleteMovement(id));
        Ok(true)
    }

    async fn membership_count(
        &mut self,
        product_id: ProductId,
        excluding: Option<GroupId>,
    ) -> Result<u64, StockError> {
        if self.product_deleted(product_id) {
            return Ok(0);
        }

        let groups: Vec<GroupId> = {
            let tables = self.tables.read().map_err(poisoned)?;
            tables
                .memberships
                .iter()
                .filter(|(p, g)| *p == product_id && Some(*g) != excluding)
                .map(|(_, g)| *g)
                .collect()
        };

        let count = groups.into_iter().filter(|g| !self.group_deleted(*g)).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn group_members(&mut self, group_id: GroupId) -> Result<Option<Vec<ProductId>>, StockError> {
        if !self.lock_group(group_id).await? {
            return Ok(None);
        }

        let members: Vec<ProductId> = {
            let tables = self.tables.read().map_err(poisoned)?;
            tables
                .memberships
                .iter()
                .filter(|(_, g)| *g == group_id)
                .map(|(p, _)| *p)
                .collect()
        };

        let mut members: Vec<ProductId> = members
            .into_iter()
            .filter(|p| !self.product_deleted(*p))
            .collect();
        members.sort();
        Ok(Some(members))
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<bool, StockError> {
        if !self.held.contains_key(&id) {
            return Err(StockError::Storage(format!(
                "delete of product {id} without holding its lock"
            )));
        }
        if self.product_view(id)?.is_none() {
            return Ok(false);
        }
        self.writes.push(Write::DeleteProduct(id));
        Ok(true)
    }

    async fn delete_group(&mut self, id: GroupId) -> Result<bool, StockError> {
        let exists = self.lock_group(id).await?;
        if exists {
            self.writes.push(Write::DeleteGroup(id));
        }
        Ok(exists)
    }

    async fn commit(self) -> Result<(), StockError> {
        let Self {
            tables,
            row_locks,
            held,
            held_groups,
            writes,
            ..
        } = self;

        let (deleted, deleted_groups) = {
            let mut tables = tables.write().map_err(poisoned)?;
            Self::apply_writes(&mut tables, writes)
        };

        if !deleted.is_empty() || !deleted_groups.is_empty() {
            let mut locks = row_locks.lock().map_err(poisoned)?;
            for id in &deleted {
                locks.products.remove(id);
            }
            for id in &deleted_groups {
                locks.groups.remove(id);
            }
        }

        drop(held);
        drop(held_groups);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StockError> {
        drop(self);
        Ok(())
    }
}
