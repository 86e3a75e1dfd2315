//! PostgreSQL stock store.
//!
//! Row locks are `SELECT ... FOR UPDATE` on the product row, bounded by a
//! transaction-scoped `lock_timeout`. Cascades to movements and memberships are
//! done by the foreign keys.

use std::time::Duration;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RuntimeErr, Set,
    TransactionTrait,
};
use stockroom_core::stock::{
    Group, Movement, NewProduct, Product, StockError, StockStore, StockTx,
};
use stockroom_shared::LedgerConfig;
use stockroom_shared::types::{GroupId, MovementId, ProductId, UserId};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{group_memberships, movements, product_groups, products};

/// `lock_not_available`: `lock_timeout` expired.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";
/// `serialization_failure`.
const SERIALIZATION_FAILURE: &str = "40001";

/// Extracts the SQLSTATE of a database error, if any.
fn sqlstate(err: &DbErr) -> Option<String> {
    let runtime = match err {
        DbErr::Query(e) | DbErr::Exec(e) | DbErr::Conn(e) => e,
        _ => return None,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx::Error::Database(db_err)) => {
            db_err.code().map(std::borrow::Cow::into_owned)
        }
        _ => None,
    }
}

/// Maps a database error to a stock error.
///
/// `locking` names the product whose row lock was being acquired, if any.
fn map_db_err(err: DbErr, locking: Option<ProductId>) -> StockError {
    match (sqlstate(&err).as_deref(), locking) {
        (Some(LOCK_NOT_AVAILABLE), Some(product_id)) => {
            warn!(product_id = %product_id, "Product row lock wait timed out");
            StockError::LockTimeout(product_id)
        }
        (Some(LOCK_NOT_AVAILABLE | DEADLOCK_DETECTED | SERIALIZATION_FAILURE), _) => {
            warn!(error = %err, "Transaction aborted by concurrent writers");
            StockError::Contention(err.to_string())
        }
        _ => StockError::Storage(err.to_string()),
    }
}

fn storage(err: DbErr) -> StockError {
    map_db_err(err, None)
}

fn to_product(model: products::Model) -> Product {
    Product {
        id: ProductId::from(model.id),
        name: model.name,
        description: model.description,
        price: model.price,
        quantity: model.quantity,
        restock_threshold: model.restock_threshold,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn to_movement(model: movements::Model) -> Movement {
    Movement {
        id: MovementId::from(model.id),
        product_id: ProductId::from(model.product_id),
        direction: model.direction.into(),
        amount: model.amount,
        actor: model.actor_id.map(UserId::from),
        reason: model.reason,
        created_at: model.created_at.with_timezone(&Utc),
        quantity_before: model.quantity_before,
        quantity_after: model.quantity_after,
    }
}

fn to_group(model: product_groups::Model) -> Group {
    Group {
        id: GroupId::from(model.id),
        name: model.name,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

async fn find_movement_in<C: ConnectionTrait>(
    conn: &C,
    id: MovementId,
) -> Result<Option<Movement>, StockError> {
    movements::Entity::find_by_id(id.into_inner())
        .one(conn)
        .await
        .map(|m| m.map(to_movement))
        .map_err(storage)
}

/// `0` disables the PostgreSQL lock timeout, matching a zero `LedgerConfig` value.
fn lock_timeout_sql(timeout: Duration) -> String {
    format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis())
}

/// Stock repository backed by `PostgreSQL`.
#[derive(Debug, Clone)]
pub struct StockRepository {
    db: DatabaseConnection,
    lock_timeout: Duration,
}

impl StockRepository {
    /// Creates a new stock repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }

    /// Creates a stock repository configured from the ledger settings.
    #[must_use]
    pub const fn from_config(db: DatabaseConnection, config: &LedgerConfig) -> Self {
        Self::new(db, config.lock_timeout())
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl StockStore for StockRepository {
    type Tx = PgStockTx;

    async fn begin(&self) -> Result<Self::Tx, StockError> {
        let txn = self.db.begin().await.map_err(storage)?;

        // SET LOCAL is scoped to this transaction only.
        txn.execute_unprepared(&lock_timeout_sql(self.lock_timeout))
            .await
            .map_err(storage)?;

        Ok(PgStockTx { txn })
    }

    async fn create_product(&self, input: NewProduct) -> Result<Product, StockError> {
        let now = Utc::now().into();

        let product = products::ActiveModel {
            id: Set(ProductId::new().into_inner()),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            quantity: Set(0),
            restock_threshold: Set(input.restock_threshold),
            created_at: Set(now),
            updated_at: Set(now),
        };

        product.insert(&self.db).await.map(to_product).map_err(storage)
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, StockError> {
        products::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map(|p| p.map(to_product))
            .map_err(storage)
    }

    async fn find_movement(&self, id: MovementId) -> Result<Option<Movement>, StockError> {
        find_movement_in(&self.db, id).await
    }

    async fn movements_for_product(&self, product_id: ProductId) -> Result<Vec<Movement>, StockError> {
        let rows = movements::Entity::find()
            .filter(movements::Column::ProductId.eq(product_id.into_inner()))
            .order_by_asc(movements::Column::CreatedAt)
            .order_by_asc(movements::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage)?;

        Ok(rows.into_iter().map(to_movement).collect())
    }

    async fn create_group(&self, name: &str) -> Result<Group, StockError> {
        let group = product_groups::ActiveModel {
            id: Set(GroupId::new().into_inner()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now().into()),
        };

        group.insert(&self.db).await.map(to_group).map_err(storage)
    }

    async fn add_membership(&self, product_id: ProductId, group_id: GroupId) -> Result<(), StockError> {
        // Same lock order as group deletion: group row, then product row.
        let mut tx = self.begin().await?;
        let group = product_groups::Entity::find_by_id(group_id.into_inner())
            .lock_exclusive()
            .one(&tx.txn)
            .await
            .map_err(storage)?;
        if group.is_none() {
            return Err(StockError::GroupNotFound(group_id));
        }
        if tx.lock_product(product_id).await?.is_none() {
            return Err(StockError::ProductNotFound(product_id));
        }

        let membership = group_memberships::ActiveModel {
            product_id: Set(product_id.into_inner()),
            group_id: Set(group_id.into_inner()),
            created_at: Set(Utc::now().into()),
        };

        group_memberships::Entity::insert(membership)
            .on_conflict(
                OnConflict::columns([
                    group_memberships::Column::ProductId,
                    group_memberships::Column::GroupId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&tx.txn)
            .await
            .map_err(storage)?;

        tx.commit().await
    }

    async fn remove_membership(
        &self,
        product_id: ProductId,
        group_id: GroupId,
    ) -> Result<bool, StockError> {
        let result = group_memberships::Entity::delete_many()
            .filter(group_memberships::Column::ProductId.eq(product_id.into_inner()))
            .filter(group_memberships::Column::GroupId.eq(group_id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected > 0)
    }
}

/// One `PostgreSQL` transaction of the stock ledger.
///
/// Dropping it without `commit` rolls back.
pub struct PgStockTx {
    txn: DatabaseTransaction,
}

impl StockTx for PgStockTx {
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StockError> {
        let product = products::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(|e| map_db_err(e, Some(id)))?;

        if product.is_some() {
            debug!(product_id = %id, "Product row locked");
        }
        Ok(product.map(to_product))
    }

    async fn update_quantity(&mut self, id: ProductId, quantity: i64) -> Result<(), StockError> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        let result = products::Entity::update_many()
            .col_expr(products::Column::Quantity, Expr::value(quantity))
            .col_expr(products::Column::UpdatedAt, Expr::value(now))
            .filter(products::Column::Id.eq(id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(storage)?;

        if result.rows_affected == 0 {
            return Err(StockError::ProductNotFound(id));
        }
        Ok(())
    }

    async fn find_movement(&mut self, id: MovementId) -> Result<Option<Movement>, StockError> {
        find_movement_in(&self.txn, id).await
    }

    async fn insert_movement(&mut self, movement: &Movement) -> Result<(), StockError> {
        let row = movements::ActiveModel {
            id: Set(movement.id.into_inner()),
            product_id: Set(movement.product_id.into_inner()),
            direction: Set(movement.direction.into()),
            amount: Set(movement.amount),
            actor_id: Set(movement.actor.map(UserId::into_inner)),
            reason: Set(movement.reason.clone()),
            created_at: Set(movement.created_at.into()),
            quantity_before: Set(movement.quantity_before),
            quantity_after: Set(movement.quantity_after),
        };

        movements::Entity::insert(row)
            .exec_without_returning(&self.txn)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn delete_movement(&mut self, id: MovementId) -> Result<bool, StockError> {
        let result = movements::Entity::delete_by_id(id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected > 0)
    }

    async fn membership_count(
        &mut self,
        product_id: ProductId,
        excluding: Option<GroupId>,
    ) -> Result<u64, StockError> {
        let mut query = group_memberships::Entity::find()
            .filter(group_memberships::Column::ProductId.eq(product_id.into_inner()));
        if let Some(group_id) = excluding {
            query = query.filter(group_memberships::Column::GroupId.ne(group_id.into_inner()));
        }

        query.count(&self.txn).await.map_err(storage)
    }

    async fn group_members(&mut self, group_id: GroupId) -> Result<Option<Vec<ProductId>>, StockError> {
        // Locking the group row blocks concurrent inserts of new memberships,
        // which need a key-share lock on it.
        let group = product_groups::Entity::find_by_id(group_id.into_inner())
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(storage)?;
        if group.is_none() {
            return Ok(None);
        }

        let members = group_memberships::Entity::find()
            .filter(group_memberships::Column::GroupId.eq(group_id.into_inner()))
            .order_by_asc(group_memberships::Column::ProductId)
            .all(&self.txn)
            .await
            .map_err(storage)?;

        Ok(Some(
            members
                .into_iter()
                .map(|m| ProductId::from(m.product_id))
                .collect(),
        ))
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<bool, StockError> {
        let result = products::Entity::delete_by_id(id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_group(&mut self, id: GroupId) -> Result<bool, StockError> {
        let result = product_groups::Entity::delete_by_id(id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected > 0)
    }

    async fn commit(self) -> Result<(), StockError> {
        self.txn.commit().await.map_err(storage)
    }

    async fn rollback(self) -> Result<(), StockError> {
        self.txn.rollback().await.map_err(storage)
    }
}

/// Lists every product id, oldest first.
///
/// # Errors
///
/// Returns `Storage` if the query fails.
pub async fn all_product_ids(db: &DatabaseConnection) -> Result<Vec<ProductId>, StockError> {
    let ids: Vec<Uuid> = products::Entity::find()
        .select_only()
        .column(products::Column::Id)
        .order_by_asc(products::Column::CreatedAt)
        .into_tuple()
        .all(db)
        .await
        .map_err(storage)?;

    Ok(ids.into_iter().map(ProductId::from).collect())
}
