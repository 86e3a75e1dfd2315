//! Ledger engine tests against the in-memory store.

#![allow(clippy::cast_possible_wrap)]

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal_macros::dec;
use stockroom_shared::types::{MovementId, ProductId, UserId};
use tokio::sync::Barrier;

use super::engine::StockLedger;
use super::error::StockError;
use super::memory::InMemoryStockStore;
use super::reconcile::reconcile;
use super::store::{StockStore, StockTx};
use super::types::{Direction, MovementRequest, NewProduct};

fn ledger() -> StockLedger<InMemoryStockStore> {
    StockLedger::new(Arc::new(InMemoryStockStore::new(Duration::from_secs(5))))
}

async fn product_with(ledger: &StockLedger<InMemoryStockStore>, opening: i64) -> ProductId {
    let product = ledger
        .store()
        .create_product(NewProduct::named("Parafuso 3mm", dec!(0.35)))
        .await
        .unwrap();
    if opening > 0 {
        ledger
            .apply(MovementRequest::new(product.id, Direction::In, opening))
            .await
            .unwrap();
    }
    product.id
}

async fn quantity(ledger: &StockLedger<InMemoryStockStore>, id: ProductId) -> i64 {
    ledger.store().find_product(id).await.unwrap().unwrap().quantity
}

#[tokio::test]
async fn test_walkthrough_out_in_reverse() {
    let ledger = ledger();
    let id = product_with(&ledger, 5).await;

    let out = ledger
        .apply(MovementRequest::new(id, Direction::Out, 3))
        .await
        .unwrap();
    assert_eq!((out.quantity_before, out.quantity_after), (5, 2));
    assert_eq!(quantity(&ledger, id).await, 2);

    let err = ledger
        .apply(MovementRequest::new(id, Direction::Out, 5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StockError::InsufficientStock { available: 2, requested: 5, .. }
    ));
    assert_eq!(quantity(&ledger, id).await, 2);

    let entry = ledger
        .apply(MovementRequest::new(id, Direction::In, 10))
        .await
        .unwrap();
    assert_eq!((entry.quantity_before, entry.quantity_after), (2, 12));

    let receipt = ledger.reverse(out.id).await.unwrap();
    assert_eq!((receipt.quantity_before, receipt.quantity_after), (12, 15));
    assert_eq!(quantity(&ledger, id).await, 15);

    // The opening entry and the IN 10 remain; 5 + 10 = 15.
    let report = reconcile(ledger.store().as_ref(), id).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.movement_count, 2);
    // Removing the OUT broke the snapshot chain: the IN 10 recorded 2 as its before.
    assert!(!report.is_contiguous());
    assert_eq!(report.audit_gaps[0].movement_id, entry.id);
    assert_eq!(report.audit_gaps[0].expected_before, 5);
    assert_eq!(report.audit_gaps[0].recorded_before, 2);
}

#[tokio::test]
async fn test_apply_records_actor_and_reason() {
    let ledger = ledger();
    let id = product_with(&ledger, 0).await;
    let actor = UserId::new();

    let movement = ledger
        .apply(
            MovementRequest::new(id, Direction::In, 4)
                .with_actor(actor)
                .with_reason("Compra fornecedor"),
        )
        .await
        .unwrap();

    assert_eq!(movement.actor, Some(actor));
    assert_eq!(movement.reason.as_deref(), Some("Compra fornecedor"));
    let stored = ledger.store().find_movement(movement.id).await.unwrap();
    assert_eq!(stored, Some(movement));
}

#[tokio::test]
async fn test_invalid_amount_rejected_before_lock() {
    let ledger = ledger();
    let id = product_with(&ledger, 5).await;

    // Hold the row lock; a zero amount must not wait for it.
    let mut holder = ledger.store().begin().await.unwrap();
    holder.lock_product(id).await.unwrap();

    for amount in [0, -1] {
        let err = ledger
            .apply(MovementRequest::new(id, Direction::In, amount))
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InvalidAmount(a) if a == amount));
    }
    holder.rollback().await.unwrap();

    assert_eq!(quantity(&ledger, id).await, 5);
    assert_eq!(ledger.store().movements_for_product(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_apply_to_missing_product() {
    let ledger = ledger();
    let missing = ProductId::new();
    let err = ledger
        .apply(MovementRequest::new(missing, Direction::In, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::ProductNotFound(p) if p == missing));
}

#[tokio::test]
async fn test_failed_apply_leaves_no_trace() {
    let ledger = ledger();
    let id = product_with(&ledger, 3).await;
    let before = ledger.store().movements_for_product(id).await.unwrap();

    let _ = ledger
        .apply(MovementRequest::new(id, Direction::Out, 4))
        .await
        .unwrap_err();

    assert_eq!(quantity(&ledger, id).await, 3);
    assert_eq!(ledger.store().movements_for_product(id).await.unwrap(), before);
}

#[tokio::test]
async fn test_apply_times_out_on_held_lock() {
    let store = Arc::new(InMemoryStockStore::new(Duration::from_millis(50)));
    let ledger = StockLedger::new(Arc::clone(&store));
    let id = product_with(&ledger, 5).await;

    let mut holder = store.begin().await.unwrap();
    holder.lock_product(id).await.unwrap();

    let err = ledger
        .apply(MovementRequest::new(id, Direction::Out, 1))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, StockError::LockTimeout(p) if p == id));

    holder.rollback().await.unwrap();
    assert_eq!(quantity(&ledger, id).await, 5);
}

#[tokio::test]
async fn test_reverse_in_restores_prior_quantity() {
    let ledger = ledger();
    let id = product_with(&ledger, 7).await;

    let entry = ledger
        .apply(MovementRequest::new(id, Direction::In, 10))
        .await
        .unwrap();
    assert_eq!(quantity(&ledger, id).await, 17);

    ledger.reverse(entry.id).await.unwrap();
    assert_eq!(quantity(&ledger, id).await, 7);
    assert!(ledger.store().find_movement(entry.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reverse_would_go_negative() {
    let ledger = ledger();
    let id = product_with(&ledger, 0).await;

    let entry = ledger
        .apply(MovementRequest::new(id, Direction::In, 10))
        .await
        .unwrap();
    ledger
        .apply(MovementRequest::new(id, Direction::Out, 8))
        .await
        .unwrap();

    let err = ledger.reverse(entry.id).await.unwrap_err();
    assert!(matches!(err, StockError::WouldGoNegative { resulting: -8, .. }));
    assert_eq!(quantity(&ledger, id).await, 2);
    assert!(ledger.store().find_movement(entry.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reverse_unknown_movement() {
    let ledger = ledger();
    let missing = MovementId::new();
    assert!(matches!(
        ledger.reverse(missing).await,
        Err(StockError::MovementNotFound(m)) if m == missing
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reversals_apply_once() {
    const CALLERS: usize = 8;

    let ledger = ledger();
    let id = product_with(&ledger, 0).await;
    let entry = ledger
        .apply(MovementRequest::new(id, Direction::In, 6))
        .await
        .unwrap();

    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let ledger = ledger.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                ledger.reverse(entry.id).await
            })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let reversed = results.iter().filter(|r| r.is_ok()).count();
    let not_found = results
        .iter()
        .filter(|r| matches!(r, Err(StockError::MovementNotFound(_))))
        .count();
    assert_eq!(reversed, 1);
    assert_eq!(not_found, CALLERS - 1);
    assert_eq!(quantity(&ledger, id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_outs_never_oversell() {
    const ON_HAND: i64 = 10;
    const CALLERS: usize = 25;

    let ledger = ledger();
    let id = product_with(&ledger, ON_HAND).await;
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let ledger = ledger.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                ledger
                    .apply(MovementRequest::new(id, Direction::Out, 1))
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(StockError::InsufficientStock { .. })))
        .count();

    assert_eq!(succeeded as i64, ON_HAND);
    assert_eq!(rejected, CALLERS - ON_HAND as usize);
    assert_eq!(quantity(&ledger, id).await, 0);

    let report = reconcile(ledger.store().as_ref(), id).await.unwrap();
    assert!(report.is_consistent());
    assert!(report.is_contiguous());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_products_do_not_block() {
    let store = Arc::new(InMemoryStockStore::new(Duration::from_millis(100)));
    let ledger = StockLedger::new(Arc::clone(&store));
    let busy = product_with(&ledger, 5).await;
    let free = product_with(&ledger, 5).await;

    let mut holder = store.begin().await.unwrap();
    holder.lock_product(busy).await.unwrap();

    ledger
        .apply(MovementRequest::new(free, Direction::Out, 2))
        .await
        .unwrap();
    assert_eq!(quantity(&ledger, free).await, 3);

    holder.rollback().await.unwrap();
}

#[tokio::test]
async fn test_edit_replaces_movement() {
    let ledger = ledger();
    let id = product_with(&ledger, 0).await;
    let actor = UserId::new();

    let entry = ledger
        .apply(
            MovementRequest::new(id, Direction::In, 10)
                .with_actor(actor)
                .with_reason("Inventário"),
        )
        .await
        .unwrap();

    let edited = ledger.edit(entry.id, Direction::In, 4).await.unwrap();
    assert_ne!(edited.id, entry.id);
    assert_eq!(edited.amount, 4);
    assert_eq!(edited.actor, Some(actor));
    assert_eq!(edited.reason.as_deref(), Some("Inventário"));
    assert_eq!((edited.quantity_before, edited.quantity_after), (10, 4));

    assert_eq!(quantity(&ledger, id).await, 4);
    assert!(ledger.store().find_movement(entry.id).await.unwrap().is_none());
    let log = ledger.store().movements_for_product(id).await.unwrap();
    assert_eq!(log, vec![edited]);
}

#[tokio::test]
async fn test_edit_can_flip_direction() {
    let ledger = ledger();
    let id = product_with(&ledger, 10).await;

    let out = ledger
        .apply(MovementRequest::new(id, Direction::Out, 2))
        .await
        .unwrap();
    assert_eq!(quantity(&ledger, id).await, 8);

    ledger.edit(out.id, Direction::In, 2).await.unwrap();
    assert_eq!(quantity(&ledger, id).await, 12);
}

#[tokio::test]
async fn test_edit_raises_entry_after_sales() {
    let ledger = ledger();
    let id = product_with(&ledger, 0).await;
    let entry = ledger
        .apply(MovementRequest::new(id, Direction::In, 10))
        .await
        .unwrap();
    ledger
        .apply(MovementRequest::new(id, Direction::Out, 3))
        .await
        .unwrap();

    // Reversing the entry alone is refused, correcting it upwards is not.
    assert!(matches!(
        ledger.reverse(entry.id).await,
        Err(StockError::WouldGoNegative { resulting: -3, .. })
    ));
    let edited = ledger.edit(entry.id, Direction::In, 20).await.unwrap();
    assert_eq!((edited.quantity_before, edited.quantity_after), (7, 17));
    assert_eq!(quantity(&ledger, id).await, 17);

    let report = reconcile(ledger.store().as_ref(), id).await.unwrap();
    assert!(report.is_consistent());
}

#[tokio::test]
async fn test_edit_rejections_change_nothing() {
    let ledger = ledger();
    let id = product_with(&ledger, 0).await;
    let entry = ledger
        .apply(MovementRequest::new(id, Direction::In, 10))
        .await
        .unwrap();
    ledger
        .apply(MovementRequest::new(id, Direction::Out, 7))
        .await
        .unwrap();

    assert!(matches!(
        ledger.edit(entry.id, Direction::In, 0).await,
        Err(StockError::InvalidAmount(0))
    ));
    // 3 on hand: swapping the entry of 10 for 5 would end at -2.
    assert!(matches!(
        ledger.edit(entry.id, Direction::In, 5).await,
        Err(StockError::WouldGoNegative { resulting: -2, .. })
    ));

    assert_eq!(quantity(&ledger, id).await, 3);
    assert_eq!(
        ledger.store().find_movement(entry.id).await.unwrap().map(|m| m.amount),
        Some(10)
    );
}

#[tokio::test]
async fn test_reconcile_missing_product() {
    let ledger = ledger();
    assert!(matches!(
        reconcile(ledger.store().as_ref(), ProductId::new()).await,
        Err(StockError::ProductNotFound(_))
    ));
}
