//! Property-based tests for the stock ledger.
//!
//! - Quantity always equals Σ IN − Σ OUT over the persisted log
//! - Quantity never goes negative
//! - Audit snapshots never change after creation
//! - apply followed by reverse restores the prior quantity

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rust_decimal_macros::dec;
use stockroom_shared::types::{MovementId, ProductId};

use super::engine::StockLedger;
use super::error::StockError;
use super::memory::InMemoryStockStore;
use super::store::StockStore;
use super::types::{Direction, Movement, MovementRequest, NewProduct};
use super::validation::replay;

#[derive(Debug, Clone)]
enum Op {
    Apply(Direction, i64),
    /// Reverse the n-th (mod len) live movement.
    Reverse(usize),
    /// Edit the n-th (mod len) live movement.
    Edit(usize, Direction, i64),
}

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::In), Just(Direction::Out)]
}

/// Mostly valid amounts, with zero and negatives mixed in.
fn amount() -> impl Strategy<Value = i64> {
    prop_oneof![
        8 => 1i64..50,
        1 => -5i64..=0,
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (direction(), amount()).prop_map(|(d, a)| Op::Apply(d, a)),
        2 => any::<usize>().prop_map(Op::Reverse),
        2 => (any::<usize>(), direction(), amount()).prop_map(|(i, d, a)| Op::Edit(i, d, a)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn setup() -> (StockLedger<InMemoryStockStore>, tokio::runtime::Runtime) {
    let store = InMemoryStockStore::new(Duration::from_secs(1));
    (StockLedger::new(Arc::new(store)), runtime())
}

async fn new_product(ledger: &StockLedger<InMemoryStockStore>) -> ProductId {
    ledger
        .store()
        .create_product(NewProduct::named("Borracha", dec!(1.20)))
        .await
        .unwrap()
        .id
}

async fn current(ledger: &StockLedger<InMemoryStockStore>, id: ProductId) -> (i64, Vec<Movement>) {
    let quantity = ledger.store().find_product(id).await.unwrap().unwrap().quantity;
    let log = ledger.store().movements_for_product(id).await.unwrap();
    (quantity, log)
}

proptest! {
    /// Any sequence of apply/reverse/edit keeps quantity equal to the log replay
    /// and non-negative, and never rewrites an existing audit snapshot.
    #[test]
    fn prop_quantity_matches_log(ops in prop::collection::vec(op(), 1..40)) {
        let (ledger, rt) = setup();
        rt.block_on(async {
            let id = new_product(&ledger).await;
            let mut snapshots: HashMap<MovementId, (i64, i64)> = HashMap::new();

            for op in ops {
                let (_, log) = current(&ledger, id).await;
                let result = match op {
                    Op::Apply(direction, amount) => ledger
                        .apply(MovementRequest::new(id, direction, amount))
                        .await
                        .map(|_| ()),
                    Op::Reverse(n) if !log.is_empty() => {
                        ledger.reverse(log[n % log.len()].id).await.map(|_| ())
                    }
                    Op::Edit(n, direction, amount) if !log.is_empty() => ledger
                        .edit(log[n % log.len()].id, direction, amount)
                        .await
                        .map(|_| ()),
                    Op::Reverse(_) | Op::Edit(..) => Ok(()),
                };

                if let Err(err) = &result {
                    prop_assert!(err.is_business_rule(), "unexpected error: {err}");
                }

                let (quantity, log) = current(&ledger, id).await;
                prop_assert!(quantity >= 0);
                prop_assert_eq!(Some(quantity), replay(&log));

                for movement in &log {
                    let snapshot = (movement.quantity_before, movement.quantity_after);
                    let recorded = *snapshots.entry(movement.id).or_insert(snapshot);
                    prop_assert_eq!(recorded, snapshot);
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// apply(IN, a) then reverse restores the prior quantity.
    #[test]
    fn prop_reverse_undoes_in(opening in 0i64..1_000, amount in 1i64..1_000) {
        let (ledger, rt) = setup();
        rt.block_on(async {
            let id = new_product(&ledger).await;
            if opening > 0 {
                ledger.apply(MovementRequest::new(id, Direction::In, opening)).await.unwrap();
            }

            let entry = ledger.apply(MovementRequest::new(id, Direction::In, amount)).await.unwrap();
            prop_assert_eq!(entry.quantity_after, opening + amount);

            let receipt = ledger.reverse(entry.id).await.unwrap();
            prop_assert_eq!(receipt.quantity_after, opening);
            prop_assert_eq!(current(&ledger, id).await.0, opening);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// An OUT larger than the quantity on hand is rejected and changes nothing.
    #[test]
    fn prop_oversized_out_rejected(opening in 0i64..500, extra in 1i64..500) {
        let (ledger, rt) = setup();
        rt.block_on(async {
            let id = new_product(&ledger).await;
            if opening > 0 {
                ledger.apply(MovementRequest::new(id, Direction::In, opening)).await.unwrap();
            }
            let before = current(&ledger, id).await;

            let result = ledger
                .apply(MovementRequest::new(id, Direction::Out, opening + extra))
                .await;
            let is_insufficient = matches!(result, Err(StockError::InsufficientStock { .. }));
            prop_assert!(is_insufficient);
            prop_assert_eq!(current(&ledger, id).await, before);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
