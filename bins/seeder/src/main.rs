//! Database seeder for Stockroom development and testing.
//!
//! Seeds a small catalog: groups, products with opening stock recorded as
//! `In` movements, and a few sales. Finishes by reconciling every product.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use stockroom_core::stock::{
    Direction, MovementRequest, NewProduct, StockLedger, StockStore, reconcile,
};
use stockroom_db::{StockRepository, connect, repositories::all_product_ids};
use stockroom_shared::AppConfig;

/// (name, price in cents, restock threshold, opening stock, units sold, group index)
const CATALOG: [(&str, i64, Option<i64>, i64, i64, usize); 6] = [
    ("Caneta azul", 250, Some(20), 120, 35, 0),
    ("Caderno 96 folhas", 1_890, Some(10), 40, 12, 0),
    ("Grampeador", 2_450, None, 8, 3, 0),
    ("Detergente neutro", 349, Some(24), 60, 40, 1),
    ("Esponja dupla face", 199, Some(30), 100, 15, 1),
    ("Papel toalha", 1_290, Some(12), 18, 9, 1),
];

const GROUPS: [&str; 2] = ["Papelaria", "Limpeza"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    println!("Connecting to database...");
    let db = connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    let store = Arc::new(StockRepository::from_config(db, &config.ledger));
    let ledger = StockLedger::new(Arc::clone(&store));

    println!("Seeding groups...");
    let mut groups = Vec::with_capacity(GROUPS.len());
    for name in GROUPS {
        let group = store.create_group(name).await?;
        println!("  Created group: {name}");
        groups.push(group);
    }

    println!("Seeding products...");
    for (name, cents, threshold, opening, sold, group) in CATALOG {
        let mut input = NewProduct::named(name, Decimal::new(cents, 2));
        input.restock_threshold = threshold;
        let product = store.create_product(input).await?;
        store.add_membership(product.id, groups[group].id).await?;

        ledger
            .apply(
                MovementRequest::new(product.id, Direction::In, opening)
                    .with_reason("Estoque inicial"),
            )
            .await?;
        let sale = ledger
            .apply(MovementRequest::new(product.id, Direction::Out, sold).with_reason("Venda"))
            .await?;

        println!(
            "  Created product: {name} ({} on hand)",
            sale.quantity_after
        );
    }

    println!("Reconciling...");
    let ids = all_product_ids(store.connection()).await?;
    let mut inconsistent = 0;
    for id in ids {
        let report = reconcile(store.as_ref(), id).await?;
        if !report.is_consistent() || !report.is_contiguous() {
            inconsistent += 1;
            eprintln!(
                "  Product {id}: cached {} vs replayed {} ({} audit gaps)",
                report.cached_quantity,
                report.replayed_quantity,
                report.audit_gaps.len()
            );
        }
    }
    println!("  {inconsistent} inconsistent products");

    println!("Seeding complete!");
    Ok(())
}
