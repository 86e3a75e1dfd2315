//! Stock ledger schema.
//!
//! Creates products, movements, groups and memberships. Non-negative quantity
//! and positive amounts are enforced by CHECK constraints; movement rows are
//! immutable once written.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: TABLES
        // ============================================================
        db.execute_unprepared(PRODUCTS_SQL).await?;
        db.execute_unprepared(MOVEMENTS_SQL).await?;
        db.execute_unprepared(GROUPS_SQL).await?;

        // ============================================================
        // PART 3: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE movement_direction AS ENUM ('in', 'out');
";

const PRODUCTS_SQL: &str = r"
CREATE TABLE products (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    price NUMERIC(12, 2) NOT NULL DEFAULT 0,
    quantity BIGINT NOT NULL DEFAULT 0,
    restock_threshold BIGINT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_products_quantity_non_negative CHECK (quantity >= 0),
    CONSTRAINT chk_products_price_non_negative CHECK (price >= 0),
    CONSTRAINT chk_products_threshold_non_negative CHECK (restock_threshold IS NULL OR restock_threshold >= 0)
);

CREATE INDEX idx_products_name ON products(name);
";

const MOVEMENTS_SQL: &str = r"
CREATE TABLE movements (
    id UUID PRIMARY KEY,
    product_id UUID NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    direction movement_direction NOT NULL,
    amount BIGINT NOT NULL,
    actor_id UUID,
    reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    quantity_before BIGINT NOT NULL,
    quantity_after BIGINT NOT NULL,
    CONSTRAINT chk_movements_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_movements_snapshot_non_negative CHECK (quantity_before >= 0 AND quantity_after >= 0)
);

-- Log of one product in creation order
CREATE INDEX idx_movements_product ON movements(product_id, created_at, id);
";

const GROUPS_SQL: &str = r"
CREATE TABLE product_groups (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE group_memberships (
    product_id UUID NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    group_id UUID NOT NULL REFERENCES product_groups(id) ON DELETE CASCADE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (product_id, group_id)
);

-- Members of one group
CREATE INDEX idx_group_memberships_group ON group_memberships(group_id, product_id);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: prevent_movement_update
-- Movements are corrected by delete + insert, never in place
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_movement_update()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Movements are immutable. Reverse the movement and record a new one instead.';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_prevent_movement_update
BEFORE UPDATE ON movements
FOR EACH ROW
EXECUTE FUNCTION prevent_movement_update();
";

const DROP_ALL_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_prevent_movement_update ON movements;
DROP FUNCTION IF EXISTS prevent_movement_update();

DROP TABLE IF EXISTS group_memberships CASCADE;
DROP TABLE IF EXISTS product_groups CASCADE;
DROP TABLE IF EXISTS movements CASCADE;
DROP TABLE IF EXISTS products CASCADE;

DROP TYPE IF EXISTS movement_direction;
";
