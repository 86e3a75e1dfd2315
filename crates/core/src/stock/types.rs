//! Stock ledger domain types.
//!
//! A [`Product`] carries the materialized quantity; a [`Movement`] is one
//! immutable fact in the append-only log that produced it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockroom_shared::types::{GroupId, MovementId, ProductId, UserId};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Stock entering (increases quantity).
    In,
    /// Stock leaving (decreases quantity).
    Out,
}

impl Direction {
    /// Returns the quantity delta of applying `amount` in this direction.
    #[must_use]
    pub const fn delta(self, amount: i64) -> i64 {
        match self {
            Self::In => amount,
            Self::Out => -amount,
        }
    }

    /// Returns the quantity delta that cancels a movement of `amount` in this direction.
    #[must_use]
    pub const fn inverse_delta(self, amount: i64) -> i64 {
        -self.delta(amount)
    }

    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }

    /// Parses a direction name, case-insensitively.
    ///
    /// Accepts `in`/`out` as well as the `entry`/`exit` aliases.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in" | "entry" => Some(Self::In),
            "out" | "exit" => Some(Self::Out),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product with its current cached quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identity.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Unit price.
    pub price: Decimal,
    /// Materialized quantity; only the ledger changes it.
    pub quantity: i64,
    /// Quantity below which the product should be restocked.
    pub restock_threshold: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns true if a restock threshold is set and the quantity is under it.
    #[must_use]
    pub fn needs_restock(&self) -> bool {
        self.below_threshold(self.quantity)
    }

    /// Returns true if `quantity` would be under the restock threshold.
    #[must_use]
    pub fn below_threshold(&self, quantity: i64) -> bool {
        self.restock_threshold
            .is_some_and(|threshold| threshold > 0 && quantity < threshold)
    }
}

/// Input for registering a product in the catalog.
///
/// Products always start at quantity zero; opening stock is an `In` movement.
#[derive(Debug, Clone)]
pub struct NewProduct {
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Unit price.
    pub price: Decimal,
    /// Optional restock threshold.
    pub restock_threshold: Option<i64>,
}

impl NewProduct {
    /// Creates a product input with an empty description and no threshold.
    #[must_use]
    pub fn named(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            restock_threshold: None,
        }
    }
}

/// One immutable stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Movement identity.
    pub id: MovementId,
    /// The product this movement affects.
    pub product_id: ProductId,
    /// In or out.
    pub direction: Direction,
    /// Positive amount.
    pub amount: i64,
    /// Who caused the movement, for audit only.
    pub actor: Option<UserId>,
    /// Optional free-text reason.
    pub reason: Option<String>,
    /// When the movement was recorded.
    pub created_at: DateTime<Utc>,
    /// Product quantity right before this movement was applied.
    pub quantity_before: i64,
    /// Product quantity right after this movement was applied.
    pub quantity_after: i64,
}

impl Movement {
    /// Returns the signed quantity delta of this movement.
    #[must_use]
    pub const fn delta(&self) -> i64 {
        self.direction.delta(self.amount)
    }
}

/// Request to apply a new movement.
#[derive(Debug, Clone)]
pub struct MovementRequest {
    /// Target product.
    pub product_id: ProductId,
    /// In or out.
    pub direction: Direction,
    /// Requested amount; must be positive.
    pub amount: i64,
    /// Who is applying the movement.
    pub actor: Option<UserId>,
    /// Optional free-text reason.
    pub reason: Option<String>,
}

impl MovementRequest {
    /// Builds a request with no actor and no reason.
    #[must_use]
    pub const fn new(product_id: ProductId, direction: Direction, amount: i64) -> Self {
        Self {
            product_id,
            direction,
            amount,
            actor: None,
            reason: None,
        }
    }

    /// Sets the actor.
    #[must_use]
    pub fn with_actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Acknowledgement of a reversed (deleted) movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReversalReceipt {
    /// The movement that was removed.
    pub movement_id: MovementId,
    /// The product whose quantity was restored.
    pub product_id: ProductId,
    /// Quantity before the reversal.
    pub quantity_before: i64,
    /// Quantity after the reversal.
    pub quantity_after: i64,
}

/// Serializable movement representation for the external interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementView {
    /// Movement ID.
    pub id: MovementId,
    /// Product ID.
    pub product_id: ProductId,
    /// `in` or `out`.
    pub direction: Direction,
    /// Amount moved.
    pub amount: i64,
    /// Actor, if recorded.
    pub actor_id: Option<UserId>,
    /// Reason, if recorded.
    pub reason: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Audit: quantity before.
    pub quantity_before: i64,
    /// Audit: quantity after.
    pub quantity_after: i64,
}

impl From<Movement> for MovementView {
    fn from(m: Movement) -> Self {
        Self {
            id: m.id,
            product_id: m.product_id,
            direction: m.direction,
            amount: m.amount,
            actor_id: m.actor,
            reason: m.reason,
            created_at: m.created_at.to_rfc3339(),
            quantity_before: m.quantity_before,
            quantity_after: m.quantity_after,
        }
    }
}

/// A group (table of products) a product may belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identity.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
