//! `SeaORM` active enums mapped to `PostgreSQL` enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use stockroom_core::stock::Direction;

/// `movement_direction` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "movement_direction")]
pub enum MovementDirection {
    /// Stock entering.
    #[sea_orm(string_value = "in")]
    In,
    /// Stock leaving.
    #[sea_orm(string_value = "out")]
    Out,
}

impl From<Direction> for MovementDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::In => Self::In,
            Direction::Out => Self::Out,
        }
    }
}

impl From<MovementDirection> for Direction {
    fn from(direction: MovementDirection) -> Self {
        match direction {
            MovementDirection::In => Self::In,
            MovementDirection::Out => Self::Out,
        }
    }
}
