//! `SeaORM` entity definitions.

pub mod prelude;

pub mod group_memberships;
pub mod movements;
pub mod product_groups;
pub mod products;
pub mod sea_orm_active_enums;
