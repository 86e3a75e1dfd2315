//! `SeaORM` entity prelude.

pub use super::group_memberships::Entity as GroupMemberships;
pub use super::movements::Entity as Movements;
pub use super::product_groups::Entity as ProductGroups;
pub use super::products::Entity as Products;
