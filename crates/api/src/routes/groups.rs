//! Grouping boundary routes.
//!
//! These are the only places a product can lose its last group, so both run
//! the cleanup before responding.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::delete,
};
use stockroom_core::cleanup::{GroupCleanupReport, MembershipRemoval};
use stockroom_core::stock::StockStore;
use stockroom_shared::types::{GroupId, ProductId};

use crate::{ApiError, AppState};

/// Creates the group routes.
pub fn routes<S: StockStore>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/groups/{group_id}/products/{product_id}",
            delete(remove_membership::<S>),
        )
        .route("/groups/{group_id}", delete(delete_group::<S>))
}

/// DELETE `/groups/{group_id}/products/{product_id}` - Remove a product from a group.
async fn remove_membership<S: StockStore>(
    State(state): State<AppState<S>>,
    Path((group_id, product_id)): Path<(GroupId, ProductId)>,
) -> Result<Json<MembershipRemoval>, ApiError> {
    let removal = state.groups.remove_membership(product_id, group_id).await?;
    Ok(Json(removal))
}

/// DELETE `/groups/{group_id}` - Delete a group and its orphaned products.
async fn delete_group<S: StockStore>(
    State(state): State<AppState<S>>,
    Path(group_id): Path<GroupId>,
) -> Result<Json<GroupCleanupReport>, ApiError> {
    let report = state.groups.delete_group(group_id).await?;
    Ok(Json(report))
}
