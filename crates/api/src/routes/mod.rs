//! API route definitions.

use axum::Router;
use stockroom_core::stock::StockStore;
use stockroom_shared::AppError;

use crate::{ApiError, AppState};

pub mod groups;
pub mod health;
pub mod movements;

/// Creates the API router with all routes.
pub fn api_routes<S: StockStore>() -> Router<AppState<S>> {
    Router::new()
        .merge(health::routes())
        .merge(movements::routes())
        .merge(groups::routes())
        .fallback(not_found)
}

async fn not_found() -> ApiError {
    AppError::NotFound("no such route".to_string()).into()
}
