//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST routes for applying, reversing and editing stock movements
//! - The grouping boundary routes that trigger product cleanup
//! - JSON error responses carrying stable error codes

pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use stockroom_core::cleanup::GroupMembershipService;
use stockroom_core::stock::{StockLedger, StockStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across handlers.
pub struct AppState<S> {
    /// The stock ledger engine.
    pub ledger: StockLedger<S>,
    /// Group membership changes with inline cleanup.
    pub groups: GroupMembershipService<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            groups: self.groups.clone(),
        }
    }
}

impl<S: StockStore> AppState<S> {
    /// Builds the state over a shared store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            ledger: StockLedger::new(Arc::clone(&store)),
            groups: GroupMembershipService::new(store),
        }
    }
}

/// Creates the main application router.
pub fn create_router<S: StockStore>(state: AppState<S>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
