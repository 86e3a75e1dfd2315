//! Health check endpoint.
//!
//! Reports whether the stock store accepts transactions: a transaction is
//! opened and rolled back without touching any row.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use stockroom_core::stock::{StockStore, StockTx};
use tracing::warn;

use crate::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// `reachable` or `unreachable`.
    pub store: &'static str,
}

async fn probe_store<S: StockStore>(store: &S) -> bool {
    match store.begin().await {
        Ok(tx) => tx.rollback().await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Stock store unreachable");
            false
        }
    }
}

/// GET `/health` - 200 when the store is reachable, 503 otherwise.
async fn health_check<S: StockStore>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<HealthResponse>) {
    let reachable = probe_store(state.ledger.store().as_ref()).await;
    let (status, health, store) = if reachable {
        (StatusCode::OK, "healthy", "reachable")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unreachable")
    };

    (
        status,
        Json(HealthResponse {
            status: health,
            version: env!("CARGO_PKG_VERSION"),
            store,
        }),
    )
}

/// Creates health check routes.
pub fn routes<S: StockStore>() -> Router<AppState<S>> {
    Router::new().route("/health", get(health_check::<S>))
}
