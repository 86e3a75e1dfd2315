//! Stock movement routes.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{post, put},
};
use serde::Deserialize;
use serde_json::Value;
use stockroom_core::stock::{
    Direction, MovementRequest, MovementView, ReversalReceipt, StockStore,
};
use stockroom_shared::types::{MovementId, ProductId, UserId};
use tracing::info;

use crate::{ApiError, AppState};

/// Creates the movement routes.
pub fn routes<S: StockStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/products/{product_id}/movements", post(create_movement::<S>))
        .route(
            "/movements/{movement_id}",
            put(edit_movement::<S>).delete(delete_movement::<S>),
        )
}

/// Request body for creating a movement.
#[derive(Debug, Deserialize)]
pub struct CreateMovementRequest {
    /// `in` or `out` (`entry`/`exit` also accepted).
    pub direction: String,
    /// Must be a positive integer; any other JSON value is rejected.
    pub amount: Value,
    /// Who is recording the movement.
    pub actor_id: Option<UserId>,
    /// Free-text reason.
    pub reason: Option<String>,
}

/// Request body for editing a movement.
#[derive(Debug, Deserialize)]
pub struct EditMovementRequest {
    /// New direction.
    pub direction: String,
    /// New amount.
    pub amount: Value,
}

fn parse_direction(value: &str) -> Result<Direction, ApiError> {
    Direction::parse(value).ok_or_else(|| {
        ApiError::validation(format!("Invalid direction '{value}'; expected 'in' or 'out'"))
    })
}

/// Accepts only JSON integers; `2.5`, `"3"` and `null` are rejected.
fn parse_amount(value: &Value) -> Result<i64, ApiError> {
    value
        .as_i64()
        .ok_or_else(|| ApiError::invalid_amount(format!("Invalid amount: {value}; amounts must be positive integers")))
}

/// POST `/products/{product_id}/movements` - Apply a movement.
async fn create_movement<S: StockStore>(
    State(state): State<AppState<S>>,
    Path(product_id): Path<ProductId>,
    payload: Result<Json<CreateMovementRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MovementView>), ApiError> {
    let Json(payload) = payload?;
    let direction = parse_direction(&payload.direction)?;
    let amount = parse_amount(&payload.amount)?;

    let mut request = MovementRequest::new(product_id, direction, amount);
    request.actor = payload.actor_id;
    request.reason = payload.reason.filter(|r| !r.trim().is_empty());

    let movement = state.ledger.apply(request).await?;
    Ok((StatusCode::CREATED, Json(movement.into())))
}

/// DELETE `/movements/{movement_id}` - Reverse and remove a movement.
async fn delete_movement<S: StockStore>(
    State(state): State<AppState<S>>,
    Path(movement_id): Path<MovementId>,
) -> Result<Json<ReversalReceipt>, ApiError> {
    let receipt = state.ledger.reverse(movement_id).await?;
    Ok(Json(receipt))
}

/// PUT `/movements/{movement_id}` - Replace a movement's direction and amount.
async fn edit_movement<S: StockStore>(
    State(state): State<AppState<S>>,
    Path(movement_id): Path<MovementId>,
    payload: Result<Json<EditMovementRequest>, JsonRejection>,
) -> Result<Json<MovementView>, ApiError> {
    let Json(payload) = payload?;
    let direction = parse_direction(&payload.direction)?;
    let amount = parse_amount(&payload.amount)?;

    let movement = state.ledger.edit(movement_id, direction, amount).await?;
    info!(
        old_movement_id = %movement_id,
        new_movement_id = %movement.id,
        "Movement replaced via API"
    );
    Ok(Json(movement.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use stockroom_core::stock::{InMemoryStockStore, NewProduct};
    use tower::ServiceExt;

    use crate::create_router;

    async fn setup(opening: i64) -> (AppState<InMemoryStockStore>, ProductId) {
        let state = AppState::new(Arc::new(InMemoryStockStore::default()));
        let product = state
            .ledger
            .store()
            .create_product(NewProduct::named("Clipes", dec!(4.00)))
            .await
            .unwrap();
        if opening > 0 {
            state
                .ledger
                .apply(MovementRequest::new(product.id, Direction::In, opening))
                .await
                .unwrap();
        }
        (state, product.id)
    }

    async fn send(
        state: &AppState<InMemoryStockStore>,
        method: &str,
        uri: String,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn quantity(state: &AppState<InMemoryStockStore>, id: ProductId) -> i64 {
        state.ledger.store().find_product(id).await.unwrap().unwrap().quantity
    }

    #[tokio::test]
    async fn test_create_movement_returns_view() {
        let (state, id) = setup(5).await;

        let (status, body) = send(
            &state,
            "POST",
            format!("/api/v1/products/{id}/movements"),
            Some(json!({"direction": "out", "amount": 3, "reason": "Venda balcão"})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["direction"], "out");
        assert_eq!(body["amount"], 3);
        assert_eq!(body["quantity_before"], 5);
        assert_eq!(body["quantity_after"], 2);
        assert_eq!(body["reason"], "Venda balcão");
        assert_eq!(quantity(&state, id).await, 2);
    }

    #[tokio::test]
    async fn test_insufficient_stock_is_422() {
        let (state, id) = setup(2).await;

        let (status, body) = send(
            &state,
            "POST",
            format!("/api/v1/products/{id}/movements"),
            Some(json!({"direction": "out", "amount": 5})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "INSUFFICIENT_STOCK");
        assert_eq!(quantity(&state, id).await, 2);
    }

    #[tokio::test]
    async fn test_non_integer_amounts_are_invalid() {
        let (state, id) = setup(5).await;

        for amount in [json!(2.5), json!("3"), json!(null), json!(0), json!(-4)] {
            let (status, body) = send(
                &state,
                "POST",
                format!("/api/v1/products/{id}/movements"),
                Some(json!({"direction": "in", "amount": amount})),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount}");
            assert_eq!(body["error"], "INVALID_AMOUNT", "amount {amount}");
        }
        assert_eq!(quantity(&state, id).await, 5);
    }

    #[tokio::test]
    async fn test_unknown_direction_is_validation_error() {
        let (state, id) = setup(5).await;
        let (status, body) = send(
            &state,
            "POST",
            format!("/api/v1/products/{id}/movements"),
            Some(json!({"direction": "sideways", "amount": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_product_is_404() {
        let (state, _) = setup(0).await;
        let (status, body) = send(
            &state,
            "POST",
            format!("/api/v1/products/{}/movements", ProductId::new()),
            Some(json!({"direction": "in", "amount": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_movement_reverses_it() {
        let (state, id) = setup(5).await;
        let out = state
            .ledger
            .apply(MovementRequest::new(id, Direction::Out, 3))
            .await
            .unwrap();

        let (status, body) =
            send(&state, "DELETE", format!("/api/v1/movements/{}", out.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quantity_before"], 2);
        assert_eq!(body["quantity_after"], 5);

        let (status, body) =
            send(&state, "DELETE", format!("/api/v1/movements/{}", out.id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_movement_would_go_negative() {
        let (state, id) = setup(0).await;
        let entry = state
            .ledger
            .apply(MovementRequest::new(id, Direction::In, 4))
            .await
            .unwrap();
        state
            .ledger
            .apply(MovementRequest::new(id, Direction::Out, 3))
            .await
            .unwrap();

        let (status, body) =
            send(&state, "DELETE", format!("/api/v1/movements/{}", entry.id), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "WOULD_GO_NEGATIVE");
        assert_eq!(quantity(&state, id).await, 1);
    }

    #[tokio::test]
    async fn test_edit_movement() {
        let (state, id) = setup(0).await;
        let entry = state
            .ledger
            .apply(MovementRequest::new(id, Direction::In, 10))
            .await
            .unwrap();

        let (status, body) = send(
            &state,
            "PUT",
            format!("/api/v1/movements/{}", entry.id),
            Some(json!({"direction": "in", "amount": 6})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["amount"], 6);
        assert_eq!(body["quantity_after"], 6);
        assert_ne!(body["id"], json!(entry.id));
        assert_eq!(quantity(&state, id).await, 6);

        let (status, body) = send(
            &state,
            "PUT",
            format!("/api/v1/movements/{}", MovementId::new()),
            Some(json!({"direction": "in", "amount": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let (state, id) = setup(0).await;
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/products/{id}/movements"))
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = create_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
