//! JSON error responses.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use stockroom_core::stock::StockError;
use stockroom_shared::AppError;
use tracing::{error, warn};

/// An error rendered as `{"error": "<CODE>", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Creates an error response.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 400 with the `INVALID_AMOUNT` code.
    #[must_use]
    pub fn invalid_amount(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", message)
    }

    /// 400 with the `VALIDATION_ERROR` code.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    /// Returns the HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

fn status_from(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<StockError> for ApiError {
    fn from(err: StockError) -> Self {
        let status = status_from(err.http_status_code());

        if let StockError::Storage(_) = &err {
            error!(error = %err, "Stock store failure");
            return Self::new(status, err.error_code(), "An internal error occurred");
        }
        if err.is_retryable() {
            warn!(error = %err, "Retryable stock ledger failure");
        }

        Self::new(status, err.error_code(), err.to_string())
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = status_from(err.status_code());
        if status.is_server_error() {
            error!(error = %err, "Request failed");
        }
        Self::new(status, err.error_code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.code,
                "message": self.message,
            })),
        )
            .into_response()
    }
}
