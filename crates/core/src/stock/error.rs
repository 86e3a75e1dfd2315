//! Stock ledger error types.
//!
//! Business-rule rejections (`InvalidAmount`, `InsufficientStock`,
//! `WouldGoNegative`) are ordinary typed results for the caller. Only the
//! infrastructure variants warrant retry or backoff.

use stockroom_shared::AppError;
use stockroom_shared::types::{GroupId, MovementId, ProductId};
use thiserror::Error;

/// Errors that can occur during stock ledger operations.
#[derive(Debug, Error)]
pub enum StockError {
    // ========== Validation Errors ==========
    /// Amount is zero, negative, or does not fit the quantity range.
    #[error("Invalid amount: {0}; amounts must be positive integers")]
    InvalidAmount(i64),

    // ========== Lookup Errors ==========
    /// Product not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Movement not found.
    #[error("Movement not found: {0}")]
    MovementNotFound(MovementId),

    /// Group not found.
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    // ========== Business Rule Errors ==========
    /// Applying the movement would make the quantity negative.
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        /// The product.
        product_id: ProductId,
        /// Quantity on hand when the lock was taken.
        available: i64,
        /// Amount requested out.
        requested: i64,
    },

    /// Reversing or editing the movement would make the quantity negative.
    #[error("Reversing movement {movement_id} would leave quantity {resulting} on product {product_id}")]
    WouldGoNegative {
        /// The movement being reversed or edited.
        movement_id: MovementId,
        /// The affected product.
        product_id: ProductId,
        /// The quantity the operation would have produced.
        resulting: i64,
    },

    // ========== Infrastructure Errors ==========
    /// The product row lock could not be acquired in time.
    #[error("Timed out waiting for the lock on product {0}, please retry")]
    LockTimeout(ProductId),

    /// The store aborted the transaction because of concurrent writers.
    #[error("Concurrent modification detected, please retry: {0}")]
    Contention(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StockError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::ProductNotFound(_) | Self::MovementNotFound(_) | Self::GroupNotFound(_) => {
                "NOT_FOUND"
            }
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::WouldGoNegative { .. } => "WOULD_GO_NEGATIVE",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::Contention(_) => "CONTENTION",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::InvalidAmount(_) => 400,

            // 404 Not Found
            Self::ProductNotFound(_) | Self::MovementNotFound(_) | Self::GroupNotFound(_) => 404,

            // 422 Unprocessable - the request is well-formed but current stock forbids it
            Self::InsufficientStock { .. } | Self::WouldGoNegative { .. } => 422,

            // 503 Service Unavailable - retryable contention
            Self::LockTimeout(_) | Self::Contention(_) => 503,

            // 500 Internal Server Error
            Self::Storage(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_) | Self::Contention(_))
    }

    /// Returns true for rejections caused by business rules rather than faults.
    #[must_use]
    pub const fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_) | Self::InsufficientStock { .. } | Self::WouldGoNegative { .. }
        )
    }
}

impl From<StockError> for AppError {
    fn from(err: StockError) -> Self {
        let message = err.to_string();
        match err {
            StockError::InvalidAmount(_) => Self::Validation(message),
            StockError::ProductNotFound(_)
            | StockError::MovementNotFound(_)
            | StockError::GroupNotFound(_) => Self::NotFound(message),
            StockError::InsufficientStock { .. } | StockError::WouldGoNegative { .. } => {
                Self::BusinessRule(message)
            }
            StockError::LockTimeout(_) | StockError::Contention(_) => Self::Unavailable(message),
            StockError::Storage(_) => Self::Database(message),
        }
    }
}
