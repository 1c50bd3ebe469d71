use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Domain and infrastructure errors for the reservation engine.
///
/// Domain variants carry a stable machine code surfaced to callers;
/// infrastructure variants (`Database`, `Redis`, `Internal`) are logged and
/// masked to `INTERNAL`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("slot is currently locked by another request")]
    SlotLocked,
    #[error("user not found or inactive")]
    UserNotFound,
    #[error("maximum number of concurrent bookings reached")]
    MaxBookingsReached,
    #[error("slot not found")]
    SlotNotFound,
    #[error("slot is blocked")]
    SlotBlocked,
    #[error("requested guest count exceeds remaining capacity")]
    InsufficientCapacity,
    #[error("slot has already ended")]
    SlotInPast,
    #[error("slot is beyond the booking horizon")]
    AdvanceLimitExceeded,
    #[error("user already has a confirmed booking for this slot")]
    DuplicateBooking,
    #[error("booking not found")]
    BookingNotFound,
    #[error("caller is not allowed to perform this operation")]
    Unauthorized,
    #[error("booking can no longer be cancelled")]
    CancellationNotAllowed,
    #[error("invalid input: {0}")]
    Validation(String),
    /// Storage rejected the transaction with a serialization conflict.
    /// The coordinator retries once before surfacing `SlotLocked`.
    #[error("storage serialization conflict")]
    Serialization,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine code for surface translation.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::SlotLocked | AppError::Serialization => "SLOT_LOCKED",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::MaxBookingsReached => "MAX_BOOKINGS_REACHED",
            AppError::SlotNotFound => "SLOT_NOT_FOUND",
            AppError::SlotBlocked => "SLOT_BLOCKED",
            AppError::InsufficientCapacity => "INSUFFICIENT_CAPACITY",
            AppError::SlotInPast => "SLOT_IN_PAST",
            AppError::AdvanceLimitExceeded => "ADVANCE_LIMIT_EXCEEDED",
            AppError::DuplicateBooking => "DUPLICATE_BOOKING",
            AppError::BookingNotFound => "BOOKING_NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::CancellationNotAllowed => "CANCELLATION_NOT_ALLOWED",
            AppError::Validation(_) => "VALIDATION",
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::SlotLocked | AppError::Serialization | AppError::DuplicateBooking => {
                StatusCode::CONFLICT
            }
            AppError::UserNotFound | AppError::SlotNotFound | AppError::BookingNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::MaxBookingsReached => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::SlotBlocked
            | AppError::InsufficientCapacity
            | AppError::SlotInPast
            | AppError::AdvanceLimitExceeded
            | AppError::CancellationNotAllowed
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                "Internal error".to_string()
            }
            AppError::Redis(e) => {
                error!("Redis error: {:?}", e);
                "Internal error".to_string()
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": { "code": code, "message": message }
        }));

        (status, body).into_response()
    }
}

/// Classifies transaction failures the coordinator may retry.
///
/// Postgres reports SERIALIZABLE conflicts as SQLSTATE 40001 and deadlocks
/// as 40P01; both roll the whole attempt back.
pub fn map_tx_error(e: sqlx::Error) -> AppError {
    if let Some(db_err) = e.as_database_error() {
        let code = db_err.code().unwrap_or_default();
        if code == "40001" || code == "40P01" {
            return AppError::Serialization;
        }
    }
    AppError::Database(e)
}
