//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reservations::ReservationError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Reservation operation error.
    Reservation(ReservationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Reservation(err) => reservation_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn reservation_error_to_response(err: ReservationError) -> (StatusCode, String) {
    match &err {
        ReservationError::InvalidInput(_)
        | ReservationError::GuestInfoRequired
        | ReservationError::MissingUserOrToken => (StatusCode::BAD_REQUEST, err.to_string()),
        ReservationError::AlreadyClaimed | ReservationError::AlreadyReserved => {
            // Losing a race for an item is routine
            tracing::debug!(error = %err, "reservation conflict");
            (StatusCode::CONFLICT, err.to_string())
        }
        ReservationError::ItemNotInWishlist | ReservationError::ReservationNotFound => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        ReservationError::Storage { .. } => {
            tracing::error!(error = %err, "internal server error");
            metrics::counter!("api_internal_errors_total").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        ApiError::Reservation(err)
    }
}
