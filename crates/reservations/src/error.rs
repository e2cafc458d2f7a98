//! Reservation error types.

use reservation_store::StoreError;
use thiserror::Error;

/// Errors returned by the reservation coordinator.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// A supplied identifier or field was malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another account already holds the item.
    #[error("Item is already claimed")]
    AlreadyClaimed,

    /// The item already has an active reservation.
    #[error("Item is already reserved")]
    AlreadyReserved,

    /// The item does not exist on the given wish list.
    #[error("Item not found in wish list")]
    ItemNotInWishlist,

    /// No reservation matches the caller's identity.
    #[error("Reservation not found")]
    ReservationNotFound,

    /// Guest reservations need both a name and an email.
    #[error("Guest name and email are required")]
    GuestInfoRequired,

    /// The caller supplied neither an account nor a reservation token.
    #[error("An account or a reservation token is required")]
    MissingUserOrToken,

    /// The storage layer failed or did not answer in time.
    #[error("Storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}

impl ReservationError {
    /// Wraps a store failure, translating the outcomes callers can act on.
    pub fn from_store(operation: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::AlreadyClaimed(_) => ReservationError::AlreadyClaimed,
            StoreError::AlreadyReserved(_) => ReservationError::AlreadyReserved,
            // The item vanished between the containment check and the write
            StoreError::ItemNotFound(_) => ReservationError::ItemNotInWishlist,
            StoreError::ReservationNotFound(_) => ReservationError::ReservationNotFound,
            other => ReservationError::Storage {
                operation,
                message: other.to_string(),
            },
        }
    }

    /// Returns true for errors caused by losing a race for an item.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ReservationError::AlreadyClaimed | ReservationError::AlreadyReserved
        )
    }
}

/// Convenience type alias for coordinator results.
pub type Result<T> = std::result::Result<T, ReservationError>;
