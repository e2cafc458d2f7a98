use thiserror::Error;

use crate::{ItemId, ReservationId, ReservationStatus};

/// Errors that can occur when interacting with the reservation store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The item is already claimed by an authenticated account.
    #[error("Item {0} is already claimed")]
    AlreadyClaimed(ItemId),

    /// An active reservation already exists for the item.
    #[error("Item {0} already has an active reservation")]
    AlreadyReserved(ItemId),

    /// The item does not exist.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// A transition was requested into a status that is not terminal.
    #[error("Invalid transition target: {0}")]
    InvalidTransition(ReservationStatus),

    /// A stored value could not be mapped back into the domain model.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true for the errors produced by losing a race for an item.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::AlreadyClaimed(_) | StoreError::AlreadyReserved(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
