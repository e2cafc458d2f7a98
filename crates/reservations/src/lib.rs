//! Reservation coordination for shared wish lists.
//!
//! This crate turns the store's atomic primitives into the public
//! reservation operations:
//! 1. Reserve an item, for an account (claim, then record) or a guest
//! 2. Cancel, purchase, or remove a reservation
//! 3. Report an item's availability, expiring stale guest reservations
//!
//! No step takes an in-process lock. Races are settled by conditional writes
//! in the store, and a failed step after a successful claim is compensated by
//! releasing that claim.

pub mod commands;
pub mod coordinator;
pub mod error;
pub mod expiration;
pub mod services;
pub mod views;

pub use commands::{CancelReservation, CreateReservation, MarkPurchased, ReservationTarget};
pub use coordinator::{DEFAULT_STORE_TIMEOUT, ReservationCoordinator};
pub use error::ReservationError;
pub use expiration::{ExpirationPolicy, ExpirationSweeper, SweeperHandle};
pub use services::{
    InMemoryNotifier, LogNotifier, NotificationError, NotificationKind, Notifier,
    SentNotification,
};
pub use views::{
    ACCOUNT_DISPLAY_NAME, DisplayStatus, ItemAvailability, ReservationSummary, display_name,
};
