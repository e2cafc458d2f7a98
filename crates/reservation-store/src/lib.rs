//! Storage layer for wish-list reservations.
//!
//! Provides the two pieces of contended state and their atomic primitives:
//! the account claim on an item ([`ItemClaimStore`]) and the reservation
//! records ([`ReservationLedger`]), plus read access to wish-list data
//! ([`ItemCatalog`]). Each has an in-memory and a PostgreSQL implementation.

pub mod error;
pub mod item;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod reservation;
pub mod store;
pub mod token;

pub use common::{AccountId, ItemId, Money, ReservationId, WishlistId};
pub use error::{Result, StoreError};
pub use item::{Item, ItemClaim, Wishlist};
pub use memory::InMemoryReservationStore;
pub use postgres::PostgresReservationStore;
pub use query::Page;
pub use reservation::{
    CancelReason, NewReservation, Reservation, ReservationDetail, ReservationStatus, Reserver,
    TransitionOutcome,
};
pub use store::{ItemCatalog, ItemClaimStore, ReservationLedger, ReservationStore};
pub use token::GuestToken;
