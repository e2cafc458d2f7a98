//! Shared types for the wish-list reservation system.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{AccountId, ItemId, ReservationId, WishlistId};
