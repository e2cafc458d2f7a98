//! Read models returned to callers.

use chrono::{DateTime, Utc};
use reservation_store::{
    CancelReason, ItemId, Reservation, ReservationDetail, ReservationId, ReservationStatus,
    Reserver, WishlistId,
};
use serde::Serialize;

/// Shown in place of an account holder's identity on public pages.
pub const ACCOUNT_DISPLAY_NAME: &str = "A registered user";

/// Public availability of an item, as shown on a shared wish list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemAvailability {
    Available,
    Reserved {
        reserved_by: String,
        reserved_at: DateTime<Utc>,
    },
    Purchased {
        reserved_by: String,
        purchased_at: DateTime<Utc>,
    },
}

impl ItemAvailability {
    /// Describes an active reservation without exposing account identity or
    /// any email address.
    pub fn from_active(reservation: &Reservation) -> Self {
        let reserved_by = display_name(reservation);
        match reservation.purchased_at {
            Some(purchased_at) => ItemAvailability::Purchased {
                reserved_by,
                purchased_at,
            },
            None => ItemAvailability::Reserved {
                reserved_by,
                reserved_at: reservation.reserved_at,
            },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ItemAvailability::Available)
    }
}

/// The name a reservation may be shown under publicly.
pub fn display_name(reservation: &Reservation) -> String {
    match &reservation.reserver {
        Reserver::Guest { name, .. } => name.clone(),
        Reserver::Account(_) => ACCOUNT_DISPLAY_NAME.to_string(),
    }
}

/// Lifecycle state as presented in reservation listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Reserved,
    Purchased,
    Cancelled,
    Expired,
}

impl DisplayStatus {
    pub fn of(reservation: &Reservation) -> Self {
        match reservation.status {
            ReservationStatus::Active if reservation.is_purchased() => DisplayStatus::Purchased,
            ReservationStatus::Active => DisplayStatus::Reserved,
            ReservationStatus::Cancelled => DisplayStatus::Cancelled,
            ReservationStatus::Expired => DisplayStatus::Expired,
        }
    }
}

/// One row of a "my reservations" listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationSummary {
    pub reservation_id: ReservationId,
    pub item_id: ItemId,
    pub item_name: String,
    /// Formatted for display, e.g. `$12.50` or `12.50 EUR`.
    pub price: Option<String>,
    pub wishlist_id: WishlistId,
    pub wishlist_title: String,
    pub wishlist_slug: Option<String>,
    pub status: DisplayStatus,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<CancelReason>,
    pub purchased_at: Option<DateTime<Utc>>,
}

impl From<ReservationDetail> for ReservationSummary {
    fn from(detail: ReservationDetail) -> Self {
        let status = DisplayStatus::of(&detail.reservation);
        let reservation = detail.reservation;
        Self {
            reservation_id: reservation.id,
            item_id: reservation.item_id,
            item_name: detail.item_name,
            price: detail.item_price.map(|price| price.to_string()),
            wishlist_id: detail.wishlist_id,
            wishlist_title: detail.wishlist_title,
            wishlist_slug: detail.wishlist_slug,
            status,
            reserved_at: reservation.reserved_at,
            expires_at: reservation.expires_at,
            canceled_at: reservation.canceled_at,
            cancel_reason: reservation.cancel_reason,
            purchased_at: reservation.purchased_at,
        }
    }
}
