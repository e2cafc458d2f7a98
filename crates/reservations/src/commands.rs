//! Reservation commands.
//!
//! Identifiers arrive as raw strings from the caller and are parsed by the
//! coordinator, which reports malformed ones as `InvalidInput`.

/// Command to reserve an item, either for an account or for a guest.
#[derive(Debug, Clone, Default)]
pub struct CreateReservation {
    /// The wish list the item is expected on.
    pub wishlist_id: String,

    /// The item to reserve.
    pub item_id: String,

    /// The authenticated account, if any. Takes precedence over guest fields.
    pub account_id: Option<String>,

    /// Guest display name.
    pub guest_name: Option<String>,

    /// Guest contact email.
    pub guest_email: Option<String>,
}

impl CreateReservation {
    /// Creates a reservation command for an authenticated account.
    pub fn for_account(
        wishlist_id: impl Into<String>,
        item_id: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            wishlist_id: wishlist_id.into(),
            item_id: item_id.into(),
            account_id: Some(account_id.into()),
            ..Self::default()
        }
    }

    /// Creates a reservation command for a guest.
    pub fn for_guest(
        wishlist_id: impl Into<String>,
        item_id: impl Into<String>,
        guest_name: impl Into<String>,
        guest_email: impl Into<String>,
    ) -> Self {
        Self {
            wishlist_id: wishlist_id.into(),
            item_id: item_id.into(),
            account_id: None,
            guest_name: Some(guest_name.into()),
            guest_email: Some(guest_email.into()),
        }
    }
}

/// Identifies the reservation a caller is acting on: the item, plus either
/// the reserving account or the guest token.
#[derive(Debug, Clone, Default)]
pub struct ReservationTarget {
    pub wishlist_id: String,
    pub item_id: String,
    pub account_id: Option<String>,
    pub token: Option<String>,
}

impl ReservationTarget {
    /// Targets the reservation an account holds on the item.
    pub fn by_account(
        wishlist_id: impl Into<String>,
        item_id: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            wishlist_id: wishlist_id.into(),
            item_id: item_id.into(),
            account_id: Some(account_id.into()),
            token: None,
        }
    }

    /// Targets the reservation a guest token was issued for.
    pub fn by_token(
        wishlist_id: impl Into<String>,
        item_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            wishlist_id: wishlist_id.into(),
            item_id: item_id.into(),
            account_id: None,
            token: Some(token.into()),
        }
    }
}

/// Command to cancel a reservation.
pub type CancelReservation = ReservationTarget;

/// Command to record that the reserved gift was bought.
pub type MarkPurchased = ReservationTarget;
