//! Reservation records and their lifecycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, GuestToken, ItemId, Money, ReservationId, WishlistId};

/// Lifecycle status of a reservation.
///
/// ```text
/// Active ──┬──► Cancelled
///          └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Holds the item; at most one per item.
    #[default]
    Active,

    /// Ended by the reserver or by the item's removal (terminal state).
    Cancelled,

    /// Guest reservation past its time-to-live (terminal state).
    Expired,
}

impl ReservationStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Cancelled | ReservationStatus::Expired)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReservationStatus::Active),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(format!("unknown reservation status '{other}'")),
        }
    }
}

/// Why a reservation left the active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    UserCancelled,
    GuestCancelled,
    Expired,
    ItemRemoved,
}

impl CancelReason {
    /// Returns the reason as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::UserCancelled => "user_cancelled",
            CancelReason::GuestCancelled => "guest_cancelled",
            CancelReason::Expired => "expired",
            CancelReason::ItemRemoved => "item_removed",
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CancelReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_cancelled" => Ok(CancelReason::UserCancelled),
            "guest_cancelled" => Ok(CancelReason::GuestCancelled),
            "expired" => Ok(CancelReason::Expired),
            "item_removed" => Ok(CancelReason::ItemRemoved),
            other => Err(format!("unknown cancel reason '{other}'")),
        }
    }
}

/// Who holds a reservation: an account, or a guest known only by name and email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reserver {
    Account(AccountId),
    Guest { name: String, email: String },
}

/// A reservation about to be inserted into the ledger.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub id: ReservationId,
    pub item_id: ItemId,
    pub reserver: Reserver,
    pub token: Option<GuestToken>,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewReservation {
    /// An authenticated reservation. It carries no token and never expires.
    pub fn for_account(item_id: ItemId, account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::new(),
            item_id,
            reserver: Reserver::Account(account_id),
            token: None,
            reserved_at: now,
            expires_at: None,
        }
    }

    /// A guest reservation with a freshly generated token, expiring after `ttl`.
    pub fn for_guest(
        item_id: ItemId,
        name: impl Into<String>,
        email: impl Into<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            item_id,
            reserver: Reserver::Guest {
                name: name.into(),
                email: email.into(),
            },
            token: Some(GuestToken::generate()),
            reserved_at: now,
            expires_at: Some(now + ttl),
        }
    }

    /// Materializes the stored record: new reservations are always active.
    pub fn into_reservation(self) -> Reservation {
        Reservation {
            id: self.id,
            item_id: self.item_id,
            reserver: self.reserver,
            token: self.token,
            status: ReservationStatus::Active,
            reserved_at: self.reserved_at,
            expires_at: self.expires_at,
            canceled_at: None,
            cancel_reason: None,
            purchased_at: None,
            notification_sent: false,
        }
    }
}

/// A stored reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub item_id: ItemId,
    pub reserver: Reserver,
    pub token: Option<GuestToken>,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<CancelReason>,
    pub purchased_at: Option<DateTime<Utc>>,
    pub notification_sent: bool,
}

impl Reservation {
    /// Returns true while the reservation blocks its item.
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Returns true if the reservation is active but past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at.is_some_and(|at| at < now)
    }

    /// Returns true once the reserver confirmed the purchase.
    pub fn is_purchased(&self) -> bool {
        self.purchased_at.is_some()
    }

    /// Returns the reserving account for authenticated reservations.
    pub fn account_id(&self) -> Option<AccountId> {
        match self.reserver {
            Reserver::Account(id) => Some(id),
            Reserver::Guest { .. } => None,
        }
    }

    /// Returns the guest's name for guest reservations.
    pub fn guest_name(&self) -> Option<&str> {
        match &self.reserver {
            Reserver::Guest { name, .. } => Some(name),
            Reserver::Account(_) => None,
        }
    }

    /// Returns the guest's email for guest reservations.
    pub fn guest_email(&self) -> Option<&str> {
        match &self.reserver {
            Reserver::Guest { email, .. } => Some(email),
            Reserver::Account(_) => None,
        }
    }
}

/// Result of a status transition out of `Active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// This call moved the reservation out of `Active`.
    Applied(Reservation),
    /// The reservation was already terminal; returned unchanged.
    AlreadyTerminal(Reservation),
}

impl TransitionOutcome {
    /// Returns true if this call performed the transition.
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }

    /// Returns the reservation as it now stands.
    pub fn reservation(&self) -> &Reservation {
        match self {
            TransitionOutcome::Applied(r) | TransitionOutcome::AlreadyTerminal(r) => r,
        }
    }

    /// Consumes the outcome, returning the reservation.
    pub fn into_reservation(self) -> Reservation {
        match self {
            TransitionOutcome::Applied(r) | TransitionOutcome::AlreadyTerminal(r) => r,
        }
    }
}

/// A reservation joined with the item and wish-list data needed for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDetail {
    pub reservation: Reservation,
    pub item_name: String,
    pub item_price: Option<Money>,
    pub wishlist_id: WishlistId,
    pub wishlist_title: String,
    pub wishlist_slug: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ReservationStatus::Active.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }

    #[test]
    fn test_status_parse_matches_as_str() {
        for status in [
            ReservationStatus::Active,
            ReservationStatus::Cancelled,
            ReservationStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>(), Ok(status));
        }
        assert!("pending".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_cancel_reason_parse() {
        assert_eq!(
            "guest_cancelled".parse::<CancelReason>(),
            Ok(CancelReason::GuestCancelled)
        );
        assert!("whatever".parse::<CancelReason>().is_err());
    }

    #[test]
    fn test_guest_reservation_gets_token_and_expiry() {
        let now = Utc::now();
        let new = NewReservation::for_guest(
            ItemId::new(),
            "Ann",
            "ann@x.test",
            now,
            Duration::days(30),
        );
        let token = new.token.clone().unwrap();
        assert_ne!(token.as_str(), new.id.to_string());
        assert_eq!(new.expires_at, Some(now + Duration::days(30)));

        let reservation = new.into_reservation();
        assert!(reservation.is_active());
        assert_eq!(reservation.guest_name(), Some("Ann"));
        assert_eq!(reservation.account_id(), None);
    }

    #[test]
    fn test_account_reservation_never_expires() {
        let now = Utc::now();
        let account = AccountId::new();
        let reservation =
            NewReservation::for_account(ItemId::new(), account, now).into_reservation();
        assert!(reservation.token.is_none());
        assert!(!reservation.is_expired_at(now + Duration::days(365)));
        assert_eq!(reservation.account_id(), Some(account));
    }

    #[test]
    fn test_is_expired_at_requires_active() {
        let now = Utc::now();
        let mut reservation =
            NewReservation::for_guest(ItemId::new(), "Ann", "ann@x.test", now, Duration::days(1))
                .into_reservation();
        let later = now + Duration::days(2);
        assert!(reservation.is_expired_at(later));

        reservation.status = ReservationStatus::Cancelled;
        assert!(!reservation.is_expired_at(later));
    }
}
