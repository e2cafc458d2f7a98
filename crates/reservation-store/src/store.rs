use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    AccountId, CancelReason, GuestToken, Item, ItemId, NewReservation, Page, Reservation,
    ReservationDetail, ReservationId, ReservationStatus, Result, TransitionOutcome, Wishlist,
    WishlistId,
};

/// The compare-and-swap primitive behind account claims on items.
///
/// Implementations must perform each operation as a single atomic write; a
/// separate read followed by a write is not acceptable.
#[async_trait]
pub trait ItemClaimStore: Send + Sync {
    /// Claims the item for `account_id` only if nobody holds it.
    ///
    /// Among any number of concurrent callers on one item exactly one
    /// succeeds; the rest get `AlreadyClaimed`. Unknown items yield
    /// `ItemNotFound`.
    async fn claim_if_unclaimed(
        &self,
        item_id: ItemId,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Item>;

    /// Clears the item's claim.
    async fn release(&self, item_id: ItemId) -> Result<Item>;

    /// Clears the claim only if `account_id` holds it and took it no later
    /// than `claimed_by`.
    ///
    /// Returns whether a claim was cleared. A newer claim, even one by the
    /// same account, is left alone, so repeating the call is harmless.
    async fn release_if_claimed_by(
        &self,
        item_id: ItemId,
        account_id: AccountId,
        claimed_by: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Durable log of reservations and their status transitions.
#[async_trait]
pub trait ReservationLedger: Send + Sync {
    /// Inserts a new active reservation.
    ///
    /// The insert itself is the atomicity boundary: it fails with
    /// `AlreadyReserved` if the item already has an active reservation.
    async fn create(&self, reservation: NewReservation) -> Result<Reservation>;

    /// Loads a reservation by id.
    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Returns the item's active reservation, if any.
    async fn active_reservation_for_item(&self, item_id: ItemId) -> Result<Option<Reservation>>;

    /// Returns the reservation `account_id` holds or most recently held on the item.
    ///
    /// An active reservation is preferred over terminal ones.
    async fn latest_for_account(
        &self,
        item_id: ItemId,
        account_id: AccountId,
    ) -> Result<Option<Reservation>>;

    /// Finds the reservation a guest token was issued for.
    async fn find_by_token(&self, token: &GuestToken) -> Result<Option<Reservation>>;

    /// Moves a reservation out of `Active`.
    ///
    /// For callers that already established which reservation they own. A
    /// reservation that is already terminal is returned unchanged as
    /// `AlreadyTerminal`; its `canceled_at` is never re-stamped.
    async fn transition_status(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
        at: DateTime<Utc>,
        reason: CancelReason,
    ) -> Result<TransitionOutcome>;

    /// Expires the reservation if, at write time, it is still active and its
    /// `expires_at` is before `now`.
    ///
    /// Returns `None` when the conditions no longer hold, so of two racing
    /// callers exactly one gets `Some`.
    async fn transition_if_active_and_expired(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>>;

    /// Records the purchase on an active, not yet purchased reservation that
    /// has not passed its expiry at `at`.
    ///
    /// Clears `expires_at`. Returns `None` if the conditions no longer hold.
    async fn mark_purchased(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Option<Reservation>>;

    /// Flags that the downstream notification for this reservation was sent.
    async fn mark_notification_sent(&self, id: ReservationId) -> Result<()>;

    /// Ids of active reservations whose `expires_at` is before `now`, oldest first.
    async fn expired_candidates(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReservationId>>;

    /// Lists an account's reservations, newest first.
    async fn list_by_account(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<ReservationDetail>>;

    /// Lists the reservations issued under a guest token, newest first.
    async fn list_by_token(&self, token: &GuestToken) -> Result<Vec<ReservationDetail>>;

    /// Counts an account's reservations in every status.
    async fn count_by_account(&self, account_id: AccountId) -> Result<u64>;
}

/// Read access to wish-list data owned by the CRUD collaborator.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Loads a wish list by id.
    async fn wishlist(&self, wishlist_id: WishlistId) -> Result<Option<Wishlist>>;

    /// Loads a public wish list by slug.
    async fn public_wishlist(&self, slug: &str) -> Result<Option<Wishlist>>;

    /// Loads an item by id.
    async fn item(&self, item_id: ItemId) -> Result<Option<Item>>;

    /// Items on the given wish list.
    async fn items_in_wishlist(&self, wishlist_id: WishlistId) -> Result<Vec<Item>>;

    /// Items on the public wish list with the given slug; empty if no such list.
    async fn items_in_public_wishlist(&self, slug: &str) -> Result<Vec<Item>>;
}

/// Everything the reservation coordinator needs from storage.
pub trait ReservationStore: ItemClaimStore + ReservationLedger + ItemCatalog {}

// Blanket implementation for all stores providing the three capabilities
impl<T: ItemClaimStore + ReservationLedger + ItemCatalog + ?Sized> ReservationStore for T {}
