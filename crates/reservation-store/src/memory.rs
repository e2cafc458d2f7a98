use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AccountId, CancelReason, GuestToken, Item, ItemClaim, ItemId, NewReservation, Page,
    Reservation, ReservationDetail, ReservationId, ReservationStatus, Result, StoreError,
    TransitionOutcome, Wishlist, WishlistId,
    store::{ItemCatalog, ItemClaimStore, ReservationLedger},
};

#[derive(Debug, Default)]
struct State {
    wishlists: HashMap<WishlistId, Wishlist>,
    items: HashMap<ItemId, Item>,
    /// Insertion order is preserved so "latest" has a stable meaning.
    reservations: Vec<Reservation>,
}

impl State {
    fn reservation_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    fn detail(&self, reservation: &Reservation) -> Option<ReservationDetail> {
        let item = self.items.get(&reservation.item_id)?;
        let wishlist = self.wishlists.get(&item.wishlist_id)?;
        Some(ReservationDetail {
            reservation: reservation.clone(),
            item_name: item.name.clone(),
            item_price: item.price.clone(),
            wishlist_id: wishlist.id,
            wishlist_title: wishlist.title.clone(),
            wishlist_slug: wishlist.public_slug.clone(),
        })
    }

    /// Newest first; later inserts win ties on `reserved_at`.
    fn newest_first(&self, filter: impl Fn(&Reservation) -> bool) -> Vec<&Reservation> {
        let mut matching: Vec<_> = self.reservations.iter().filter(|r| filter(*r)).collect();
        matching.reverse();
        matching.sort_by(|a, b| b.reserved_at.cmp(&a.reserved_at));
        matching
    }
}

/// In-memory reservation store for testing and local runs.
///
/// Every operation runs under a single write or read lock, which gives it
/// the same all-or-nothing behaviour as the conditional statements of the
/// PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryReservationStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryReservationStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a wish list.
    pub async fn insert_wishlist(&self, wishlist: Wishlist) {
        self.state
            .write()
            .await
            .wishlists
            .insert(wishlist.id, wishlist);
    }

    /// Adds or replaces an item.
    pub async fn insert_item(&self, item: Item) {
        self.state.write().await.items.insert(item.id, item);
    }

    /// Returns the total number of reservations stored.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }

    /// Returns the number of active reservations for an item.
    pub async fn active_count_for_item(&self, item_id: ItemId) -> usize {
        self.state
            .read()
            .await
            .reservations
            .iter()
            .filter(|r| r.item_id == item_id && r.is_active())
            .count()
    }

    /// Overwrites a reservation's expiry, for tests that need to time-travel.
    pub async fn set_expires_at(&self, id: ReservationId, expires_at: Option<DateTime<Utc>>) {
        if let Some(r) = self.state.write().await.reservation_mut(id) {
            r.expires_at = expires_at;
        }
    }

    /// Clears all data.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.wishlists.clear();
        state.items.clear();
        state.reservations.clear();
    }
}

#[async_trait]
impl ItemClaimStore for InMemoryReservationStore {
    async fn claim_if_unclaimed(
        &self,
        item_id: ItemId,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Item> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;

        if item.claim.is_some() {
            return Err(StoreError::AlreadyClaimed(item_id));
        }

        item.claim = Some(ItemClaim {
            account_id,
            claimed_at: now,
        });
        Ok(item.clone())
    }

    async fn release(&self, item_id: ItemId) -> Result<Item> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        item.claim = None;
        Ok(item.clone())
    }

    async fn release_if_claimed_by(
        &self,
        item_id: ItemId,
        account_id: AccountId,
        claimed_by: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;

        let owned = item
            .claim
            .as_ref()
            .is_some_and(|c| c.account_id == account_id && c.claimed_at <= claimed_by);
        if owned {
            item.claim = None;
        }
        Ok(owned)
    }
}

#[async_trait]
impl ReservationLedger for InMemoryReservationStore {
    async fn create(&self, reservation: NewReservation) -> Result<Reservation> {
        let mut state = self.state.write().await;
        let item_id = reservation.item_id;

        if !state.items.contains_key(&item_id) {
            return Err(StoreError::ItemNotFound(item_id));
        }

        // Partial unique index simulation: one active reservation per item
        if state
            .reservations
            .iter()
            .any(|r| r.item_id == item_id && r.is_active())
        {
            return Err(StoreError::AlreadyReserved(item_id));
        }

        let stored = reservation.into_reservation();
        state.reservations.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations.iter().find(|r| r.id == id).cloned())
    }

    async fn active_reservation_for_item(&self, item_id: ItemId) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .iter()
            .find(|r| r.item_id == item_id && r.is_active())
            .cloned())
    }

    async fn latest_for_account(
        &self,
        item_id: ItemId,
        account_id: AccountId,
    ) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        let held =
            state.newest_first(|r| r.item_id == item_id && r.account_id() == Some(account_id));
        let pick = held
            .iter()
            .find(|r| r.is_active())
            .or_else(|| held.first())
            .map(|r| (*r).clone());
        Ok(pick)
    }

    async fn find_by_token(&self, token: &GuestToken) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .iter()
            .find(|r| r.token.as_ref() == Some(token))
            .cloned())
    }

    async fn transition_status(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
        at: DateTime<Utc>,
        reason: CancelReason,
    ) -> Result<TransitionOutcome> {
        if !new_status.is_terminal() {
            return Err(StoreError::InvalidTransition(new_status));
        }

        let mut state = self.state.write().await;
        let reservation = state
            .reservation_mut(id)
            .ok_or(StoreError::ReservationNotFound(id))?;

        if reservation.status.is_terminal() {
            return Ok(TransitionOutcome::AlreadyTerminal(reservation.clone()));
        }

        reservation.status = new_status;
        reservation.canceled_at = Some(at);
        reservation.cancel_reason = Some(reason);
        Ok(TransitionOutcome::Applied(reservation.clone()))
    }

    async fn transition_if_active_and_expired(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>> {
        let mut state = self.state.write().await;
        let Some(reservation) = state.reservation_mut(id) else {
            return Ok(None);
        };

        if !reservation.is_expired_at(now) {
            return Ok(None);
        }

        reservation.status = ReservationStatus::Expired;
        reservation.canceled_at = Some(now);
        reservation.cancel_reason = Some(CancelReason::Expired);
        Ok(Some(reservation.clone()))
    }

    async fn mark_purchased(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Option<Reservation>> {
        let mut state = self.state.write().await;
        let Some(reservation) = state.reservation_mut(id) else {
            return Ok(None);
        };

        if !reservation.is_active()
            || reservation.is_purchased()
            || reservation.is_expired_at(at)
        {
            return Ok(None);
        }

        reservation.purchased_at = Some(at);
        reservation.expires_at = None;
        Ok(Some(reservation.clone()))
    }

    async fn mark_notification_sent(&self, id: ReservationId) -> Result<()> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservation_mut(id)
            .ok_or(StoreError::ReservationNotFound(id))?;
        reservation.notification_sent = true;
        Ok(())
    }

    async fn expired_candidates(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReservationId>> {
        let state = self.state.read().await;
        let mut candidates: Vec<_> = state
            .reservations
            .iter()
            .filter(|r| r.is_expired_at(now))
            .collect();
        candidates.sort_by_key(|r| r.expires_at);
        Ok(candidates
            .into_iter()
            .take(limit as usize)
            .map(|r| r.id)
            .collect())
    }

    async fn list_by_account(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<ReservationDetail>> {
        let state = self.state.read().await;
        let details = state
            .newest_first(|r| r.account_id() == Some(account_id))
            .into_iter()
            .filter_map(|r| state.detail(r))
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(details)
    }

    async fn list_by_token(&self, token: &GuestToken) -> Result<Vec<ReservationDetail>> {
        let state = self.state.read().await;
        let details = state
            .newest_first(|r| r.token.as_ref() == Some(token))
            .into_iter()
            .filter_map(|r| state.detail(r))
            .collect();
        Ok(details)
    }

    async fn count_by_account(&self, account_id: AccountId) -> Result<u64> {
        let state = self.state.read().await;
        let count = state
            .reservations
            .iter()
            .filter(|r| r.account_id() == Some(account_id))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl ItemCatalog for InMemoryReservationStore {
    async fn wishlist(&self, wishlist_id: WishlistId) -> Result<Option<Wishlist>> {
        Ok(self.state.read().await.wishlists.get(&wishlist_id).cloned())
    }

    async fn public_wishlist(&self, slug: &str) -> Result<Option<Wishlist>> {
        let state = self.state.read().await;
        Ok(state
            .wishlists
            .values()
            .find(|w| w.public_slug.as_deref() == Some(slug))
            .cloned())
    }

    async fn item(&self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.state.read().await.items.get(&item_id).cloned())
    }

    async fn items_in_wishlist(&self, wishlist_id: WishlistId) -> Result<Vec<Item>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .filter(|i| i.wishlist_id == wishlist_id)
            .cloned()
            .collect())
    }

    async fn items_in_public_wishlist(&self, slug: &str) -> Result<Vec<Item>> {
        let state = self.state.read().await;
        let Some(wishlist) = state
            .wishlists
            .values()
            .find(|w| w.public_slug.as_deref() == Some(slug))
        else {
            return Ok(Vec::new());
        };
        Ok(state
            .items
            .values()
            .filter(|i| i.wishlist_id == wishlist.id)
            .cloned()
            .collect())
    }
}
