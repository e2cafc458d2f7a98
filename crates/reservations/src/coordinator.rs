//! Reservation coordinator: the public reservation operations.
//!
//! The coordinator holds no locks of its own. Every race is settled by a
//! single conditional write in the store: the item claim, the insert guarded
//! by the one-active-reservation rule, or a status transition that only
//! applies to active rows. The coordinator sequences those writes and
//! compensates when a later step fails.

use std::future::Future;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reservation_store::{
    AccountId, CancelReason, GuestToken, Item, ItemId, NewReservation, Page, Reservation,
    ReservationId, ReservationStatus, ReservationStore, StoreError, TransitionOutcome,
    WishlistId,
};

use crate::commands::{CancelReservation, CreateReservation, MarkPurchased, ReservationTarget};
use crate::error::{ReservationError, Result};
use crate::expiration::ExpirationPolicy;
use crate::services::notifier::{NotificationKind, Notifier};
use crate::views::{ItemAvailability, ReservationSummary};

/// Default deadline for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// The party acting on an existing reservation.
#[derive(Debug)]
enum Requester {
    Account(AccountId),
    Guest(GuestToken),
}

impl Requester {
    fn cancel_reason(&self) -> CancelReason {
        match self {
            Requester::Account(_) => CancelReason::UserCancelled,
            Requester::Guest(_) => CancelReason::GuestCancelled,
        }
    }
}

/// Coordinates reservations over a claim store, a ledger and a catalog.
pub struct ReservationCoordinator<S, N>
where
    S: ReservationStore,
    N: Notifier,
{
    store: S,
    notifier: N,
    policy: ExpirationPolicy,
    store_timeout: Duration,
}

impl<S, N> ReservationCoordinator<S, N>
where
    S: ReservationStore,
    N: Notifier,
{
    /// Creates a coordinator with the default expiration policy and store deadline.
    pub fn new(store: S, notifier: N) -> Self {
        Self {
            store,
            notifier,
            policy: ExpirationPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Replaces the expiration policy.
    pub fn with_policy(mut self, policy: ExpirationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the deadline applied to every store call.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.policy
    }

    /// Reserves an item for an account or a guest.
    ///
    /// Accounts first take the item claim and then record the reservation;
    /// if recording fails the claim is released again. Guests rely on the
    /// ledger insert alone and receive a bearer token on the returned
    /// reservation.
    #[tracing::instrument(
        skip(self, cmd),
        fields(wishlist_id = %cmd.wishlist_id, item_id = %cmd.item_id)
    )]
    pub async fn create_reservation(&self, cmd: CreateReservation) -> Result<Reservation> {
        let wishlist_id: WishlistId = parse_id(&cmd.wishlist_id, "wishlist id")?;
        let item_id: ItemId = parse_id(&cmd.item_id, "item id")?;
        let account_id = cmd
            .account_id
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_id::<AccountId>(raw, "account id"))
            .transpose()?;

        self.item_in_wishlist(wishlist_id, item_id).await?;

        let now = Utc::now();
        let (result, reserver) = match account_id {
            Some(account_id) => (
                self.reserve_for_account(item_id, account_id, now).await,
                "account",
            ),
            None => {
                let (name, email) =
                    validate_guest(cmd.guest_name.as_deref(), cmd.guest_email.as_deref())?;
                (
                    self.reserve_for_guest(item_id, name, email, now).await,
                    "guest",
                )
            }
        };

        match &result {
            Ok(reservation) => {
                metrics::counter!("reservations_created_total", "reserver" => reserver)
                    .increment(1);
                tracing::info!(reservation_id = %reservation.id, reserver, "reservation created");
            }
            Err(err) if err.is_conflict() => {
                metrics::counter!("reservation_conflicts_total", "reserver" => reserver)
                    .increment(1);
                tracing::debug!(reserver, error = %err, "item already taken");
            }
            Err(_) => {}
        }
        result
    }

    async fn reserve_for_account(
        &self,
        item_id: ItemId,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        self.deadline(
            "claim item",
            self.store.claim_if_unclaimed(item_id, account_id, now),
        )
        .await?;

        let new = NewReservation::for_account(item_id, account_id, now);
        match self
            .deadline("create reservation", self.store.create(new))
            .await
        {
            Ok(reservation) => Ok(reservation),
            Err(err) => {
                self.compensate_claim(item_id, account_id, now, &err).await;
                Err(err)
            }
        }
    }

    /// Releases the claim taken for an insert that failed.
    ///
    /// A timed-out insert may still have committed; the claim then belongs to
    /// a live reservation and stays.
    async fn compensate_claim(
        &self,
        item_id: ItemId,
        account_id: AccountId,
        claimed_at: DateTime<Utc>,
        err: &ReservationError,
    ) {
        if matches!(err, ReservationError::Storage { .. }) {
            match self
                .deadline(
                    "load active reservation",
                    self.store.active_reservation_for_item(item_id),
                )
                .await
            {
                Ok(Some(active)) if active.account_id() == Some(account_id) => {
                    tracing::warn!(
                        reservation_id = %active.id,
                        error = %err,
                        "reservation was recorded despite the error, keeping claim"
                    );
                    return;
                }
                Ok(_) => {}
                Err(check_err) => {
                    tracing::warn!(error = %check_err, "could not confirm failed insert");
                }
            }
        }

        tracing::warn!(error = %err, "recording reservation failed, releasing claim");
        let released = self
            .deadline(
                "release claim",
                self.store
                    .release_if_claimed_by(item_id, account_id, claimed_at),
            )
            .await;
        if let Err(release_err) = released {
            tracing::error!(
                error = %release_err,
                "compensation failed, item claim left in place"
            );
        }
    }

    /// Clears the claim behind an ended account reservation.
    ///
    /// Claims taken after the reservation was made are untouched, so this is
    /// safe to repeat on every cancel of the same reservation.
    async fn release_account_claim(&self, reservation: &Reservation) -> Result<()> {
        let Some(account_id) = reservation.account_id() else {
            return Ok(());
        };
        let released = self
            .deadline(
                "release claim",
                self.store.release_if_claimed_by(
                    reservation.item_id,
                    account_id,
                    reservation.reserved_at,
                ),
            )
            .await?;
        if released {
            tracing::debug!(reservation_id = %reservation.id, "item claim released");
        }
        Ok(())
    }

    async fn reserve_for_guest(
        &self,
        item_id: ItemId,
        name: String,
        email: String,
        now: DateTime<Utc>,
    ) -> Result<Reservation> {
        let new = NewReservation::for_guest(item_id, name, email, now, self.policy.guest_ttl);
        self.deadline("create reservation", self.store.create(new)).await
    }

    /// Cancels the caller's reservation on an item.
    ///
    /// Cancelling a reservation that already ended returns it unchanged.
    /// Account cancellations release the item claim.
    #[tracing::instrument(
        skip(self, cmd),
        fields(wishlist_id = %cmd.wishlist_id, item_id = %cmd.item_id)
    )]
    pub async fn cancel_reservation(&self, cmd: CancelReservation) -> Result<Reservation> {
        let (requester, item) = self.target(&cmd).await?;
        let reservation = self.resolve(&requester, item.id).await?;
        let reason = requester.cancel_reason();

        let outcome = self
            .deadline(
                "cancel reservation",
                self.store.transition_status(
                    reservation.id,
                    ReservationStatus::Cancelled,
                    Utc::now(),
                    reason,
                ),
            )
            .await?;

        let cancelled = match outcome {
            TransitionOutcome::Applied(reservation) => reservation,
            TransitionOutcome::AlreadyTerminal(reservation) => {
                tracing::debug!(
                    reservation_id = %reservation.id,
                    status = %reservation.status,
                    "reservation already ended"
                );
                // An earlier cancel may have failed after the transition
                self.release_account_claim(&reservation).await?;
                return Ok(reservation);
            }
        };

        metrics::counter!("reservations_cancelled_total", "reason" => reason.as_str())
            .increment(1);
        tracing::info!(reservation_id = %cancelled.id, %reason, "reservation cancelled");

        self.notify(NotificationKind::Cancelled, &cancelled, &item).await;
        self.release_account_claim(&cancelled).await?;

        Ok(cancelled)
    }

    /// Reports whether an item on a public wish list can be reserved.
    ///
    /// An active reservation found past its expiry is expired on the spot and
    /// the item reported available, whichever caller performed the flip.
    #[tracing::instrument(skip(self))]
    pub async fn get_reservation_status(
        &self,
        public_slug: &str,
        item_id: &str,
    ) -> Result<ItemAvailability> {
        let slug = public_slug.trim();
        if slug.is_empty() {
            return Err(ReservationError::InvalidInput(
                "public slug is required".to_string(),
            ));
        }
        let item_id: ItemId = parse_id(item_id, "item id")?;

        let items = self
            .deadline(
                "load public wishlist items",
                self.store.items_in_public_wishlist(slug),
            )
            .await?;
        if !items.iter().any(|item| item.id == item_id) {
            return Err(ReservationError::ItemNotInWishlist);
        }

        let active = self
            .deadline(
                "load active reservation",
                self.store.active_reservation_for_item(item_id),
            )
            .await?;
        let Some(active) = active else {
            return Ok(ItemAvailability::Available);
        };

        let now = Utc::now();
        if active.is_expired_at(now) {
            self.expire_if_due(active.id, now).await?;
            return Ok(ItemAvailability::Available);
        }

        Ok(ItemAvailability::from_active(&active))
    }

    /// Records that the caller bought the reserved gift.
    ///
    /// Repeating the call is harmless. Reservations that already ended, or
    /// lapsed before the purchase, are reported as not found.
    #[tracing::instrument(
        skip(self, cmd),
        fields(wishlist_id = %cmd.wishlist_id, item_id = %cmd.item_id)
    )]
    pub async fn mark_purchased(&self, cmd: MarkPurchased) -> Result<Reservation> {
        let (requester, item) = self.target(&cmd).await?;
        let reservation = self.resolve(&requester, item.id).await?;
        let now = Utc::now();

        if !reservation.is_active() {
            return Err(ReservationError::ReservationNotFound);
        }
        if reservation.is_purchased() {
            return Ok(reservation);
        }
        if reservation.is_expired_at(now) {
            self.expire_if_due(reservation.id, now).await?;
            return Err(ReservationError::ReservationNotFound);
        }

        let purchased = self
            .deadline(
                "mark purchased",
                self.store.mark_purchased(reservation.id, now),
            )
            .await?;

        match purchased {
            Some(purchased) => {
                tracing::info!(reservation_id = %purchased.id, "purchase recorded");
                self.notify(NotificationKind::PurchaseConfirmed, &purchased, &item)
                    .await;
                Ok(purchased)
            }
            None => {
                // Lost a race with another purchase or a transition out of active
                let current = self
                    .deadline("load reservation", self.store.get(reservation.id))
                    .await?
                    .ok_or(ReservationError::ReservationNotFound)?;
                if current.is_active() && current.is_purchased() {
                    Ok(current)
                } else {
                    Err(ReservationError::ReservationNotFound)
                }
            }
        }
    }

    /// Ends the active reservation on an item that its owner is deleting.
    ///
    /// The claim of an account reserver is released and a guest reserver is
    /// told. Claims with no matching active reservation are left alone, since
    /// they may belong to a create still in flight. Returns
    /// the reservation this call cancelled, if there was one.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item_reservations(&self, item_id: &str) -> Result<Option<Reservation>> {
        let item_id: ItemId = parse_id(item_id, "item id")?;
        let Some(item) = self.deadline("load item", self.store.item(item_id)).await? else {
            return Ok(None);
        };

        let active = self
            .deadline(
                "load active reservation",
                self.store.active_reservation_for_item(item_id),
            )
            .await?;

        let mut removed = None;
        if let Some(active) = active {
            let outcome = self
                .deadline(
                    "cancel reservation",
                    self.store.transition_status(
                        active.id,
                        ReservationStatus::Cancelled,
                        Utc::now(),
                        CancelReason::ItemRemoved,
                    ),
                )
                .await?;
            if let TransitionOutcome::Applied(cancelled) = outcome {
                metrics::counter!(
                    "reservations_cancelled_total",
                    "reason" => CancelReason::ItemRemoved.as_str()
                )
                .increment(1);
                tracing::info!(reservation_id = %cancelled.id, "reservation removed with item");
                self.notify(NotificationKind::Removed, &cancelled, &item).await;
                self.release_account_claim(&cancelled).await?;
                removed = Some(cancelled);
            }
        }

        Ok(removed)
    }

    /// Lists an account's reservations, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_reservations(
        &self,
        account_id: &str,
        page: Page,
    ) -> Result<Vec<ReservationSummary>> {
        let account_id: AccountId = parse_id(account_id, "account id")?;
        let details = self
            .deadline(
                "list reservations",
                self.store.list_by_account(account_id, page),
            )
            .await?;
        Ok(details.into_iter().map(ReservationSummary::from).collect())
    }

    /// Lists the reservations made under a guest token.
    #[tracing::instrument(skip_all)]
    pub async fn get_guest_reservations(&self, token: &str) -> Result<Vec<ReservationSummary>> {
        let token = GuestToken::parse(token).ok_or(ReservationError::MissingUserOrToken)?;
        let details = self
            .deadline("list guest reservations", self.store.list_by_token(&token))
            .await?;
        Ok(details.into_iter().map(ReservationSummary::from).collect())
    }

    /// Counts an account's reservations in every status.
    #[tracing::instrument(skip(self))]
    pub async fn count_user_reservations(&self, account_id: &str) -> Result<u64> {
        let account_id: AccountId = parse_id(account_id, "account id")?;
        self.deadline("count reservations", self.store.count_by_account(account_id))
            .await
    }

    /// Expires a reservation if it is still active and past due at `now`.
    ///
    /// Returns the reservation only to the caller whose write performed the
    /// transition; that caller also sends the expiry notification.
    pub async fn expire_if_due(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>> {
        let expired = self
            .deadline(
                "expire reservation",
                self.store.transition_if_active_and_expired(id, now),
            )
            .await?;
        let Some(expired) = expired else {
            return Ok(None);
        };

        metrics::counter!("reservations_expired_total").increment(1);
        tracing::info!(
            reservation_id = %expired.id,
            item_id = %expired.item_id,
            "reservation expired"
        );

        match self.deadline("load item", self.store.item(expired.item_id)).await {
            Ok(Some(item)) => self.notify(NotificationKind::Expired, &expired, &item).await,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "item lookup for expiry notice failed");
            }
        }

        Ok(Some(expired))
    }

    /// Expires every reservation past due at `now`, batch by batch.
    ///
    /// Returns how many reservations this run expired. Reservations another
    /// caller expired first are not counted.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let started = Instant::now();
        let batch_size = self.policy.batch_size.max(1);
        let mut total = 0;

        loop {
            let candidates = self
                .deadline(
                    "load expired candidates",
                    self.store.expired_candidates(now, batch_size),
                )
                .await?;
            let batch_len = candidates.len();

            let mut flipped = 0;
            for id in candidates {
                match self.expire_if_due(id, now).await {
                    Ok(Some(_)) => flipped += 1,
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(
                            reservation_id = %id,
                            error = %err,
                            "failed to expire reservation"
                        );
                    }
                }
            }
            total += flipped;

            // A short batch means nothing is left; a batch that expired
            // nothing would only return the same rows again
            if batch_len < batch_size as usize || flipped == 0 {
                break;
            }
        }

        metrics::histogram!("reservation_sweep_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(total)
    }

    /// Parses the requester and checks the item is on the wish list.
    async fn target(&self, target: &ReservationTarget) -> Result<(Requester, Item)> {
        let wishlist_id: WishlistId = parse_id(&target.wishlist_id, "wishlist id")?;
        let item_id: ItemId = parse_id(&target.item_id, "item id")?;
        let requester = requester(target.account_id.as_deref(), target.token.as_deref())?;
        let item = self.item_in_wishlist(wishlist_id, item_id).await?;
        Ok((requester, item))
    }

    async fn item_in_wishlist(&self, wishlist_id: WishlistId, item_id: ItemId) -> Result<Item> {
        let items = self
            .deadline(
                "load wishlist items",
                self.store.items_in_wishlist(wishlist_id),
            )
            .await?;
        items
            .into_iter()
            .find(|item| item.id == item_id)
            .ok_or(ReservationError::ItemNotInWishlist)
    }

    /// Finds the reservation the requester holds on the item.
    async fn resolve(&self, requester: &Requester, item_id: ItemId) -> Result<Reservation> {
        let found = match requester {
            Requester::Account(account_id) => {
                self.deadline(
                    "find reservation",
                    self.store.latest_for_account(item_id, *account_id),
                )
                .await?
            }
            Requester::Guest(token) => self
                .deadline("find reservation", self.store.find_by_token(token))
                .await?
                .filter(|reservation| reservation.item_id == item_id),
        };
        found.ok_or(ReservationError::ReservationNotFound)
    }

    /// Sends a best-effort notice to a guest reserver. Failures are logged and
    /// counted, never returned.
    async fn notify(&self, kind: NotificationKind, reservation: &Reservation, item: &Item) {
        let Some(email) = reservation.guest_email() else {
            return;
        };

        let list_title = match self
            .deadline("load wishlist", self.store.wishlist(item.wishlist_id))
            .await
        {
            Ok(wishlist) => wishlist.map(|w| w.title).unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "wish list lookup for notification failed");
                String::new()
            }
        };

        let delivery = match kind {
            NotificationKind::Cancelled => {
                self.notifier
                    .notify_reservation_cancelled(email, &item.name, &list_title)
                    .await
            }
            NotificationKind::Removed => {
                self.notifier
                    .notify_reservation_removed(email, &item.name, &list_title)
                    .await
            }
            NotificationKind::Expired => {
                self.notifier
                    .notify_reservation_expired(email, &item.name, &list_title)
                    .await
            }
            NotificationKind::PurchaseConfirmed => {
                self.notifier
                    .notify_purchase_confirmed(email, &item.name, &list_title)
                    .await
            }
        };

        if let Err(err) = delivery {
            metrics::counter!("notification_failures_total", "kind" => kind.as_str())
                .increment(1);
            tracing::warn!(
                reservation_id = %reservation.id,
                notification = kind.as_str(),
                error = %err,
                "notification failed"
            );
            return;
        }

        if let Err(err) = self
            .deadline(
                "mark notification sent",
                self.store.mark_notification_sent(reservation.id),
            )
            .await
        {
            tracing::warn!(
                reservation_id = %reservation.id,
                error = %err,
                "could not flag notification"
            );
        }
    }

    /// Runs a store call under the configured deadline.
    async fn deadline<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(|err| ReservationError::from_store(operation, err)),
            Err(_) => {
                tracing::error!(
                    operation,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "store call timed out"
                );
                Err(ReservationError::Storage {
                    operation,
                    message: format!("timed out after {:?}", self.store_timeout),
                })
            }
        }
    }
}

fn parse_id<T: FromStr>(raw: &str, field: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ReservationError::InvalidInput(format!("malformed {field}: '{raw}'")))
}

fn requester(account_id: Option<&str>, token: Option<&str>) -> Result<Requester> {
    if let Some(raw) = account_id.filter(|raw| !raw.trim().is_empty()) {
        return parse_id(raw, "account id").map(Requester::Account);
    }
    token
        .and_then(GuestToken::parse)
        .map(Requester::Guest)
        .ok_or(ReservationError::MissingUserOrToken)
}

fn validate_guest(name: Option<&str>, email: Option<&str>) -> Result<(String, String)> {
    let name = name.map(str::trim).unwrap_or_default();
    let email = email.map(str::trim).unwrap_or_default();
    if name.is_empty() || email.is_empty() {
        return Err(ReservationError::GuestInfoRequired);
    }
    if !looks_like_email(email) {
        return Err(ReservationError::InvalidInput(
            "guest email must look like name@domain".to_string(),
        ));
    }
    Ok((name.to_string(), email.to_string()))
}

fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    matches!(
        email.split_once('@'),
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@')
    )
}
