use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AccountId, CancelReason, GuestToken, Item, ItemClaim, ItemId, Money, NewReservation, Page,
    Reservation, ReservationDetail, ReservationId, ReservationStatus, Reserver, Result,
    StoreError, TransitionOutcome, Wishlist, WishlistId,
    store::{ItemCatalog, ItemClaimStore, ReservationLedger},
};

/// Name of the partial unique index allowing one active reservation per item.
const ONE_ACTIVE_PER_ITEM: &str = "reservations_one_active_per_item";

const ITEM_COLUMNS: &str =
    "id, wishlist_id, name, price_cents, price_currency, claimed_by_account, claimed_at";

const RESERVATION_COLUMNS: &str = "id, item_id, reserved_by_account, guest_name, guest_email, \
     token, status, reserved_at, expires_at, canceled_at, cancel_reason, purchased_at, \
     notification_sent";

const DETAIL_SELECT: &str = "SELECT r.id, r.item_id, r.reserved_by_account, r.guest_name, \
     r.guest_email, r.token, r.status, r.reserved_at, r.expires_at, r.canceled_at, \
     r.cancel_reason, r.purchased_at, r.notification_sent, \
     i.name AS item_name, i.price_cents, i.price_currency, \
     w.id AS wishlist_id, w.title AS wishlist_title, w.public_slug AS wishlist_slug \
     FROM reservations r \
     JOIN items i ON i.id = r.item_id \
     JOIN wishlists w ON w.id = i.wishlist_id";

/// PostgreSQL-backed reservation store.
///
/// Race-freedom comes entirely from single-statement conditional updates and
/// the `reservations_one_active_per_item` partial unique index.
#[derive(Clone)]
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    /// Creates a new PostgreSQL reservation store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts a wish list row. The CRUD service normally owns this table;
    /// this exists for fixtures and local seeding.
    pub async fn insert_wishlist(&self, wishlist: &Wishlist) -> Result<()> {
        sqlx::query(
            "INSERT INTO wishlists (id, owner_id, title, public_slug) VALUES ($1, $2, $3, $4)",
        )
        .bind(wishlist.id.as_uuid())
        .bind(wishlist.owner.as_uuid())
        .bind(&wishlist.title)
        .bind(&wishlist.public_slug)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Inserts an item row (unclaimed). Same caveat as [`Self::insert_wishlist`].
    pub async fn insert_item(&self, item: &Item) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (id, wishlist_id, name, price_cents, price_currency)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.wishlist_id.as_uuid())
        .bind(&item.name)
        .bind(item.price.as_ref().map(Money::cents))
        .bind(item.price.as_ref().map(|p| p.currency().to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_item(row: &PgRow) -> Result<Item> {
        let claimed_by: Option<Uuid> = row.try_get("claimed_by_account")?;
        let claimed_at: Option<DateTime<Utc>> = row.try_get("claimed_at")?;
        let claim = match (claimed_by, claimed_at) {
            (Some(account), Some(at)) => Some(ItemClaim {
                account_id: AccountId::from_uuid(account),
                claimed_at: at,
            }),
            _ => None,
        };

        Ok(Item {
            id: ItemId::from_uuid(row.try_get("id")?),
            wishlist_id: WishlistId::from_uuid(row.try_get("wishlist_id")?),
            name: row.try_get("name")?,
            price: Self::price(row)?,
            claim,
        })
    }

    fn price(row: &PgRow) -> Result<Option<Money>> {
        let cents: Option<i64> = row.try_get("price_cents")?;
        let currency: Option<String> = row.try_get("price_currency")?;
        Ok(cents.zip(currency).map(|(c, cur)| Money::new(c, cur)))
    }

    fn row_to_wishlist(row: &PgRow) -> Result<Wishlist> {
        Ok(Wishlist {
            id: WishlistId::from_uuid(row.try_get("id")?),
            owner: AccountId::from_uuid(row.try_get("owner_id")?),
            title: row.try_get("title")?,
            public_slug: row.try_get("public_slug")?,
        })
    }

    fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
        let id = ReservationId::from_uuid(row.try_get("id")?);

        let account: Option<Uuid> = row.try_get("reserved_by_account")?;
        let guest_name: Option<String> = row.try_get("guest_name")?;
        let guest_email: Option<String> = row.try_get("guest_email")?;
        let reserver = match (account, guest_name, guest_email) {
            (Some(account), None, None) => Reserver::Account(AccountId::from_uuid(account)),
            (None, Some(name), Some(email)) => Reserver::Guest { name, email },
            _ => {
                return Err(StoreError::CorruptRow(format!(
                    "reservation {id} has an invalid reserver"
                )));
            }
        };

        let status: String = row.try_get("status")?;
        let status = status.parse::<ReservationStatus>().map_err(StoreError::CorruptRow)?;
        let cancel_reason = row
            .try_get::<Option<String>, _>("cancel_reason")?
            .map(|r| r.parse::<CancelReason>())
            .transpose()
            .map_err(StoreError::CorruptRow)?;
        let token = row
            .try_get::<Option<String>, _>("token")?
            .and_then(|t| GuestToken::parse(&t));

        Ok(Reservation {
            id,
            item_id: ItemId::from_uuid(row.try_get("item_id")?),
            reserver,
            token,
            status,
            reserved_at: row.try_get("reserved_at")?,
            expires_at: row.try_get("expires_at")?,
            canceled_at: row.try_get("canceled_at")?,
            cancel_reason,
            purchased_at: row.try_get("purchased_at")?,
            notification_sent: row.try_get("notification_sent")?,
        })
    }

    fn row_to_detail(row: &PgRow) -> Result<ReservationDetail> {
        Ok(ReservationDetail {
            reservation: Self::row_to_reservation(row)?,
            item_name: row.try_get("item_name")?,
            item_price: Self::price(row)?,
            wishlist_id: WishlistId::from_uuid(row.try_get("wishlist_id")?),
            wishlist_title: row.try_get("wishlist_title")?,
            wishlist_slug: row.try_get("wishlist_slug")?,
        })
    }

    async fn item_exists(&self, item_id: ItemId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM items WHERE id = $1)")
            .bind(item_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl ItemClaimStore for PostgresReservationStore {
    async fn claim_if_unclaimed(
        &self,
        item_id: ItemId,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Item> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE items
            SET claimed_by_account = $2, claimed_at = $3
            WHERE id = $1 AND claimed_by_account IS NULL
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item_id.as_uuid())
        .bind(account_id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_item(&row),
            // The update matched nothing: tell a lost race from a missing item
            None if self.item_exists(item_id).await? => Err(StoreError::AlreadyClaimed(item_id)),
            None => Err(StoreError::ItemNotFound(item_id)),
        }
    }

    async fn release(&self, item_id: ItemId) -> Result<Item> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE items
            SET claimed_by_account = NULL, claimed_at = NULL
            WHERE id = $1
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_item(&row),
            None => Err(StoreError::ItemNotFound(item_id)),
        }
    }

    async fn release_if_claimed_by(
        &self,
        item_id: ItemId,
        account_id: AccountId,
        claimed_by: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET claimed_by_account = NULL, claimed_at = NULL
            WHERE id = $1 AND claimed_by_account = $2 AND claimed_at <= $3
            "#,
        )
        .bind(item_id.as_uuid())
        .bind(account_id.as_uuid())
        .bind(claimed_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM items WHERE id = $1)")
            .bind(item_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(StoreError::ItemNotFound(item_id))
        }
    }
}

#[async_trait]
impl ReservationLedger for PostgresReservationStore {
    async fn create(&self, reservation: NewReservation) -> Result<Reservation> {
        let item_id = reservation.item_id;
        let (account, guest_name, guest_email) = match &reservation.reserver {
            Reserver::Account(id) => (Some(id.as_uuid()), None, None),
            Reserver::Guest { name, email } => (None, Some(name.as_str()), Some(email.as_str())),
        };

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO reservations
                (id, item_id, reserved_by_account, guest_name, guest_email, token,
                 status, reserved_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $8)
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(reservation.id.as_uuid())
        .bind(item_id.as_uuid())
        .bind(account)
        .bind(guest_name)
        .bind(guest_email)
        .bind(reservation.token.as_ref().map(GuestToken::as_str))
        .bind(reservation.reserved_at)
        .bind(reservation.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                // The insert lost the race for this item
                if db_err.constraint() == Some(ONE_ACTIVE_PER_ITEM) {
                    return StoreError::AlreadyReserved(item_id);
                }
                if db_err.is_foreign_key_violation() {
                    return StoreError::ItemNotFound(item_id);
                }
            }
            StoreError::Database(e)
        })?;

        Self::row_to_reservation(&row)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn active_reservation_for_item(&self, item_id: ItemId) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE item_id = $1 AND status = 'active'"
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn latest_for_account(
        &self,
        item_id: ItemId,
        account_id: AccountId,
    ) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM reservations
            WHERE item_id = $1 AND reserved_by_account = $2
            ORDER BY (status = 'active') DESC, reserved_at DESC
            LIMIT 1
            "#
        ))
        .bind(item_id.as_uuid())
        .bind(account_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn find_by_token(&self, token: &GuestToken) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE token = $1"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reservation).transpose()
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

        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations
            SET status = $2, canceled_at = $3, cancel_reason = $4
            WHERE id = $1 AND status = 'active'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(new_status.as_str())
        .bind(at)
        .bind(reason.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(TransitionOutcome::Applied(Self::row_to_reservation(&row)?));
        }

        // Nothing matched: either terminal already (terminal rows never
        // become active again) or missing.
        match self.get(id).await? {
            Some(existing) => Ok(TransitionOutcome::AlreadyTerminal(existing)),
            None => Err(StoreError::ReservationNotFound(id)),
        }
    }

    async fn transition_if_active_and_expired(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations
            SET status = 'expired', canceled_at = $2, cancel_reason = 'expired'
            WHERE id = $1
              AND status = 'active'
              AND expires_at IS NOT NULL
              AND expires_at < $2
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn mark_purchased(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reservations
            SET purchased_at = $2, expires_at = NULL
            WHERE id = $1
              AND status = 'active'
              AND purchased_at IS NULL
              AND (expires_at IS NULL OR expires_at >= $2)
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reservation).transpose()
    }

    async fn mark_notification_sent(&self, id: ReservationId) -> Result<()> {
        let result = sqlx::query("UPDATE reservations SET notification_sent = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ReservationNotFound(id));
        }
        Ok(())
    }

    async fn expired_candidates(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReservationId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM reservations
            WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ReservationId::from_uuid).collect())
    }

    async fn list_by_account(
        &self,
        account_id: AccountId,
        page: Page,
    ) -> Result<Vec<ReservationDetail>> {
        let rows = sqlx::query(&format!(
            r#"
            {DETAIL_SELECT}
            WHERE r.reserved_by_account = $1
            ORDER BY r.reserved_at DESC, r.id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(i64::from(page.limit()))
        .bind(i64::from(page.offset()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_detail).collect()
    }

    async fn list_by_token(&self, token: &GuestToken) -> Result<Vec<ReservationDetail>> {
        let rows = sqlx::query(&format!(
            r#"
            {DETAIL_SELECT}
            WHERE r.token = $1
            ORDER BY r.reserved_at DESC, r.id DESC
            "#
        ))
        .bind(token.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_detail).collect()
    }

    async fn count_by_account(&self, account_id: AccountId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE reserved_by_account = $1")
                .bind(account_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl ItemCatalog for PostgresReservationStore {
    async fn wishlist(&self, wishlist_id: WishlistId) -> Result<Option<Wishlist>> {
        let row = sqlx::query("SELECT id, owner_id, title, public_slug FROM wishlists WHERE id = $1")
            .bind(wishlist_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_wishlist).transpose()
    }

    async fn public_wishlist(&self, slug: &str) -> Result<Option<Wishlist>> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, public_slug FROM wishlists WHERE public_slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_wishlist).transpose()
    }

    async fn item(&self, item_id: ItemId) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
            .bind(item_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn items_in_wishlist(&self, wishlist_id: WishlistId) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE wishlist_id = $1"
        ))
        .bind(wishlist_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn items_in_public_wishlist(&self, slug: &str) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.wishlist_id, i.name, i.price_cents, i.price_currency,
                   i.claimed_by_account, i.claimed_at
            FROM items i
            JOIN wishlists w ON w.id = i.wishlist_id
            WHERE w.public_slug = $1
            "#,
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }
}
