//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency and truncate
//! the tables between tests, so they run serially.
//! Run with:
//!
//! ```bash
//! cargo test -p reservation-store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures_util::future::join_all;
use reservation_store::{
    AccountId, CancelReason, Item, ItemCatalog, ItemClaimStore, ItemId, Money, NewReservation,
    Page, PostgresReservationStore, ReservationLedger, ReservationStatus, StoreError, Wishlist,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run migrations using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_reservation_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresReservationStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(16)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE reservations, items, wishlists")
        .execute(&pool)
        .await
        .unwrap();

    PostgresReservationStore::new(pool)
}

async fn seed(store: &PostgresReservationStore) -> (Wishlist, Item) {
    let wishlist = Wishlist::new(AccountId::new(), "Housewarming").with_public_slug("house");
    let item = Item::new(wishlist.id, "Cast iron pan").with_price(Money::usd(4599));
    store.insert_wishlist(&wishlist).await.unwrap();
    store.insert_item(&item).await.unwrap();
    (wishlist, item)
}

fn guest(item: &Item) -> NewReservation {
    NewReservation::for_guest(item.id, "Ann", "ann@x.test", Utc::now(), Duration::days(30))
}

#[tokio::test]
#[serial]
async fn claim_is_exclusive_under_contention() {
    let store = get_test_store().await;
    let (_, item) = seed(&store).await;
    let now = Utc::now();

    let attempts = (0..16).map(|_| {
        let store = store.clone();
        let item_id = item.id;
        tokio::spawn(async move {
            store
                .claim_if_unclaimed(item_id, AccountId::new(), now)
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::AlreadyClaimed(_))))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, 15);
}

#[tokio::test]
#[serial]
async fn claim_unknown_item_is_not_found() {
    let store = get_test_store().await;
    let result = store
        .claim_if_unclaimed(ItemId::new(), AccountId::new(), Utc::now())
        .await;
    assert!(matches!(result, Err(StoreError::ItemNotFound(_))));
}

#[tokio::test]
#[serial]
async fn release_clears_claim() {
    let store = get_test_store().await;
    let (_, item) = seed(&store).await;
    let account = AccountId::new();

    let claimed = store
        .claim_if_unclaimed(item.id, account, Utc::now())
        .await
        .unwrap();
    assert_eq!(claimed.claimed_by(), Some(account));

    let released = store.release(item.id).await.unwrap();
    assert!(!released.is_claimed());
}

#[tokio::test]
#[serial]
async fn conditional_release_respects_holder_and_claim_time() {
    let store = get_test_store().await;
    let (_, item) = seed(&store).await;
    let holder = AccountId::new();
    let claimed_at = Utc::now();
    store
        .claim_if_unclaimed(item.id, holder, claimed_at)
        .await
        .unwrap();

    let by_other = store
        .release_if_claimed_by(item.id, AccountId::new(), claimed_at)
        .await
        .unwrap();
    assert!(!by_other);
    let too_early = store
        .release_if_claimed_by(item.id, holder, claimed_at - Duration::seconds(1))
        .await
        .unwrap();
    assert!(!too_early);

    assert!(
        store
            .release_if_claimed_by(item.id, holder, claimed_at)
            .await
            .unwrap()
    );
    assert!(
        !store
            .release_if_claimed_by(item.id, holder, claimed_at)
            .await
            .unwrap()
    );
    let item = store.item(item.id).await.unwrap().unwrap();
    assert!(!item.is_claimed());

    let missing = store
        .release_if_claimed_by(ItemId::new(), holder, claimed_at)
        .await;
    assert!(matches!(missing, Err(StoreError::ItemNotFound(_))));
}

#[tokio::test]
#[serial]
async fn unique_index_rejects_second_active_reservation() {
    let store = get_test_store().await;
    let (_, item) = seed(&store).await;

    let attempts = (0..12).map(|_| {
        let store = store.clone();
        let new = guest(&item);
        tokio::spawn(async move { store.create(new).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(StoreError::AlreadyReserved(_))))
    );

    let active = store
        .active_reservation_for_item(item.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.status, ReservationStatus::Active);
}

#[tokio::test]
#[serial]
async fn create_for_missing_item_is_not_found() {
    let store = get_test_store().await;
    let new = NewReservation::for_account(
        ItemId::new(),
        AccountId::new(),
        Utc::now(),
    );
    let result = store.create(new).await;
    assert!(matches!(result, Err(StoreError::ItemNotFound(_))));
}

#[tokio::test]
#[serial]
async fn reservation_round_trips_through_row_mapping() {
    let store = get_test_store().await;
    let (_, item) = seed(&store).await;

    let created = store.create(guest(&item)).await.unwrap();
    let token = created.token.clone().unwrap();

    let loaded = store.get(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.guest_name(), Some("Ann"));
    assert_eq!(loaded.guest_email(), Some("ann@x.test"));
    assert_eq!(loaded.token.as_ref(), Some(&token));
    assert!(loaded.expires_at.is_some());

    let by_token = store.find_by_token(&token).await.unwrap().unwrap();
    assert_eq!(by_token.id, created.id);
}

#[tokio::test]
#[serial]
async fn transition_status_is_applied_once() {
    let store = get_test_store().await;
    let (_, item) = seed(&store).await;
    let created = store.create(guest(&item)).await.unwrap();
    let first_at = Utc::now();

    let first = store
        .transition_status(
            created.id,
            ReservationStatus::Cancelled,
            first_at,
            CancelReason::GuestCancelled,
        )
        .await
        .unwrap();
    assert!(first.is_applied());

    let second = store
        .transition_status(
            created.id,
            ReservationStatus::Cancelled,
            first_at + Duration::minutes(1),
            CancelReason::GuestCancelled,
        )
        .await
        .unwrap();
    assert!(!second.is_applied());
    assert_eq!(
        second.reservation().cancel_reason,
        Some(CancelReason::GuestCancelled)
    );
    assert_eq!(
        second.reservation().canceled_at.map(|t| t.timestamp_micros()),
        Some(first_at.timestamp_micros())
    );

    // The item is free again
    assert!(store.create(guest(&item)).await.is_ok());
}

#[tokio::test]
#[serial]
async fn concurrent_expiry_flips_exactly_once() {
    let store = get_test_store().await;
    let (_, item) = seed(&store).await;
    let created = store.create(guest(&item)).await.unwrap();
    let later = Utc::now() + Duration::days(31);

    let attempts = (0..10).map(|_| {
        let store = store.clone();
        let id = created.id;
        tokio::spawn(async move { store.transition_if_active_and_expired(id, later).await })
    });
    let flipped = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .filter(Option::is_some)
        .count();
    assert_eq!(flipped, 1);

    let loaded = store.get(created.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ReservationStatus::Expired);
}

#[tokio::test]
#[serial]
async fn cancel_and_expire_race_has_one_winner() {
    let store = get_test_store().await;
    let (_, item) = seed(&store).await;
    let created = store.create(guest(&item)).await.unwrap();
    let later = Utc::now() + Duration::days(31);

    let cancel = {
        let store = store.clone();
        let id = created.id;
        tokio::spawn(async move {
            store
                .transition_status(
                    id,
                    ReservationStatus::Cancelled,
                    later,
                    CancelReason::GuestCancelled,
                )
                .await
        })
    };
    let expire = {
        let store = store.clone();
        let id = created.id;
        tokio::spawn(async move { store.transition_if_active_and_expired(id, later).await })
    };

    let cancelled = cancel.await.unwrap().unwrap();
    let expired = expire.await.unwrap().unwrap();
    assert!(cancelled.is_applied() ^ expired.is_some());
}

#[tokio::test]
#[serial]
async fn purchase_and_expiry_candidates() {
    let store = get_test_store().await;
    let (wishlist, item) = seed(&store).await;
    let second = Item::new(wishlist.id, "Kettle");
    store.insert_item(&second).await.unwrap();

    let bought = store.create(guest(&item)).await.unwrap();
    let stale = store.create(guest(&second)).await.unwrap();
    let now = Utc::now();

    let purchased = store.mark_purchased(bought.id, now).await.unwrap().unwrap();
    assert!(purchased.expires_at.is_none());
    assert!(store.mark_purchased(bought.id, now).await.unwrap().is_none());

    let candidates = store
        .expired_candidates(now + Duration::days(31), 100)
        .await
        .unwrap();
    assert_eq!(candidates, vec![stale.id]);

    store.mark_notification_sent(stale.id).await.unwrap();
    assert!(store.get(stale.id).await.unwrap().unwrap().notification_sent);
}

#[tokio::test]
#[serial]
async fn listings_join_display_data() {
    let store = get_test_store().await;
    let (wishlist, item) = seed(&store).await;
    let account = AccountId::new();

    store
        .create(NewReservation::for_account(item.id, account, Utc::now()))
        .await
        .unwrap();

    let details = store
        .list_by_account(account, Page::default())
        .await
        .unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].item_name, "Cast iron pan");
    assert_eq!(details[0].item_price, Some(Money::usd(4599)));
    assert_eq!(details[0].wishlist_title, wishlist.title);
    assert_eq!(details[0].wishlist_slug.as_deref(), Some("house"));
    assert_eq!(store.count_by_account(account).await.unwrap(), 1);

    let latest = store
        .latest_for_account(item.id, account)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.account_id(), Some(account));
}

#[tokio::test]
#[serial]
async fn catalog_reads() {
    let store = get_test_store().await;
    let (wishlist, item) = seed(&store).await;

    let items = store.items_in_wishlist(wishlist.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, item.id);

    let public = store.items_in_public_wishlist("house").await.unwrap();
    assert_eq!(public.len(), 1);
    assert!(
        store
            .items_in_public_wishlist("nope")
            .await
            .unwrap()
            .is_empty()
    );

    let loaded = store.wishlist(wishlist.id).await.unwrap().unwrap();
    assert_eq!(loaded, wishlist);
    let by_slug = store.public_wishlist("house").await.unwrap().unwrap();
    assert_eq!(by_slug.id, wishlist.id);
}
