use chrono::{Duration, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use reservation_store::{
    AccountId, InMemoryReservationStore, Item, ItemClaimStore, ItemId, NewReservation, Page,
    ReservationLedger, Wishlist,
};

async fn seeded_store(items: usize) -> (InMemoryReservationStore, Vec<ItemId>) {
    let store = InMemoryReservationStore::new();
    let wishlist = Wishlist::new(AccountId::new(), "Bench");
    let wishlist_id = wishlist.id;
    store.insert_wishlist(wishlist).await;

    let mut ids = Vec::with_capacity(items);
    for n in 0..items {
        let item = Item::new(wishlist_id, format!("Item {n}"));
        ids.push(item.id);
        store.insert_item(item).await;
    }
    (store, ids)
}

fn bench_claim_and_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, ids) = rt.block_on(seeded_store(1));
    let item_id = ids[0];

    c.bench_function("reservation_store/claim_and_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .claim_if_unclaimed(item_id, AccountId::new(), Utc::now())
                    .await
                    .unwrap();
                store.release(item_id).await.unwrap();
            });
        });
    });
}

fn bench_guest_create(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("reservation_store/guest_create", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (store, ids) = seeded_store(1).await;
                let new = NewReservation::for_guest(
                    ids[0],
                    "Bench Guest",
                    "guest@bench.test",
                    Utc::now(),
                    Duration::days(30),
                );
                store.create(new).await.unwrap();
            });
        });
    });
}

fn bench_list_by_account(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let account = AccountId::new();
    let (store, ids) = rt.block_on(seeded_store(200));

    // One reservation per item for the same account
    rt.block_on(async {
        for id in &ids {
            store
                .create(NewReservation::for_account(*id, account, Utc::now()))
                .await
                .unwrap();
        }
    });

    c.bench_function("reservation_store/list_by_account_page", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .list_by_account(account, Page::default())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_expired_candidates(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, ids) = rt.block_on(seeded_store(500));
    let created = Utc::now();

    rt.block_on(async {
        for id in &ids {
            let new =
                NewReservation::for_guest(*id, "Guest", "g@bench.test", created, Duration::days(1));
            store.create(new).await.unwrap();
        }
    });

    let later = created + Duration::days(2);
    c.bench_function("reservation_store/expired_candidates_500", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.expired_candidates(later, 100).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_claim_and_release,
    bench_guest_create,
    bench_list_by_account,
    bench_expired_candidates
);
criterion_main!(benches);
