//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use reservation_store::{AccountId, InMemoryReservationStore, Item, Money, Wishlist};
use reservations::{InMemoryNotifier, NotificationKind};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    notifier: InMemoryNotifier,
    wishlist: Wishlist,
    item: Item,
}

impl TestApp {
    fn reservation_uri(&self) -> String {
        format!(
            "/wishlists/{}/items/{}/reservation",
            self.wishlist.id, self.item.id
        )
    }

    fn status_uri(&self) -> String {
        format!("/public/shower/items/{}/reservation", self.item.id)
    }
}

async fn setup() -> TestApp {
    let store = InMemoryReservationStore::new();
    let notifier = InMemoryNotifier::new();
    let wishlist = Wishlist::new(AccountId::new(), "Baby shower").with_public_slug("shower");
    let item = Item::new(wishlist.id, "Stroller").with_price(Money::usd(19999));
    store.insert_wishlist(wishlist.clone()).await;
    store.insert_item(item.clone()).await;

    let state = api::create_state(store, notifier.clone(), &api::config::Config::default());
    let app = api::create_app(state, get_metrics_handle());

    TestApp {
        app,
        notifier,
        wishlist,
        item,
    }
}

async fn send(app: &axum::Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn json_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
}

fn guest_body() -> Body {
    Body::from(
        serde_json::json!({
            "guest_name": "Ann",
            "guest_email": "ann@x.test"
        })
        .to_string(),
    )
}

async fn reserve_as_guest(t: &TestApp) -> String {
    let response = send(
        &t.app,
        json_request("POST", &t.reservation_uri())
            .body(guest_body())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let response = send(
        &t.app,
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;
    reserve_as_guest(&t).await;

    let response = send(
        &t.app,
        Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_guest_reserve_returns_token_and_blocks_item() {
    let t = setup().await;
    let token = reserve_as_guest(&t).await;
    assert_eq!(token.len(), 43);

    let status = body_json(
        send(
            &t.app,
            Request::builder()
                .uri(t.status_uri())
                .body(Body::empty())
                .unwrap(),
        )
        .await,
    )
    .await;
    assert_eq!(status["status"], "reserved");
    assert_eq!(status["reserved_by"], "Ann");
    assert!(status.get("guest_email").is_none());

    let second = send(
        &t.app,
        json_request("POST", &t.reservation_uri())
            .body(guest_body())
            .unwrap(),
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_account_reserve_and_cancel() {
    let t = setup().await;
    let account = AccountId::new().to_string();

    let created = send(
        &t.app,
        json_request("POST", &t.reservation_uri())
            .header("X-Account-Id", &account)
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    assert_eq!(created["reserved_by"], reservations::ACCOUNT_DISPLAY_NAME);
    assert!(created.get("token").is_none());

    let cancelled = send(
        &t.app,
        Request::builder()
            .method("DELETE")
            .uri(t.reservation_uri())
            .header("X-Account-Id", &account)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(cancelled.status(), StatusCode::OK);
    let cancelled = body_json(cancelled).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancel_reason"], "user_cancelled");

    // A second cancel returns the same terminal reservation
    let again = send(
        &t.app,
        Request::builder()
            .method("DELETE")
            .uri(t.reservation_uri())
            .header("X-Account-Id", &account)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(body_json(again).await["canceled_at"], cancelled["canceled_at"]);
}

#[tokio::test]
async fn test_guest_cancel_with_token() {
    let t = setup().await;
    let token = reserve_as_guest(&t).await;

    let response = send(
        &t.app,
        Request::builder()
            .method("DELETE")
            .uri(t.reservation_uri())
            .header("X-Reservation-Token", &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(t.notifier.count(NotificationKind::Cancelled), 1);

    let status = body_json(
        send(
            &t.app,
            Request::builder()
                .uri(t.status_uri())
                .body(Body::empty())
                .unwrap(),
        )
        .await,
    )
    .await;
    assert_eq!(status["status"], "available");
}

#[tokio::test]
async fn test_cancel_without_identity_is_bad_request() {
    let t = setup().await;

    let response = send(
        &t.app,
        Request::builder()
            .method("DELETE")
            .uri(t.reservation_uri())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("token"));
}

#[tokio::test]
async fn test_guest_info_required() {
    let t = setup().await;

    let response = send(
        &t.app,
        json_request("POST", &t.reservation_uri())
            .body(Body::from(r#"{"guest_name": "Ann"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_item_id() {
    let t = setup().await;

    let response = send(
        &t.app,
        json_request(
            "POST",
            &format!("/wishlists/{}/items/not-a-uuid/reservation", t.wishlist.id),
        )
        .body(guest_body())
        .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_item_not_in_wishlist() {
    let t = setup().await;

    let response = send(
        &t.app,
        json_request(
            "POST",
            &format!(
                "/wishlists/{}/items/{}/reservation",
                reservation_store::WishlistId::new(),
                t.item.id
            ),
        )
        .body(guest_body())
        .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let status = send(
        &t.app,
        Request::builder()
            .uri(format!("/public/unknown/items/{}/reservation", t.item.id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_purchase_reported_on_public_status() {
    let t = setup().await;
    let token = reserve_as_guest(&t).await;

    let response = send(
        &t.app,
        Request::builder()
            .method("POST")
            .uri(format!("{}/purchase", t.reservation_uri()))
            .header("X-Reservation-Token", &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let purchased = body_json(response).await;
    assert_eq!(purchased["status"], "purchased");
    assert!(purchased["expires_at"].is_null());

    let status = body_json(
        send(
            &t.app,
            Request::builder()
                .uri(t.status_uri())
                .body(Body::empty())
                .unwrap(),
        )
        .await,
    )
    .await;
    assert_eq!(status["status"], "purchased");
}

#[tokio::test]
async fn test_user_listing_and_count() {
    let t = setup().await;
    let account = AccountId::new().to_string();

    send(
        &t.app,
        json_request("POST", &t.reservation_uri())
            .header("X-Account-Id", &account)
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;

    let list = send(
        &t.app,
        Request::builder()
            .uri("/reservations?limit=500&offset=0")
            .header("X-Account-Id", &account)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(list.status(), StatusCode::OK);
    let list = body_json(list).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["item_name"], "Stroller");
    assert_eq!(list[0]["price"], "$199.99");
    assert_eq!(list[0]["wishlist_title"], "Baby shower");

    let count = send(
        &t.app,
        Request::builder()
            .uri("/reservations/count")
            .header("X-Account-Id", &account)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body_json(count).await["count"], 1);

    let anonymous = send(
        &t.app,
        Request::builder()
            .uri("/reservations")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(anonymous.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_guest_listing() {
    let t = setup().await;
    let token = reserve_as_guest(&t).await;

    let response = send(
        &t.app,
        Request::builder()
            .uri("/guest/reservations")
            .header("X-Reservation-Token", &token)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0]["status"], "reserved");

    let missing = send(
        &t.app,
        Request::builder()
            .uri("/guest/reservations")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}
