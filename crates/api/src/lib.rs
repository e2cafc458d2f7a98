//! HTTP API server for wish-list reservations.
//!
//! Exposes the reservation operations over REST, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use reservation_store::ReservationStore;
use reservations::{Notifier, ReservationCoordinator};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::reservations::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, N>(state: Arc<AppState<S, N>>, metrics_handle: PrometheusHandle) -> Router
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/wishlists/{wishlist_id}/items/{item_id}/reservation",
            post(routes::reservations::create::<S, N>)
                .delete(routes::reservations::cancel::<S, N>),
        )
        .route(
            "/wishlists/{wishlist_id}/items/{item_id}/reservation/purchase",
            post(routes::reservations::purchase::<S, N>),
        )
        .route(
            "/public/{slug}/items/{item_id}/reservation",
            get(routes::reservations::status::<S, N>),
        )
        .route("/reservations", get(routes::reservations::list::<S, N>))
        .route(
            "/reservations/count",
            get(routes::reservations::count::<S, N>),
        )
        .route(
            "/guest/reservations",
            get(routes::reservations::guest_list::<S, N>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a store and notifier, applying the
/// configured expiry rules and store deadline.
pub fn create_state<S, N>(store: S, notifier: N, config: &Config) -> Arc<AppState<S, N>>
where
    S: ReservationStore,
    N: Notifier,
{
    let coordinator = ReservationCoordinator::new(store, notifier)
        .with_policy(config.expiration_policy())
        .with_store_timeout(config.store_timeout());

    Arc::new(AppState {
        coordinator: Arc::new(coordinator),
    })
}
