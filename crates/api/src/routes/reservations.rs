//! Reservation endpoints.
//!
//! Authentication happens upstream: the gateway forwards the caller's
//! account in `X-Account-Id`. Guests present the token they received at
//! reservation time in `X-Reservation-Token`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use reservation_store::{CancelReason, Page, Reservation, ReservationStore};
use reservations::{
    CreateReservation, DisplayStatus, ItemAvailability, Notifier, ReservationCoordinator,
    ReservationError, ReservationSummary, ReservationTarget, display_name,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const ACCOUNT_HEADER: &str = "x-account-id";
pub const TOKEN_HEADER: &str = "x-reservation-token";

/// Shared application state accessible from all handlers.
pub struct AppState<S, N>
where
    S: ReservationStore,
    N: Notifier,
{
    pub coordinator: Arc<ReservationCoordinator<S, N>>,
}

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateReservationRequest {
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ReservationResponse {
    pub reservation_id: String,
    pub item_id: String,
    pub status: DisplayStatus,
    pub reserved_by: String,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<CancelReason>,
    pub purchased_at: Option<DateTime<Utc>>,
    /// Only returned once, when a guest reservation is created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl ReservationResponse {
    fn from_reservation(reservation: &Reservation) -> Self {
        Self {
            reservation_id: reservation.id.to_string(),
            item_id: reservation.item_id.to_string(),
            status: DisplayStatus::of(reservation),
            reserved_by: display_name(reservation),
            reserved_at: reservation.reserved_at,
            expires_at: reservation.expires_at,
            canceled_at: reservation.canceled_at,
            cancel_reason: reservation.cancel_reason,
            purchased_at: reservation.purchased_at,
            token: None,
        }
    }

    fn with_token(mut self, reservation: &Reservation) -> Self {
        self.token = reservation.token.as_ref().map(|t| t.as_str().to_string());
        self
    }
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

// -- Handlers --

/// POST /wishlists/:wishlist_id/items/:item_id/reservation — reserve an item.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S, N>(
    State(state): State<Arc<AppState<S, N>>>,
    Path((wishlist_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError>
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    let cmd = CreateReservation {
        wishlist_id,
        item_id,
        account_id: header(&headers, ACCOUNT_HEADER)?,
        guest_name: req.guest_name,
        guest_email: req.guest_email,
    };
    let reservation = state.coordinator.create_reservation(cmd).await?;

    let response = ReservationResponse::from_reservation(&reservation).with_token(&reservation);
    Ok((StatusCode::CREATED, Json(response)))
}

/// DELETE /wishlists/:wishlist_id/items/:item_id/reservation — cancel the caller's reservation.
#[tracing::instrument(skip(state, headers))]
pub async fn cancel<S, N>(
    State(state): State<Arc<AppState<S, N>>>,
    Path((wishlist_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<ReservationResponse>, ApiError>
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    let target = target(wishlist_id, item_id, &headers)?;
    let reservation = state.coordinator.cancel_reservation(target).await?;
    Ok(Json(ReservationResponse::from_reservation(&reservation)))
}

/// POST /wishlists/:wishlist_id/items/:item_id/reservation/purchase — mark the gift bought.
#[tracing::instrument(skip(state, headers))]
pub async fn purchase<S, N>(
    State(state): State<Arc<AppState<S, N>>>,
    Path((wishlist_id, item_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<ReservationResponse>, ApiError>
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    let target = target(wishlist_id, item_id, &headers)?;
    let reservation = state.coordinator.mark_purchased(target).await?;
    Ok(Json(ReservationResponse::from_reservation(&reservation)))
}

/// GET /public/:slug/items/:item_id/reservation — public availability of an item.
#[tracing::instrument(skip(state))]
pub async fn status<S, N>(
    State(state): State<Arc<AppState<S, N>>>,
    Path((slug, item_id)): Path<(String, String)>,
) -> Result<Json<ItemAvailability>, ApiError>
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    let availability = state
        .coordinator
        .get_reservation_status(&slug, &item_id)
        .await?;
    Ok(Json(availability))
}

/// GET /reservations — the caller's reservations, newest first.
#[tracing::instrument(skip(state, headers))]
pub async fn list<S, N>(
    State(state): State<Arc<AppState<S, N>>>,
    Query(params): Query<PageParams>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReservationSummary>>, ApiError>
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    let account_id = required(&headers, ACCOUNT_HEADER)?;
    let page = Page::from_params(params.limit, params.offset);
    let summaries = state
        .coordinator
        .get_user_reservations(&account_id, page)
        .await?;
    Ok(Json(summaries))
}

/// GET /reservations/count — how many reservations the caller has made.
#[tracing::instrument(skip(state, headers))]
pub async fn count<S, N>(
    State(state): State<Arc<AppState<S, N>>>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, ApiError>
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    let account_id = required(&headers, ACCOUNT_HEADER)?;
    let count = state
        .coordinator
        .count_user_reservations(&account_id)
        .await?;
    Ok(Json(CountResponse { count }))
}

/// GET /guest/reservations — reservations made under the presented guest token.
#[tracing::instrument(skip(state, headers))]
pub async fn guest_list<S, N>(
    State(state): State<Arc<AppState<S, N>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ReservationSummary>>, ApiError>
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    let token = required(&headers, TOKEN_HEADER)?;
    let summaries = state.coordinator.get_guest_reservations(&token).await?;
    Ok(Json(summaries))
}

fn target(
    wishlist_id: String,
    item_id: String,
    headers: &HeaderMap,
) -> Result<ReservationTarget, ApiError> {
    Ok(ReservationTarget {
        wishlist_id,
        item_id,
        account_id: header(headers, ACCOUNT_HEADER)?,
        token: header(headers, TOKEN_HEADER)?,
    })
}

/// Reads an optional header; blank values count as absent.
fn header(headers: &HeaderMap, name: &str) -> Result<Option<String>, ApiError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::BadRequest(format!("Invalid {name} header")))?
                .trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
    }
}

fn required(headers: &HeaderMap, name: &str) -> Result<String, ApiError> {
    header(headers, name)?.ok_or(ApiError::Reservation(ReservationError::MissingUserOrToken))
}
