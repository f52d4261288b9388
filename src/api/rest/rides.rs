use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post, put};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::envelope::Envelope;
use crate::api::rest::actor::CurrentActor;
use crate::api::rest::extract::{Json, Path, Query};
use crate::engine::lifecycle::{cancel_ride, complete_ride, mark_arrived, start_ride, update_driver_location};
use crate::engine::queries::{
    driver_earnings, get_booking, list_bookings_for_user, recent_places, ride_history, ride_summary,
};
use crate::error::AppError;
use crate::models::booking::{
    Booking, BookingWithRouting, Earnings, EarningsPeriod, RecentPlace, RideHistory, RideSummary,
};
use crate::models::routing::{GeoPoint, RoutingLeg};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", get(list))
        .route("/rides/history", get(history))
        .route("/rides/recent-places", get(places))
        .route("/rides/earnings", get(earnings))
        .route("/rides/:id", get(show))
        .route("/rides/:id/summary", get(summary))
        .route("/rides/:id/arrive", post(arrive))
        .route("/rides/:id/start", post(start))
        .route("/rides/:id/complete", post(complete))
        .route("/rides/:id/cancel", post(cancel))
        .route("/rides/:id/driver-location", put(driver_location))
}

#[derive(Deserialize)]
pub struct StartBody {
    pub otp: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct LocationBody {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
pub struct EarningsParams {
    pub period: EarningsPeriod,
}

async fn list(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Envelope<Vec<Booking>>>, AppError> {
    let bookings = list_bookings_for_user(&state, actor).await?;
    Ok(Json(Envelope::ok(format!("{} rides", bookings.len()), bookings)))
}

async fn history(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Envelope<RideHistory>>, AppError> {
    let history = ride_history(&state, actor).await?;
    Ok(Json(Envelope::ok("ride history", history)))
}

async fn places(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<Envelope<Vec<RecentPlace>>>, AppError> {
    let places = recent_places(&state, actor).await?;
    Ok(Json(Envelope::ok("recent places", places)))
}

async fn earnings(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Query(params): Query<EarningsParams>,
) -> Result<Json<Envelope<Earnings>>, AppError> {
    let earnings = driver_earnings(&state, actor, params.period).await?;
    Ok(Json(Envelope::ok("driver earnings", earnings)))
}

async fn show(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<BookingWithRouting>>, AppError> {
    let booking = get_booking(&state, actor, id).await?;
    Ok(Json(Envelope::ok("ride found", booking)))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<RideSummary>>, AppError> {
    let summary = ride_summary(&state, actor, id).await?;
    Ok(Json(Envelope::ok("ride summary", summary)))
}

async fn arrive(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Booking>>, AppError> {
    let booking = mark_arrived(&state, actor, id).await?;
    Ok(Json(Envelope::ok("driver arrived", booking.visible_to(&actor))))
}

async fn start(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    body: Option<Json<StartBody>>,
) -> Result<Json<Envelope<Booking>>, AppError> {
    let otp = body.and_then(|Json(body)| body.otp);
    let booking = start_ride(&state, actor, id, otp.as_deref()).await?;
    Ok(Json(Envelope::ok("ride started", booking.visible_to(&actor))))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Booking>>, AppError> {
    let booking = complete_ride(&state, actor, id).await?;
    Ok(Json(Envelope::ok("ride completed", booking.visible_to(&actor))))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelBody>,
) -> Result<Json<Envelope<Booking>>, AppError> {
    let booking = cancel_ride(&state, actor, id, &payload.reason).await?;
    Ok(Json(Envelope::ok("ride cancelled", booking.visible_to(&actor))))
}

async fn driver_location(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationBody>,
) -> Result<Json<Envelope<RoutingLeg>>, AppError> {
    let location = GeoPoint {
        lat: payload.lat,
        lng: payload.lng,
    };
    let leg = update_driver_location(&state, actor, id, location).await?;
    Ok(Json(Envelope::ok("driver location updated", leg)))
}
