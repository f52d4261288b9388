use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::envelope::Envelope;
use crate::api::rest::actor::CurrentActor;
use crate::api::rest::extract::{Json, Path};
use crate::engine::confirmation::{Confirmation, confirm};
use crate::engine::offers::{list_offers, submit_offer, withdraw_offer};
use crate::engine::requests::{create_request, get_request};
use crate::error::AppError;
use crate::models::offer::DriverOffer;
use crate::models::request::{NewRideRequest, RequestWithRouting};
use crate::models::routing::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ride-requests", post(create))
        .route("/ride-requests/:id", get(show))
        .route(
            "/ride-requests/:id/offers",
            get(offers).post(offer).delete(withdraw),
        )
        .route("/ride-requests/:id/confirm", post(confirm_offer))
}

#[derive(Deserialize)]
pub struct OfferBody {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
pub struct ConfirmBody {
    pub driver_id: Uuid,
}

async fn create(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<NewRideRequest>,
) -> Result<(StatusCode, Json<Envelope<RequestWithRouting>>), AppError> {
    let created = create_request(&state, actor, payload).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok("ride request created", created))))
}

async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<RequestWithRouting>>, AppError> {
    let request = get_request(&state, id).await?;
    Ok(Json(Envelope::ok("ride request found", request)))
}

async fn offers(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<DriverOffer>>>, AppError> {
    let offers = list_offers(&state, actor, id).await?;
    Ok(Json(Envelope::ok(format!("{} live offers", offers.len()), offers)))
}

async fn offer(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<OfferBody>,
) -> Result<Json<Envelope<DriverOffer>>, AppError> {
    let location = GeoPoint {
        lat: payload.lat,
        lng: payload.lng,
    };
    let offer = submit_offer(&state, actor, id, location).await?;
    Ok(Json(Envelope::ok("offer submitted", offer)))
}

async fn withdraw(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<DriverOffer>>, AppError> {
    let offer = withdraw_offer(&state, actor, id).await?;
    Ok(Json(Envelope::ok("offer withdrawn", offer)))
}

async fn confirm_offer(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmBody>,
) -> Result<Json<Envelope<Confirmation>>, AppError> {
    let confirmation = confirm(&state, actor, id, payload.driver_id).await?;
    Ok(Json(Envelope::ok("ride confirmed", confirmation)))
}
