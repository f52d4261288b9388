use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::api::envelope::Envelope;
use crate::api::rest::extract::{Json, Query};
use crate::engine::requests::quote_fare;
use crate::error::AppError;
use crate::models::fare::FareBreakdown;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/fares/quote", get(quote))
}

#[derive(Deserialize)]
pub struct QuoteParams {
    pub distance_km: Decimal,
    #[serde(default)]
    pub duration_min: i32,
}

async fn quote(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<Envelope<FareBreakdown>>, AppError> {
    let fare = quote_fare(&state, params.distance_km, params.duration_min).await?;
    Ok(Json(Envelope::ok("fare calculated", fare)))
}
