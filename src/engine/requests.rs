use chrono::Duration;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::engine::fare::calculate_fare;
use crate::engine::{active_customer, ensure_role};
use crate::error::AppError;
use crate::geo::is_valid_point;
use crate::models::audit::{EntityKind, EventActor, RequestEvent, StatusLog};
use crate::models::fare::FareBreakdown;
use crate::models::request::{NewRideRequest, RequestWithRouting, RideRequest};
use crate::models::routing::RoutingLeg;
use crate::models::status::RideStatus;
use crate::models::user::{Actor, UserRole};
use crate::observability::metrics::outcome;
use crate::state::AppState;

/// Prices a prospective ride against the active schedule without storing it.
pub async fn quote_fare(state: &AppState, distance_km: Decimal, duration_min: i32) -> Result<FareBreakdown, AppError> {
    let schedule = state.store.active_fare_schedule().await?;
    calculate_fare(schedule.as_ref(), distance_km, duration_min).inspect_err(|err| err.log("quote_fare"))
}

pub async fn create_request(
    state: &AppState,
    actor: Actor,
    input: NewRideRequest,
) -> Result<RequestWithRouting, AppError> {
    let result = create_request_inner(state, actor, input).await;

    state
        .metrics
        .ride_requests_total
        .with_label_values(&[outcome(&result)])
        .inc();

    result.inspect_err(|err| err.log("create_request"))
}

async fn create_request_inner(
    state: &AppState,
    actor: Actor,
    input: NewRideRequest,
) -> Result<RequestWithRouting, AppError> {
    ensure_role(&actor, UserRole::Customer)?;
    validate_routing(&input)?;

    let customer = active_customer(state, &actor).await?;
    let schedule = state.store.active_fare_schedule().await?;
    let fare = calculate_fare(schedule.as_ref(), input.distance_km, input.duration_min)?;

    let now = state.clock.now();
    let request = RideRequest {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        fare_schedule_id: fare.fare_schedule_id,
        ride_type: input.ride_type,
        distance_km: fare.distance_km,
        planned_minutes: input.duration_min,
        base_fare: fare.base,
        total_fare: fare.total,
        status: RideStatus::Requested,
        expires_at: now + Duration::seconds(state.settings.request_ttl_secs),
        confirmed_driver_id: None,
        confirmed_booking_id: None,
        created_at: now,
        updated_at: now,
    };
    let mut routing: Vec<RoutingLeg> = input
        .routing
        .iter()
        .map(|leg| RoutingLeg::from_input(request.id, leg))
        .collect();
    routing.sort_by_key(|leg| leg.seq);

    let mut tx = state.store.begin().await?;
    tx.insert_request(&request, &routing).await?;
    tx.append_event(&RequestEvent::new(
        request.id,
        "request_created",
        EventActor::Customer,
        Some(customer.id),
        json!({
            "ride_type": request.ride_type,
            "distance_km": request.distance_km,
            "base_fare": request.base_fare,
            "total_fare": request.total_fare,
        }),
        now,
    ))
    .await?;
    tx.append_status_log(&StatusLog::new(
        EntityKind::Request,
        request.id,
        RideStatus::Requested.as_str(),
        "ride requested",
        Some(customer.id),
        now,
    ))
    .await?;
    tx.commit().await?;

    info!(
        request_id = %request.id,
        customer_id = %customer.id,
        total_fare = %request.total_fare,
        expires_at = %request.expires_at,
        "ride request created"
    );

    Ok(RequestWithRouting { request, routing })
}

pub async fn get_request(state: &AppState, request_id: Uuid) -> Result<RequestWithRouting, AppError> {
    let result: Result<RequestWithRouting, AppError> = async {
        let request = state
            .store
            .get_request(request_id)
            .await?
            .ok_or(AppError::RequestNotFound(request_id))?;
        let routing = state.store.request_routing(request_id).await?;

        Ok(RequestWithRouting { request, routing })
    }
    .await;

    result.inspect_err(|err| err.log("get_request"))
}

fn validate_routing(input: &NewRideRequest) -> Result<(), AppError> {
    if input.routing.is_empty() {
        return Err(AppError::Validation("routing must contain at least one leg".to_string()));
    }

    if let Some(leg) = input.routing.iter().find(|leg| !is_valid_point(leg.lat, leg.lng)) {
        return Err(AppError::Validation(format!(
            "leg {} has invalid coordinates ({}, {})",
            leg.seq, leg.lat, leg.lng
        )));
    }

    Ok(())
}
