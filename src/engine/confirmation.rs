use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::engine::fare::{calculate_fare, verify_request_fare};
use crate::engine::otp::generate_otp;
use crate::engine::rating::aggregate;
use crate::engine::{active_customer, ensure_role, known_driver};
use crate::error::AppError;
use crate::models::audit::{EntityKind, EventActor, RequestEvent, StatusLog};
use crate::models::booking::Booking;
use crate::models::rating::RatingSnapshot;
use crate::models::routing::{LegType, RoutingLeg};
use crate::models::status::{OfferStatus, RideStatus};
use crate::models::user::{Actor, UserRole};
use crate::notify::{Notification, dispatch};
use crate::observability::metrics::outcome;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub booking: Booking,
    pub routing: Vec<RoutingLeg>,
    pub driver_rating: RatingSnapshot,
    pub customer_rating: RatingSnapshot,
}

struct Committed {
    booking: Booking,
    routing: Vec<RoutingLeg>,
    rejected_drivers: Vec<Uuid>,
    driver_rating: RatingSnapshot,
    customer_rating: RatingSnapshot,
}

/// Accepts one driver's offer on the caller's request and creates the booking.
///
/// Runs as one transaction holding the request lock and every offer lock for
/// the request. A request that another confirmation already won is no longer
/// open, so the loser fails with `RequestNotOfferable` before any fare work.
pub async fn confirm(state: &AppState, actor: Actor, request_id: Uuid, driver_id: Uuid) -> Result<Confirmation, AppError> {
    let started = Instant::now();
    let result = confirm_inner(state, actor, request_id, driver_id).await;
    let label = outcome(&result);

    state
        .metrics
        .confirmation_latency_seconds
        .with_label_values(&[label])
        .observe(started.elapsed().as_secs_f64());
    state.metrics.confirmations_total.with_label_values(&[label]).inc();

    let committed = result.inspect_err(|err| err.log("confirm"))?;
    let booking = committed.booking;

    let metadata = json!({ "request_id": request_id, "booking_id": booking.id });
    let mut notifications = vec![
        Notification::new(
            booking.driver_id,
            "Ride Confirmed",
            "The customer accepted your offer. Head to the pickup point.",
            metadata.clone(),
        ),
        Notification::new(
            booking.customer_id,
            "Driver Assigned",
            format!("Your driver is on the way. Share OTP {} at pickup.", booking.otp_code),
            metadata.clone(),
        ),
    ];
    notifications.extend(committed.rejected_drivers.iter().map(|loser| {
        Notification::new(
            *loser,
            "Offer Not Selected",
            "The customer chose another driver for this ride.",
            json!({ "request_id": request_id }),
        )
    }));
    dispatch(state.notifier.as_ref(), notifications).await;

    Ok(Confirmation {
        booking,
        routing: committed.routing,
        driver_rating: committed.driver_rating,
        customer_rating: committed.customer_rating,
    })
}

async fn confirm_inner(state: &AppState, actor: Actor, request_id: Uuid, driver_id: Uuid) -> Result<Committed, AppError> {
    ensure_role(&actor, UserRole::Customer)?;

    let customer = active_customer(state, &actor).await?;
    let driver = known_driver(state, driver_id).await?;
    if !driver.is_online {
        return Err(AppError::DriverOffline(driver_id));
    }
    let schedule = state.store.active_fare_schedule().await?;
    let driver_rating = aggregate(&state.store.ratings_for(driver.id).await?);
    let customer_rating = aggregate(&state.store.ratings_for(customer.id).await?);

    let now = state.clock.now();
    let mut tx = state.store.begin().await?;

    let mut request = tx
        .lock_request(request_id)
        .await?
        .ok_or(AppError::RequestNotFound(request_id))?;
    if request.customer_id != customer.id {
        return Err(AppError::NotAssignedParty(UserRole::Customer));
    }
    if !request.status.is_open_request() {
        return Err(AppError::RequestNotOfferable(request.status));
    }
    if request.is_expired_at(now) {
        return Err(AppError::RequestExpired(request_id));
    }

    let fare = calculate_fare(schedule.as_ref(), request.distance_km, request.planned_minutes)?;
    verify_request_fare(&request, &fare)?;

    let mut offers = tx.lock_offers(request_id).await?;
    let chosen = offers
        .iter()
        .find(|offer| offer.driver_id == driver_id)
        .ok_or(AppError::OfferNotFound(driver_id))?;
    if chosen.status != OfferStatus::Active {
        return Err(AppError::OfferNotActive(chosen.status));
    }
    if chosen.expires_at <= now {
        return Err(AppError::OfferExpired(driver_id));
    }
    let (driver_lat, driver_lng) = chosen
        .snapshot
        .driver_lat
        .zip(chosen.snapshot.driver_lng)
        .ok_or(AppError::DriverLocationMissing)?;
    let chosen_offer_id = chosen.id;

    let mut rejected_drivers = Vec::new();
    for offer in offers.iter_mut() {
        let next = if offer.id == chosen_offer_id {
            OfferStatus::Selected
        } else if offer.status == OfferStatus::Active {
            rejected_drivers.push(offer.driver_id);
            OfferStatus::Rejected
        } else {
            continue;
        };

        offer.status = next;
        tx.update_offer(offer).await?;
        tx.append_status_log(&StatusLog::new(
            EntityKind::Offer,
            offer.id,
            next.as_str(),
            if next == OfferStatus::Selected {
                "offer selected by customer"
            } else {
                "another offer was selected"
            },
            Some(customer.id),
            now,
        ))
        .await?;
    }

    let booking = Booking {
        id: Uuid::new_v4(),
        request_id,
        customer_id: customer.id,
        driver_id,
        fare_schedule_id: fare.fare_schedule_id,
        ride_type: request.ride_type,
        distance_km: request.distance_km,
        planned_minutes: request.planned_minutes,
        base_fare: fare.base,
        surcharge_amount: fare.surcharge,
        app_fee_amount: fare.app_fee,
        company_fee_amount: fare.company_fee,
        driver_fee_amount: fare.driver_fee,
        additional_cost: fare.additional_cost,
        discount: fare.discount,
        traffic_delay_amount: Decimal::ZERO,
        total_fare: fare.total,
        status: RideStatus::Confirmed,
        otp_code: generate_otp(),
        ride_start_time: None,
        ride_end_time: None,
        delay_minutes: 0,
        cancel_reason: None,
        created_at: now,
        updated_at: now,
    };

    let mut routing: Vec<RoutingLeg> = tx
        .request_routing(request_id)
        .await?
        .into_iter()
        .map(|leg| RoutingLeg {
            id: Uuid::new_v4(),
            owner_id: booking.id,
            ..leg
        })
        .collect();
    let next_seq = routing.iter().map(|leg| leg.seq).max().map_or(0, |seq| seq + 1);
    routing.push(RoutingLeg {
        id: Uuid::new_v4(),
        owner_id: booking.id,
        leg_type: LegType::DriverLocation,
        lat: driver_lat,
        lng: driver_lng,
        address: String::new(),
        seq: next_seq,
    });
    tx.insert_booking(&booking, &routing).await?;

    request.status = RideStatus::Confirmed;
    request.confirmed_driver_id = Some(driver_id);
    request.confirmed_booking_id = Some(booking.id);
    request.updated_at = now;
    tx.update_request(&request).await?;

    tx.append_event(&RequestEvent::new(
        request_id,
        "customer_selected_driver",
        EventActor::Customer,
        Some(customer.id),
        json!({ "driver_id": driver_id, "offer_id": chosen_offer_id }),
        now,
    ))
    .await?;
    tx.append_event(&RequestEvent::new(
        request_id,
        "request_confirmed",
        EventActor::Customer,
        Some(customer.id),
        json!({
            "booking_id": booking.id,
            "driver_id": driver_id,
            "rejected_offers": rejected_drivers.len(),
        }),
        now,
    ))
    .await?;
    tx.append_status_log(&StatusLog::new(
        EntityKind::Request,
        request_id,
        RideStatus::Confirmed.as_str(),
        "request confirmed",
        Some(customer.id),
        now,
    ))
    .await?;
    tx.append_status_log(&StatusLog::new(
        EntityKind::Booking,
        booking.id,
        RideStatus::Confirmed.as_str(),
        "ride confirmed",
        Some(customer.id),
        now,
    ))
    .await?;
    tx.commit().await?;

    info!(
        request_id = %request_id,
        booking_id = %booking.id,
        driver_id = %driver_id,
        rejected = rejected_drivers.len(),
        "ride confirmed"
    );

    Ok(Committed {
        booking,
        routing,
        rejected_drivers,
        driver_rating,
        customer_rating,
    })
}
