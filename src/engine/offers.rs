use chrono::Duration;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{ensure_role, known_driver};
use crate::error::AppError;
use crate::geo::{estimate_eta_minutes, haversine_km, is_valid_point};
use crate::models::audit::{EntityKind, EventActor, RequestEvent, StatusLog};
use crate::models::offer::{DriverOffer, OfferSnapshot};
use crate::models::routing::{GeoPoint, RoutingLeg, dropoff_leg, pickup_leg};
use crate::models::status::{OfferStatus, RideStatus};
use crate::models::user::{Actor, UserRole};
use crate::notify::{Notification, dispatch};
use crate::observability::metrics::outcome;
use crate::state::AppState;

/// Records or refreshes the calling driver's bid on an open request.
///
/// The request row is locked first, then the driver's offer row, so two
/// submissions from the same driver serialize and leave one offer behind. An
/// expired offer is refreshed back to `active`; a selected, rejected or
/// withdrawn one is closed for good.
pub async fn submit_offer(
    state: &AppState,
    actor: Actor,
    request_id: Uuid,
    driver_location: GeoPoint,
) -> Result<DriverOffer, AppError> {
    let result = submit_offer_inner(state, actor, request_id, driver_location).await;

    state
        .metrics
        .driver_offers_total
        .with_label_values(&[outcome(&result)])
        .inc();

    let (offer, customer_id) = result.inspect_err(|err| err.log("submit_offer"))?;

    let eta = offer
        .snapshot
        .eta_min
        .map(|eta| format!("A driver is {eta} min away from your pickup."))
        .unwrap_or_else(|| "A driver has offered to take your ride.".to_string());
    dispatch(
        state.notifier.as_ref(),
        vec![Notification::new(
            customer_id,
            "New Driver Offer",
            eta,
            json!({ "request_id": request_id, "offer_id": offer.id, "driver_id": offer.driver_id }),
        )],
    )
    .await;

    Ok(offer)
}

async fn submit_offer_inner(
    state: &AppState,
    actor: Actor,
    request_id: Uuid,
    driver_location: GeoPoint,
) -> Result<(DriverOffer, Uuid), AppError> {
    ensure_role(&actor, UserRole::Driver)?;
    if !is_valid_point(driver_location.lat, driver_location.lng) {
        return Err(AppError::Validation(format!(
            "invalid driver location ({}, {})",
            driver_location.lat, driver_location.lng
        )));
    }
    let driver = known_driver(state, actor.id).await?;

    let now = state.clock.now();
    let mut tx = state.store.begin().await?;

    let mut request = tx
        .lock_request(request_id)
        .await?
        .ok_or(AppError::RequestNotFound(request_id))?;
    if !request.status.is_open_request() {
        return Err(AppError::RequestNotOfferable(request.status));
    }
    if request.is_expired_at(now) {
        return Err(AppError::RequestExpired(request_id));
    }

    let routing = tx.request_routing(request_id).await?;
    let snapshot = build_snapshot(&routing, driver_location, state.settings.driver_avg_speed_kmh);
    let expires_at = now + Duration::seconds(state.settings.offer_ttl_secs);

    let (offer, refreshed) = match tx.lock_offer(request_id, driver.id).await? {
        Some(existing) if existing.status.is_closed() => {
            return Err(AppError::OfferClosed(existing.status));
        }
        Some(mut existing) => {
            existing.offered_at = now;
            existing.expires_at = expires_at;
            existing.status = OfferStatus::Active;
            existing.snapshot = snapshot;
            tx.update_offer(&existing).await?;
            (existing, true)
        }
        None => {
            let offer = DriverOffer {
                id: Uuid::new_v4(),
                request_id,
                driver_id: driver.id,
                offered_at: now,
                expires_at,
                status: OfferStatus::Active,
                snapshot,
            };
            tx.insert_offer(&offer).await?;
            (offer, false)
        }
    };

    tx.append_status_log(&StatusLog::new(
        EntityKind::Offer,
        offer.id,
        OfferStatus::Active.as_str(),
        if refreshed { "offer refreshed" } else { "offer submitted" },
        Some(driver.id),
        now,
    ))
    .await?;

    if request.status == RideStatus::Requested {
        request.status = RideStatus::DriverOffered;
        request.updated_at = now;
        tx.update_request(&request).await?;
        tx.append_status_log(&StatusLog::new(
            EntityKind::Request,
            request_id,
            RideStatus::DriverOffered.as_str(),
            "first driver offer received",
            Some(driver.id),
            now,
        ))
        .await?;
    }

    tx.append_event(&RequestEvent::new(
        request_id,
        "driver_offered",
        EventActor::Driver,
        Some(driver.id),
        json!({
            "offer_id": offer.id,
            "distance_to_pickup_km": offer.snapshot.distance_to_pickup_km,
            "eta_min": offer.snapshot.eta_min,
            "refreshed": refreshed,
        }),
        now,
    ))
    .await?;
    tx.commit().await?;

    info!(
        request_id = %request_id,
        offer_id = %offer.id,
        driver_id = %driver.id,
        refreshed,
        "driver offer recorded"
    );

    Ok((offer, request.customer_id))
}

pub async fn withdraw_offer(state: &AppState, actor: Actor, request_id: Uuid) -> Result<DriverOffer, AppError> {
    let result: Result<DriverOffer, AppError> = async {
        ensure_role(&actor, UserRole::Driver)?;

        let now = state.clock.now();
        let mut tx = state.store.begin().await?;

        let request = tx
            .lock_request(request_id)
            .await?
            .ok_or(AppError::RequestNotFound(request_id))?;
        if !request.status.is_open_request() {
            return Err(AppError::RequestNotOfferable(request.status));
        }

        let mut offer = tx
            .lock_offer(request_id, actor.id)
            .await?
            .ok_or(AppError::OfferNotFound(actor.id))?;
        if offer.status != OfferStatus::Active {
            return Err(AppError::OfferNotActive(offer.status));
        }

        offer.status = OfferStatus::Withdrawn;
        tx.update_offer(&offer).await?;
        tx.append_status_log(&StatusLog::new(
            EntityKind::Offer,
            offer.id,
            OfferStatus::Withdrawn.as_str(),
            "offer withdrawn by driver",
            Some(actor.id),
            now,
        ))
        .await?;
        tx.append_event(&RequestEvent::new(
            request_id,
            "offer_withdrawn",
            EventActor::Driver,
            Some(actor.id),
            json!({ "offer_id": offer.id }),
            now,
        ))
        .await?;
        tx.commit().await?;

        info!(request_id = %request_id, offer_id = %offer.id, "driver offer withdrawn");
        Ok(offer)
    }
    .await;

    result.inspect_err(|err| err.log("withdraw_offer"))
}

/// Live offers on the caller's request, oldest first.
pub async fn list_offers(state: &AppState, actor: Actor, request_id: Uuid) -> Result<Vec<DriverOffer>, AppError> {
    let result: Result<Vec<DriverOffer>, AppError> = async {
        ensure_role(&actor, UserRole::Customer)?;

        let request = state
            .store
            .get_request(request_id)
            .await?
            .ok_or(AppError::RequestNotFound(request_id))?;
        if request.customer_id != actor.id {
            return Err(AppError::NotAssignedParty(UserRole::Customer));
        }

        let now = state.clock.now();
        let offers: Vec<DriverOffer> = state
            .store
            .offers_for_request(request_id)
            .await?
            .into_iter()
            .filter(|offer| offer.is_live_at(now))
            .collect();

        debug!(request_id = %request_id, live = offers.len(), "listed driver offers");
        Ok(offers)
    }
    .await;

    result.inspect_err(|err| err.log("list_offers"))
}

fn build_snapshot(routing: &[RoutingLeg], driver: GeoPoint, avg_speed_kmh: f64) -> OfferSnapshot {
    let pickup = pickup_leg(routing);
    let dropoff = dropoff_leg(routing);

    let distance_to_pickup_km = pickup.map(|leg| round_km(haversine_km(&driver, &leg.point())));
    let eta_min = distance_to_pickup_km.map(|km| estimate_eta_minutes(km, avg_speed_kmh));

    OfferSnapshot {
        driver_lat: Some(driver.lat),
        driver_lng: Some(driver.lng),
        pickup_lat: pickup.map(|leg| leg.lat),
        pickup_lng: pickup.map(|leg| leg.lng),
        pickup_address: pickup.map(|leg| leg.address.clone()),
        dropoff_lat: dropoff.map(|leg| leg.lat),
        dropoff_lng: dropoff.map(|leg| leg.lng),
        dropoff_address: dropoff.map(|leg| leg.address.clone()),
        distance_to_pickup_km,
        eta_min,
    }
}

fn round_km(km: f64) -> f64 {
    (km * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::routing::LegType;

    #[test]
    fn snapshot_measures_driver_to_pickup() {
        let request_id = Uuid::new_v4();
        let routing = vec![
            RoutingLeg {
                id: Uuid::new_v4(),
                owner_id: request_id,
                leg_type: LegType::Pickup,
                lat: 24.8607,
                lng: 67.0011,
                address: "Saddar".to_string(),
                seq: 0,
            },
            RoutingLeg {
                id: Uuid::new_v4(),
                owner_id: request_id,
                leg_type: LegType::Dropoff,
                lat: 24.9,
                lng: 67.1,
                address: "Gulshan".to_string(),
                seq: 1,
            },
        ];
        let driver = GeoPoint {
            lat: 24.8607,
            lng: 67.0011,
        };

        let snapshot = build_snapshot(&routing, driver, 35.0);

        assert_eq!(snapshot.distance_to_pickup_km, Some(0.0));
        assert_eq!(snapshot.eta_min, Some(0));
        assert_eq!(snapshot.dropoff_address.as_deref(), Some("Gulshan"));
    }

    #[test]
    fn snapshot_without_routing_keeps_driver_position() {
        let snapshot = build_snapshot(&[], GeoPoint { lat: 1.0, lng: 2.0 }, 35.0);

        assert_eq!(snapshot.driver_lat, Some(1.0));
        assert!(snapshot.distance_to_pickup_km.is_none());
        assert!(snapshot.eta_min.is_none());
    }
}
