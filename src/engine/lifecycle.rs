use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::ensure_role;
use crate::engine::fare::percent_of;
use crate::engine::transitions::{check_transition, is_terminal};
use crate::error::AppError;
use crate::geo::is_valid_point;
use crate::models::audit::{EntityKind, StatusLog};
use crate::models::booking::Booking;
use crate::models::fare::FareSchedule;
use crate::models::routing::{GeoPoint, LegType, RoutingLeg};
use crate::models::status::RideStatus;
use crate::models::user::{Actor, UserRole};
use crate::notify::{Notification, dispatch};
use crate::state::AppState;
use crate::store::RideTx;

pub async fn mark_arrived(state: &AppState, actor: Actor, ride_id: Uuid) -> Result<Booking, AppError> {
    let result = transition(state, actor, ride_id, RideStatus::Arrived, |booking, _| {
        booking.status = RideStatus::Arrived;
        Ok("driver arrived at pickup".to_string())
    })
    .await;

    let (booking, applied) = result.inspect_err(|err| err.log("mark_arrived"))?;
    if applied {
        notify_customer(state, &booking, "Driver Arrived", "Your driver has arrived at the pickup point.").await;
    }
    Ok(booking)
}

/// Starts the ride from `confirmed` or `arrived`. When an OTP is supplied it
/// must match the code issued at confirmation.
pub async fn start_ride(state: &AppState, actor: Actor, ride_id: Uuid, otp: Option<&str>) -> Result<Booking, AppError> {
    let result = transition(state, actor, ride_id, RideStatus::Started, |booking, now| {
        if let Some(otp) = otp {
            if otp.trim() != booking.otp_code {
                return Err(AppError::OtpMismatch);
            }
        }
        booking.status = RideStatus::Started;
        booking.ride_start_time = Some(now);
        Ok("ride started".to_string())
    })
    .await;

    let (booking, applied) = result.inspect_err(|err| err.log("start_ride"))?;
    if applied {
        notify_customer(state, &booking, "Ride Started", "Your ride has started.").await;
    }
    Ok(booking)
}

/// Completes the ride and applies the traffic-delay charge when the ride ran
/// past its planned duration by more than the schedule's threshold.
pub async fn complete_ride(state: &AppState, actor: Actor, ride_id: Uuid) -> Result<Booking, AppError> {
    let result: Result<(Booking, bool), AppError> = async {
        // Schedules are reference data, so reading one ahead of the booking
        // lock is safe; the booking's schedule id never changes.
        let schedule = match state.store.get_booking(ride_id).await? {
            Some(booking) => state.store.fare_schedule(booking.fare_schedule_id).await?,
            None => return Err(AppError::BookingNotFound(ride_id)),
        };

        transition(state, actor, ride_id, RideStatus::Completed, |booking, now| {
            apply_completion(booking, schedule.as_ref(), now)
        })
        .await
    }
    .await;

    let (booking, applied) = result.inspect_err(|err| err.log("complete_ride"))?;
    if applied {
        notify_customer(
            state,
            &booking,
            "Ride Completed",
            format!("Your ride is complete. Total fare {}.", booking.total_fare),
        )
        .await;
    }
    Ok(booking)
}

/// Cancels the ride on behalf of the caller's role.
///
/// Repeating the same cancellation is a no-op. Any other finished ride
/// rejects cancellation with `CancellationNotAllowed`.
pub async fn cancel_ride(state: &AppState, actor: Actor, ride_id: Uuid, reason: &str) -> Result<Booking, AppError> {
    let target = match actor.role {
        UserRole::Customer => RideStatus::CancelledByCustomer,
        UserRole::Driver => RideStatus::CancelledByDriver,
    };
    let reason = reason.trim().to_string();

    let result = transition(state, actor, ride_id, target, |booking, _| {
        booking.status = target;
        booking.cancel_reason = Some(reason.clone());
        Ok(if reason.is_empty() {
            format!("cancelled by {}", actor.role)
        } else {
            format!("cancelled by {}: {reason}", actor.role)
        })
    })
    .await;

    let (booking, applied) = result.inspect_err(|err| err.log("cancel_ride"))?;
    if applied {
        let other_party = match actor.role {
            UserRole::Customer => booking.driver_id,
            UserRole::Driver => booking.customer_id,
        };
        let body = if reason.is_empty() {
            format!("The {} cancelled the ride.", actor.role)
        } else {
            format!("The {} cancelled the ride: {reason}", actor.role)
        };
        dispatch(
            state.notifier.as_ref(),
            vec![Notification::new(
                other_party,
                "Ride Cancelled",
                body,
                json!({ "booking_id": booking.id, "status": booking.status }),
            )],
        )
        .await;
    }
    Ok(booking)
}

/// Moves the booking's driver-location leg, creating it if missing.
pub async fn update_driver_location(
    state: &AppState,
    actor: Actor,
    ride_id: Uuid,
    location: GeoPoint,
) -> Result<RoutingLeg, AppError> {
    let result: Result<RoutingLeg, AppError> = async {
        ensure_role(&actor, UserRole::Driver)?;
        if !is_valid_point(location.lat, location.lng) {
            return Err(AppError::Validation(format!(
                "invalid driver location ({}, {})",
                location.lat, location.lng
            )));
        }

        let mut tx = state.store.begin().await?;
        let booking = lock_assigned(tx.as_mut(), &actor, ride_id).await?;
        if is_terminal(booking.status) {
            return Err(AppError::RideClosed(booking.status));
        }

        let legs = tx.booking_routing(ride_id).await?;
        let leg = match legs.iter().find(|leg| leg.leg_type == LegType::DriverLocation) {
            Some(existing) => RoutingLeg {
                lat: location.lat,
                lng: location.lng,
                ..existing.clone()
            },
            None => RoutingLeg {
                id: Uuid::new_v4(),
                owner_id: ride_id,
                leg_type: LegType::DriverLocation,
                lat: location.lat,
                lng: location.lng,
                address: String::new(),
                seq: legs.iter().map(|leg| leg.seq).max().map_or(0, |seq| seq + 1),
            },
        };
        tx.upsert_booking_leg(&leg).await?;
        tx.commit().await?;

        Ok(leg)
    }
    .await;

    result.inspect_err(|err| err.log("update_driver_location"))
}

/// Runs one booking transition under the booking lock.
///
/// Returns the booking and whether anything changed. A same-state request
/// returns the stored booking untouched. `apply` mutates the locked booking
/// and returns the status-log note.
async fn transition<F>(
    state: &AppState,
    actor: Actor,
    ride_id: Uuid,
    target: RideStatus,
    apply: F,
) -> Result<(Booking, bool), AppError>
where
    F: FnOnce(&mut Booking, DateTime<Utc>) -> Result<String, AppError> + Send,
{
    if !target.is_cancelled() {
        ensure_role(&actor, UserRole::Driver)?;
    }

    let now = state.clock.now();
    let mut tx = state.store.begin().await?;
    let mut booking = lock_assigned(tx.as_mut(), &actor, ride_id).await?;
    let from = booking.status;

    if from == target {
        return Ok((booking, false));
    }
    if target.is_cancelled() && (from == RideStatus::Completed || from.is_cancelled()) {
        return Err(AppError::CancellationNotAllowed(from));
    }
    check_transition(from, target)?;

    let note = apply(&mut booking, now)?;
    booking.updated_at = now;

    tx.update_booking(&booking).await?;
    tx.append_status_log(&StatusLog::new(
        EntityKind::Booking,
        booking.id,
        target.as_str(),
        note,
        Some(actor.id),
        now,
    ))
    .await?;
    tx.commit().await?;

    state
        .metrics
        .ride_transitions_total
        .with_label_values(&[target.as_str()])
        .inc();
    info!(
        booking_id = %booking.id,
        from = %from,
        to = %target,
        actor_id = %actor.id,
        "ride status changed"
    );

    Ok((booking, true))
}

async fn lock_assigned(tx: &mut dyn RideTx, actor: &Actor, ride_id: Uuid) -> Result<Booking, AppError> {
    let booking = tx
        .lock_booking(ride_id)
        .await?
        .ok_or(AppError::BookingNotFound(ride_id))?;

    if !booking.is_party(actor) {
        return Err(AppError::NotAssignedParty(actor.role));
    }

    Ok(booking)
}

fn apply_completion(
    booking: &mut Booking,
    schedule: Option<&FareSchedule>,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let started_at = booking
        .ride_start_time
        .ok_or(AppError::StartTimeMissing(booking.id))?;

    let elapsed_secs = (now - started_at).num_seconds().max(0);
    let actual_minutes = i32::try_from((elapsed_secs + 59) / 60).unwrap_or(i32::MAX);
    let delay_minutes = (actual_minutes - booking.planned_minutes).max(0);

    let traffic_delay_amount = match schedule {
        Some(schedule)
            if delay_minutes > schedule.traffic_delay_threshold_min
                && schedule.traffic_delay_charge_pct > Decimal::ZERO =>
        {
            percent_of(booking.base_fare, schedule.traffic_delay_charge_pct)?
        }
        Some(_) => Decimal::ZERO,
        None => {
            warn!(
                booking_id = %booking.id,
                fare_schedule_id = %booking.fare_schedule_id,
                "fare schedule missing, no traffic delay charge applied"
            );
            Decimal::ZERO
        }
    };

    let total_fare = booking
        .total_fare
        .checked_add(traffic_delay_amount)
        .ok_or_else(|| AppError::Internal(format!("total fare overflow on ride {}", booking.id)))?;

    booking.status = RideStatus::Completed;
    booking.ride_end_time = Some(now);
    booking.delay_minutes = delay_minutes;
    booking.traffic_delay_amount = traffic_delay_amount;
    booking.total_fare = total_fare;

    Ok(if traffic_delay_amount > Decimal::ZERO {
        format!("ride completed, {delay_minutes} min late, traffic charge {traffic_delay_amount}")
    } else {
        "ride completed".to_string()
    })
}

async fn notify_customer(state: &AppState, booking: &Booking, title: &str, body: impl Into<String>) {
    dispatch(
        state.notifier.as_ref(),
        vec![Notification::new(
            booking.customer_id,
            title,
            body,
            json!({ "booking_id": booking.id, "status": booking.status }),
        )],
    )
    .await;
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::apply_completion;
    use crate::error::AppError;
    use crate::models::booking::Booking;
    use crate::models::fare::FareSchedule;
    use crate::models::status::{RideStatus, RideType};

    fn booking(planned_minutes: i32) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            fare_schedule_id: Uuid::new_v4(),
            ride_type: RideType::Private,
            distance_km: Decimal::TEN,
            planned_minutes,
            base_fare: Decimal::from(200),
            surcharge_amount: Decimal::TEN,
            app_fee_amount: Decimal::TEN,
            company_fee_amount: Decimal::from(20),
            driver_fee_amount: Decimal::from(30),
            additional_cost: Decimal::ZERO,
            discount: Decimal::ZERO,
            traffic_delay_amount: Decimal::ZERO,
            total_fare: Decimal::from(240),
            status: RideStatus::Started,
            otp_code: "4821".to_string(),
            ride_start_time: None,
            ride_end_time: None,
            delay_minutes: 0,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn schedule() -> FareSchedule {
        FareSchedule {
            id: Uuid::new_v4(),
            rate_per_km: Decimal::from(20),
            surcharge_pct: Decimal::from(5),
            app_fee: Decimal::TEN,
            company_fee_pct: Decimal::TEN,
            driver_fee_pct: Decimal::from(15),
            additional_cost: Decimal::ZERO,
            discount: Decimal::ZERO,
            traffic_delay_threshold_min: 10,
            traffic_delay_charge_pct: Decimal::TEN,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn partial_minutes_round_up() {
        let now = Utc::now();
        let mut ride = booking(20);
        ride.ride_start_time = Some(now - Duration::seconds(20 * 60 + 1));

        apply_completion(&mut ride, Some(&schedule()), now).unwrap();

        assert_eq!(ride.delay_minutes, 1);
        assert_eq!(ride.traffic_delay_amount, Decimal::ZERO);
    }

    #[test]
    fn delay_past_threshold_adds_traffic_charge() {
        let now = Utc::now();
        let mut ride = booking(20);
        ride.ride_start_time = Some(now - Duration::minutes(35));

        apply_completion(&mut ride, Some(&schedule()), now).unwrap();

        assert_eq!(ride.delay_minutes, 15);
        assert_eq!(ride.traffic_delay_amount, Decimal::from(20));
        assert_eq!(ride.total_fare, Decimal::from(260));
        assert_eq!(ride.status, RideStatus::Completed);
    }

    #[test]
    fn delay_equal_to_threshold_is_free() {
        let now = Utc::now();
        let mut ride = booking(20);
        ride.ride_start_time = Some(now - Duration::minutes(30));

        apply_completion(&mut ride, Some(&schedule()), now).unwrap();

        assert_eq!(ride.delay_minutes, 10);
        assert_eq!(ride.total_fare, Decimal::from(240));
    }

    #[test]
    fn missing_start_time_is_internal() {
        let mut ride = booking(20);
        let err = apply_completion(&mut ride, Some(&schedule()), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::StartTimeMissing(_)));
    }
}
