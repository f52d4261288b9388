use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::engine::ensure_role;
use crate::engine::rating::aggregate;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::booking::{
    Booking, BookingWithRouting, Earnings, EarningsPeriod, FareSummary, HistoryEntry, PartySummary,
    Receipt, RecentPlace, RideHistory, RideSummary,
};
use crate::models::routing::{RoutingLeg, driver_location_leg, dropoff_leg, pickup_leg};
use crate::models::status::RideStatus;
use crate::models::user::{Actor, UserRole};
use crate::state::AppState;

const RECENT_BOOKINGS: usize = 20;

/// A ride with its routing, for one of its two parties.
pub async fn get_booking(state: &AppState, actor: Actor, ride_id: Uuid) -> Result<BookingWithRouting, AppError> {
    let result: Result<BookingWithRouting, AppError> = async {
        let booking = load_party_booking(state, &actor, ride_id).await?;
        let routing = state.store.booking_routing(ride_id).await?;
        Ok(BookingWithRouting {
            booking: booking.visible_to(&actor),
            routing,
        })
    }
    .await;

    result.inspect_err(|err| err.log("get_booking"))
}

pub async fn ride_summary(state: &AppState, actor: Actor, ride_id: Uuid) -> Result<RideSummary, AppError> {
    let result: Result<RideSummary, AppError> = async {
        let booking = load_party_booking(state, &actor, ride_id).await?.visible_to(&actor);
        let routing = state.store.booking_routing(ride_id).await?;
        let driver = party(state, booking.driver_id).await?;
        let customer = party(state, booking.customer_id).await?;

        Ok(RideSummary {
            id: booking.id,
            status: booking.status,
            fare: FareSummary {
                base: booking.base_fare,
                discount: booking.discount,
                traffic_delay_amount: booking.traffic_delay_amount,
                total: booking.total_fare,
            },
            otp: Some(booking.otp_code.clone()).filter(|otp| !otp.is_empty()),
            driver,
            customer,
            pickup: pickup_leg(&routing).cloned(),
            dropoff: dropoff_leg(&routing).cloned(),
            driver_location: driver_location_leg(&routing).cloned(),
            started_at: booking.ride_start_time,
            created_at: booking.created_at,
        })
    }
    .await;

    result.inspect_err(|err| err.log("ride_summary"))
}

pub async fn list_bookings_for_user(state: &AppState, actor: Actor) -> Result<Vec<Booking>, AppError> {
    let result: Result<Vec<Booking>, AppError> = async {
        let bookings = state.store.bookings_for_user(actor.id).await?;
        Ok(bookings.into_iter().map(|b| b.visible_to(&actor)).collect())
    }
    .await;
    result.inspect_err(|err| err.log("list_bookings_for_user"))
}

/// Groups the caller's rides into in-progress, completed and cancelled.
/// Confirmed rides that have not reached pickup belong to none of them.
pub async fn ride_history(state: &AppState, actor: Actor) -> Result<RideHistory, AppError> {
    let result: Result<RideHistory, AppError> = async {
        let mut history = RideHistory::default();

        for booking in state.store.bookings_for_user(actor.id).await? {
            let bucket = match booking.status {
                RideStatus::Arrived | RideStatus::Started | RideStatus::InProgress => &mut history.in_progress,
                RideStatus::Completed => &mut history.completed,
                status if status.is_cancelled() => &mut history.cancelled,
                _ => continue,
            };

            let routing = state.store.booking_routing(booking.id).await?;
            bucket.push(history_entry(booking.visible_to(&actor), &routing));
        }

        Ok(history)
    }
    .await;

    result.inspect_err(|err| err.log("ride_history"))
}

pub async fn driver_earnings(state: &AppState, actor: Actor, period: EarningsPeriod) -> Result<Earnings, AppError> {
    let result: Result<Earnings, AppError> = async {
        ensure_role(&actor, UserRole::Driver)?;

        let now = state.clock.now();
        let from = period_start(now, period)?;

        let completed: Vec<Booking> = state
            .store
            .bookings_for_user(actor.id)
            .await?
            .into_iter()
            .filter(|b| b.driver_id == actor.id && b.status == RideStatus::Completed)
            .filter(|b| b.created_at >= from && b.created_at <= now)
            .collect();

        Ok(Earnings {
            driver_id: actor.id,
            period,
            total: completed.iter().map(|b| b.total_fare).sum::<Decimal>(),
            rides: completed.len(),
            from,
            to: now,
        })
    }
    .await;

    result.inspect_err(|err| err.log("driver_earnings"))
}

/// Distinct dropoff points across the customer's most recent bookings.
pub async fn recent_places(state: &AppState, actor: Actor) -> Result<Vec<RecentPlace>, AppError> {
    let result: Result<Vec<RecentPlace>, AppError> = async {
        ensure_role(&actor, UserRole::Customer)?;

        let bookings: Vec<Booking> = state
            .store
            .bookings_for_user(actor.id)
            .await?
            .into_iter()
            .filter(|b| b.customer_id == actor.id)
            .take(RECENT_BOOKINGS)
            .collect();

        let mut seen = HashSet::new();
        let mut places = Vec::new();
        for booking in bookings {
            let routing = state.store.booking_routing(booking.id).await?;
            let Some(dropoff) = dropoff_leg(&routing) else {
                continue;
            };
            let key = format!("{}|{:.5}|{:.5}", dropoff.address, dropoff.lat, dropoff.lng);
            if seen.insert(key) {
                places.push(RecentPlace {
                    address: dropoff.address.clone(),
                    lat: dropoff.lat,
                    lng: dropoff.lng,
                });
            }
        }

        Ok(places)
    }
    .await;

    result.inspect_err(|err| err.log("recent_places"))
}

async fn load_party_booking(state: &AppState, actor: &Actor, ride_id: Uuid) -> Result<Booking, AppError> {
    let booking = state
        .store
        .get_booking(ride_id)
        .await?
        .ok_or(AppError::BookingNotFound(ride_id))?;
    if !booking.is_party(actor) {
        return Err(AppError::NotAssignedParty(actor.role));
    }
    Ok(booking)
}

async fn party(state: &AppState, user_id: Uuid) -> Result<PartySummary, AppError> {
    let user = state.store.find_user(user_id).await?;
    let rating = aggregate(&state.store.ratings_for(user_id).await?);

    Ok(PartySummary {
        id: user_id,
        name: user.as_ref().map(|u| u.name.clone()),
        phone: user.and_then(|u| u.phone),
        rating,
    })
}

fn history_entry(booking: Booking, routing: &[RoutingLeg]) -> HistoryEntry {
    let pickup = pickup_leg(routing).cloned();
    let dropoff = dropoff_leg(routing).cloned();
    let distance_km = pickup
        .as_ref()
        .zip(dropoff.as_ref())
        .map(|(from, to)| (haversine_km(&from.point(), &to.point()) * 100.0).round() / 100.0);

    HistoryEntry {
        receipt: receipt(&booking),
        booking,
        pickup,
        dropoff,
        distance_km,
    }
}

fn receipt(booking: &Booking) -> Receipt {
    Receipt {
        fare: booking.base_fare,
        waiting_charges: booking.additional_cost,
        discount: booking.discount,
        platform_fee: booking.company_fee_amount + booking.app_fee_amount,
        total: booking.total_fare,
    }
}

fn period_start(now: DateTime<Utc>, period: EarningsPeriod) -> Result<DateTime<Utc>, AppError> {
    let day = match period {
        EarningsPeriod::Today => now.date_naive(),
        EarningsPeriod::Month => NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
            .ok_or_else(|| AppError::Internal(format!("no first day of month for {now}")))?,
    };
    Ok(day.and_time(NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn month_starts_on_the_first_at_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 3, 17, 15, 4, 5).unwrap();

        assert_eq!(
            period_start(now, EarningsPeriod::Month).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            period_start(now, EarningsPeriod::Today).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 17, 0, 0, 0).unwrap()
        );
    }
}
