use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::AppError;
use crate::models::fare::{FareBreakdown, FareSchedule};
use crate::models::request::RideRequest;

const MONEY_DP: u32 = 2;
/// Scale of the stored `distance_km` columns.
pub const DISTANCE_DP: u32 = 3;
const MAX_DISTANCE_KM: i64 = 100_000;

/// Prices a ride against the active schedule.
///
/// The distance is rounded to the stored scale before pricing and every
/// component is rounded to cents before summing, so a breakdown recomputed
/// later from the stored request compares equal to the original.
/// `driver_fee` is reported but never part of `total`.
pub fn calculate_fare(
    schedule: Option<&FareSchedule>,
    distance_km: Decimal,
    duration_min: i32,
) -> Result<FareBreakdown, AppError> {
    let schedule = schedule.ok_or(AppError::NoActiveFareSchedule)?;

    let distance_km = normalize_distance(distance_km);
    if distance_km <= Decimal::ZERO {
        return Err(AppError::Validation("distance_km must be > 0".to_string()));
    }
    if distance_km > Decimal::from(MAX_DISTANCE_KM) {
        return Err(AppError::Validation(format!("distance_km must be <= {MAX_DISTANCE_KM}")));
    }
    if duration_min < 0 {
        return Err(AppError::Validation("duration_min must be >= 0".to_string()));
    }

    let base = money(schedule.rate_per_km.checked_mul(distance_km).ok_or_else(out_of_range)?);
    let surcharge = percent_of(base, schedule.surcharge_pct)?;
    let app_fee = money(schedule.app_fee);
    let company_fee = percent_of(base, schedule.company_fee_pct)?;
    let driver_fee = percent_of(base, schedule.driver_fee_pct)?;
    let additional_cost = money(schedule.additional_cost);
    let discount = money(schedule.discount);

    let total = [surcharge, app_fee, company_fee, additional_cost]
        .into_iter()
        .try_fold(base, |sum, part| sum.checked_add(part))
        .and_then(|sum| sum.checked_sub(discount))
        .ok_or_else(out_of_range)?;

    Ok(FareBreakdown {
        fare_schedule_id: schedule.id,
        distance_km,
        duration_min,
        base,
        surcharge,
        app_fee,
        company_fee,
        driver_fee,
        additional_cost,
        discount,
        total,
    })
}

/// Compares a fresh breakdown with the fare stored on the request: the
/// schedule it was priced against, the base and the total.
pub fn verify_request_fare(request: &RideRequest, expected: &FareBreakdown) -> Result<(), AppError> {
    if request.fare_schedule_id != expected.fare_schedule_id
        || request.distance_km != expected.distance_km
        || request.base_fare != expected.base
        || request.total_fare != expected.total
    {
        return Err(AppError::FareMismatch);
    }
    Ok(())
}

pub fn percent_of(amount: Decimal, pct: Decimal) -> Result<Decimal, AppError> {
    amount
        .checked_mul(pct)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .map(money)
        .ok_or_else(out_of_range)
}

pub fn normalize_distance(distance_km: Decimal) -> Decimal {
    distance_km.round_dp_with_strategy(DISTANCE_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn out_of_range() -> AppError {
    AppError::Validation("fare amount out of range".to_string())
}
