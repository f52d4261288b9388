use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pricing configuration. Exactly one schedule is active at a time; that
/// invariant is owned by the pricing administration, not by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FareSchedule {
    pub id: Uuid,
    pub rate_per_km: Decimal,
    pub surcharge_pct: Decimal,
    pub app_fee: Decimal,
    pub company_fee_pct: Decimal,
    pub driver_fee_pct: Decimal,
    pub additional_cost: Decimal,
    pub discount: Decimal,
    /// Minutes of delay tolerated before the traffic charge applies.
    pub traffic_delay_threshold_min: i32,
    pub traffic_delay_charge_pct: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub fare_schedule_id: Uuid,
    pub distance_km: Decimal,
    pub duration_min: i32,
    pub base: Decimal,
    pub surcharge: Decimal,
    pub app_fee: Decimal,
    pub company_fee: Decimal,
    pub driver_fee: Decimal,
    pub additional_cost: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}
