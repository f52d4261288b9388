use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::routing::{LegInput, RoutingLeg};
use crate::models::status::{RideStatus, RideType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RideRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub fare_schedule_id: Uuid,
    pub ride_type: RideType,
    pub distance_km: Decimal,
    pub planned_minutes: i32,
    pub base_fare: Decimal,
    pub total_fare: Decimal,
    pub status: RideStatus,
    pub expires_at: DateTime<Utc>,
    pub confirmed_driver_id: Option<Uuid>,
    pub confirmed_booking_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RideRequest {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRideRequest {
    pub ride_type: RideType,
    pub distance_km: Decimal,
    pub duration_min: i32,
    pub routing: Vec<LegInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestWithRouting {
    pub request: RideRequest,
    pub routing: Vec<RoutingLeg>,
}
