use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::rating::RatingSnapshot;
use crate::models::routing::RoutingLeg;
use crate::models::status::{RideStatus, RideType};
use crate::models::user::{Actor, UserRole};

/// A confirmed ride. Created once per request by confirmation and mutated
/// only by the ride state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub request_id: Uuid,
    pub customer_id: Uuid,
    pub driver_id: Uuid,
    pub fare_schedule_id: Uuid,
    pub ride_type: RideType,
    pub distance_km: Decimal,
    pub planned_minutes: i32,
    pub base_fare: Decimal,
    pub surcharge_amount: Decimal,
    pub app_fee_amount: Decimal,
    pub company_fee_amount: Decimal,
    pub driver_fee_amount: Decimal,
    pub additional_cost: Decimal,
    pub discount: Decimal,
    pub traffic_delay_amount: Decimal,
    pub total_fare: Decimal,
    pub status: RideStatus,
    /// Pickup code the customer shows the driver. Empty in driver views.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub otp_code: String,
    pub ride_start_time: Option<DateTime<Utc>>,
    pub ride_end_time: Option<DateTime<Utc>>,
    pub delay_minutes: i32,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_party(&self, actor: &Actor) -> bool {
        match actor.role {
            UserRole::Customer => self.customer_id == actor.id,
            UserRole::Driver => self.driver_id == actor.id,
        }
    }

    /// The booking as the given party may see it. Drivers never see the OTP.
    pub fn visible_to(mut self, actor: &Actor) -> Self {
        if actor.role == UserRole::Driver {
            self.otp_code.clear();
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingWithRouting {
    pub booking: Booking,
    pub routing: Vec<RoutingLeg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartySummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub rating: RatingSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareSummary {
    pub base: Decimal,
    pub discount: Decimal,
    pub traffic_delay_amount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideSummary {
    pub id: Uuid,
    pub status: RideStatus,
    pub fare: FareSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    pub driver: PartySummary,
    pub customer: PartySummary,
    pub pickup: Option<RoutingLeg>,
    pub dropoff: Option<RoutingLeg>,
    pub driver_location: Option<RoutingLeg>,
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub fare: Decimal,
    pub waiting_charges: Decimal,
    pub discount: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub booking: Booking,
    pub receipt: Receipt,
    pub pickup: Option<RoutingLeg>,
    pub dropoff: Option<RoutingLeg>,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RideHistory {
    pub in_progress: Vec<HistoryEntry>,
    pub completed: Vec<HistoryEntry>,
    pub cancelled: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarningsPeriod {
    Today,
    Month,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Earnings {
    pub driver_id: Uuid,
    pub period: EarningsPeriod,
    pub total: Decimal,
    pub rides: usize,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentPlace {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}
