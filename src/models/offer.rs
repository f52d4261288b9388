use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::OfferStatus;

/// Where the driver and the route stood when the offer was made.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OfferSnapshot {
    pub driver_lat: Option<f64>,
    pub driver_lng: Option<f64>,
    pub pickup_lat: Option<f64>,
    pub pickup_lng: Option<f64>,
    pub pickup_address: Option<String>,
    pub dropoff_lat: Option<f64>,
    pub dropoff_lng: Option<f64>,
    pub dropoff_address: Option<String>,
    pub distance_to_pickup_km: Option<f64>,
    pub eta_min: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DriverOffer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub driver_id: Uuid,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: OfferStatus,
    #[sqlx(json)]
    pub snapshot: OfferSnapshot,
}

impl DriverOffer {
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Active && self.expires_at > now
    }
}
