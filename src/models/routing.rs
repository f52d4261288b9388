use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "leg_type", rename_all = "snake_case")]
pub enum LegType {
    Pickup,
    Dropoff,
    DriverLocation,
}

/// A routing leg as supplied by the customer when requesting a ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegInput {
    #[serde(rename = "type")]
    pub leg_type: LegType,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub address: String,
    pub seq: i32,
}

/// One stored leg, owned either by a ride request or by a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoutingLeg {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub leg_type: LegType,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub seq: i32,
}

impl RoutingLeg {
    pub fn from_input(owner_id: Uuid, input: &LegInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            leg_type: input.leg_type,
            lat: input.lat,
            lng: input.lng,
            address: input.address.clone(),
            seq: input.seq,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Pickup leg of a route: the typed pickup, else the leg with sequence 0.
pub fn pickup_leg(legs: &[RoutingLeg]) -> Option<&RoutingLeg> {
    find_leg(legs, LegType::Pickup)
}

/// Dropoff leg of a route: the typed dropoff, else the leg with sequence 0.
pub fn dropoff_leg(legs: &[RoutingLeg]) -> Option<&RoutingLeg> {
    find_leg(legs, LegType::Dropoff)
}

pub fn driver_location_leg(legs: &[RoutingLeg]) -> Option<&RoutingLeg> {
    legs.iter().find(|leg| leg.leg_type == LegType::DriverLocation)
}

fn find_leg(legs: &[RoutingLeg], leg_type: LegType) -> Option<&RoutingLeg> {
    legs.iter()
        .find(|leg| leg.leg_type == leg_type)
        .or_else(|| legs.iter().find(|leg| leg.seq == 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(leg_type: LegType, seq: i32) -> RoutingLeg {
        RoutingLeg {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            leg_type,
            lat: 24.86 + seq as f64,
            lng: 67.0,
            address: format!("leg {seq}"),
            seq,
        }
    }

    #[test]
    fn typed_pickup_wins_over_sequence_zero() {
        let legs = vec![leg(LegType::Dropoff, 0), leg(LegType::Pickup, 1)];
        assert_eq!(pickup_leg(&legs).map(|l| l.seq), Some(1));
    }

    #[test]
    fn pickup_falls_back_to_sequence_zero() {
        let legs = vec![leg(LegType::Dropoff, 0), leg(LegType::Dropoff, 1)];
        assert_eq!(pickup_leg(&legs).map(|l| l.seq), Some(0));
    }

    #[test]
    fn no_legs_means_no_pickup() {
        assert!(pickup_leg(&[]).is_none());
    }
}
