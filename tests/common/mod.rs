#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use ride_dispatch::clock::ManualClock;
use ride_dispatch::config::RideSettings;
use ride_dispatch::engine::confirmation::confirm;
use ride_dispatch::engine::offers::submit_offer;
use ride_dispatch::engine::requests::create_request;
use ride_dispatch::models::booking::Booking;
use ride_dispatch::models::fare::FareSchedule;
use ride_dispatch::models::offer::DriverOffer;
use ride_dispatch::models::request::{NewRideRequest, RideRequest};
use ride_dispatch::models::routing::{GeoPoint, LegInput, LegType};
use ride_dispatch::models::status::RideType;
use ride_dispatch::models::user::{Actor, UserAccount, UserRole};
use ride_dispatch::notify::{Notification, Notifier, NotifyError};
use ride_dispatch::state::AppState;
use ride_dispatch::store::memory::MemoryStore;

pub struct Fixture {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub customer: Uuid,
    pub drivers: Vec<Uuid>,
    pub schedule: FareSchedule,
}

impl Fixture {
    pub fn customer(&self) -> Actor {
        Actor::customer(self.customer)
    }

    pub fn driver(&self, index: usize) -> Actor {
        Actor::driver(self.drivers[index])
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

pub fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

pub fn schedule(created_at: DateTime<Utc>) -> FareSchedule {
    FareSchedule {
        id: Uuid::new_v4(),
        rate_per_km: dec("20"),
        surcharge_pct: dec("5"),
        app_fee: dec("10"),
        company_fee_pct: dec("10"),
        driver_fee_pct: dec("15"),
        additional_cost: Decimal::ZERO,
        discount: Decimal::ZERO,
        traffic_delay_threshold_min: 10,
        traffic_delay_charge_pct: dec("10"),
        is_active: true,
        created_at,
    }
}

pub fn fixture() -> Fixture {
    build(None)
}

pub fn fixture_with_notifier(notifier: Arc<dyn Notifier>) -> Fixture {
    build(Some(notifier))
}

fn build(notifier: Option<Arc<dyn Notifier>>) -> Fixture {
    let clock = Arc::new(ManualClock::new(start_time()));
    let store = Arc::new(MemoryStore::new());

    let customer = Uuid::new_v4();
    store.put_user(UserAccount {
        id: customer,
        name: "Ayesha".to_string(),
        phone: Some("+923001234567".to_string()),
        role: UserRole::Customer,
        is_active: true,
        is_online: true,
    });

    let drivers: Vec<Uuid> = (1..=3)
        .map(|n| {
            let id = Uuid::new_v4();
            store.put_user(UserAccount {
                id,
                name: format!("Driver {n}"),
                phone: None,
                role: UserRole::Driver,
                is_active: true,
                is_online: true,
            });
            id
        })
        .collect();

    let schedule = schedule(start_time());
    store.put_fare_schedule(schedule.clone());

    let mut state = AppState::new(store.clone(), RideSettings::default(), 64).with_clock(clock.clone());
    if let Some(notifier) = notifier {
        state = state.with_notifier(notifier);
    }

    Fixture {
        state: Arc::new(state),
        store,
        clock,
        customer,
        drivers,
        schedule,
    }
}

pub const PICKUP: GeoPoint = GeoPoint {
    lat: 24.8607,
    lng: 67.0011,
};

pub const DROPOFF: GeoPoint = GeoPoint {
    lat: 24.9265,
    lng: 67.0972,
};

pub fn ride_input() -> NewRideRequest {
    NewRideRequest {
        ride_type: RideType::Private,
        distance_km: dec("10"),
        duration_min: 20,
        routing: vec![
            LegInput {
                leg_type: LegType::Pickup,
                lat: PICKUP.lat,
                lng: PICKUP.lng,
                address: "Saddar".to_string(),
                seq: 0,
            },
            LegInput {
                leg_type: LegType::Dropoff,
                lat: DROPOFF.lat,
                lng: DROPOFF.lng,
                address: "Gulshan-e-Iqbal".to_string(),
                seq: 1,
            },
        ],
    }
}

pub fn near_pickup() -> GeoPoint {
    GeoPoint {
        lat: PICKUP.lat + 0.01,
        lng: PICKUP.lng,
    }
}

pub async fn requested(fx: &Fixture) -> RideRequest {
    create_request(&fx.state, fx.customer(), ride_input())
        .await
        .unwrap()
        .request
}

pub async fn offered(fx: &Fixture, request_id: Uuid, driver: usize) -> DriverOffer {
    submit_offer(&fx.state, fx.driver(driver), request_id, near_pickup())
        .await
        .unwrap()
}

/// A confirmed booking between the fixture customer and driver 0.
pub async fn confirmed(fx: &Fixture) -> Booking {
    let request = requested(fx).await;
    offered(fx, request.id, 0).await;
    confirm(&fx.state, fx.customer(), request.id, fx.drivers[0])
        .await
        .unwrap()
        .booking
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn titles_for(&self, user_id: Uuid) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.title.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("push gateway unavailable".to_string()))
    }
}
