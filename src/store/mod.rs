//! Persistence seam between the ride engine and its storage backends.
//!
//! Every mutating engine operation opens one [`RideTx`], performs its locked
//! reads and writes through it and finishes with [`RideTx::commit`]. A
//! transaction dropped without committing is rolled back, so an early `?`
//! return never leaves partial state behind.
//!
//! Reads on [`RideStore`] run outside any transaction. Ride-table reads must
//! not be called while the same task holds an open transaction on the
//! in-memory backend; reference data (users, fare schedules, ratings) may be.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::audit::{RequestEvent, StatusLog};
use crate::models::booking::Booking;
use crate::models::fare::FareSchedule;
use crate::models::offer::DriverOffer;
use crate::models::rating::RatingRecord;
use crate::models::request::RideRequest;
use crate::models::routing::RoutingLeg;
use crate::models::user::UserAccount;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} {id} not found for update")]
    MissingRow { entity: &'static str, id: Uuid },

    #[error("duplicate {entity} {id}")]
    Duplicate { entity: &'static str, id: Uuid },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RideStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn RideTx>>;

    // Reference data owned by other services.
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>>;
    async fn active_fare_schedule(&self) -> StoreResult<Option<FareSchedule>>;
    async fn fare_schedule(&self, id: Uuid) -> StoreResult<Option<FareSchedule>>;
    async fn ratings_for(&self, user_id: Uuid) -> StoreResult<Vec<RatingRecord>>;

    async fn get_request(&self, id: Uuid) -> StoreResult<Option<RideRequest>>;
    async fn request_routing(&self, request_id: Uuid) -> StoreResult<Vec<RoutingLeg>>;
    async fn offers_for_request(&self, request_id: Uuid) -> StoreResult<Vec<DriverOffer>>;
    async fn request_events(&self, request_id: Uuid) -> StoreResult<Vec<RequestEvent>>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;
    async fn booking_routing(&self, booking_id: Uuid) -> StoreResult<Vec<RoutingLeg>>;
    /// Bookings where the user is customer or driver, newest first.
    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>>;
    async fn status_logs(&self, entity_id: Uuid) -> StoreResult<Vec<StatusLog>>;

    /// Ids of `requested` requests whose deadline is at or before `now`.
    async fn due_requests(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;
    /// Ids of `active` offers whose deadline is at or before `now`.
    async fn due_offers(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;
}

#[async_trait]
pub trait RideTx: Send {
    /// Loads a request and holds its row lock until the transaction ends.
    async fn lock_request(&mut self, id: Uuid) -> StoreResult<Option<RideRequest>>;
    async fn insert_request(&mut self, request: &RideRequest, routing: &[RoutingLeg]) -> StoreResult<()>;
    async fn update_request(&mut self, request: &RideRequest) -> StoreResult<()>;
    async fn request_routing(&mut self, request_id: Uuid) -> StoreResult<Vec<RoutingLeg>>;

    async fn lock_offer(&mut self, request_id: Uuid, driver_id: Uuid) -> StoreResult<Option<DriverOffer>>;
    /// Every offer on the request, locked, oldest first.
    async fn lock_offers(&mut self, request_id: Uuid) -> StoreResult<Vec<DriverOffer>>;
    async fn insert_offer(&mut self, offer: &DriverOffer) -> StoreResult<()>;
    async fn update_offer(&mut self, offer: &DriverOffer) -> StoreResult<()>;

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;
    async fn insert_booking(&mut self, booking: &Booking, routing: &[RoutingLeg]) -> StoreResult<()>;
    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()>;
    async fn booking_routing(&mut self, booking_id: Uuid) -> StoreResult<Vec<RoutingLeg>>;
    async fn upsert_booking_leg(&mut self, leg: &RoutingLeg) -> StoreResult<()>;

    async fn append_event(&mut self, event: &RequestEvent) -> StoreResult<()>;
    async fn append_status_log(&mut self, log: &StatusLog) -> StoreResult<()>;

    /// Moves the request to `expired` only if it is still `requested` and due.
    async fn expire_request_if_due(&mut self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;
    /// Moves the offer to `expired` only if it is still `active` and due.
    async fn expire_offer_if_due(&mut self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<DriverOffer>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
