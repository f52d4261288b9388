use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::models::audit::{RequestEvent, StatusLog};
use crate::models::booking::Booking;
use crate::models::fare::FareSchedule;
use crate::models::offer::DriverOffer;
use crate::models::rating::RatingRecord;
use crate::models::request::RideRequest;
use crate::models::routing::RoutingLeg;
use crate::models::user::UserAccount;
use crate::store::{RideStore, RideTx, StoreError, StoreResult};

const REQUEST_COLUMNS: &str = "id, customer_id, fare_schedule_id, ride_type, distance_km, \
     planned_minutes, base_fare, total_fare, status, expires_at, confirmed_driver_id, \
     confirmed_booking_id, created_at, updated_at";

const OFFER_COLUMNS: &str = "id, request_id, driver_id, offered_at, expires_at, status, snapshot";

const BOOKING_COLUMNS: &str = "id, request_id, customer_id, driver_id, fare_schedule_id, ride_type, \
     distance_km, planned_minutes, base_fare, surcharge_amount, app_fee_amount, \
     company_fee_amount, driver_fee_amount, additional_cost, discount, traffic_delay_amount, \
     total_fare, status, otp_code, ride_start_time, ride_end_time, delay_minutes, \
     cancel_reason, created_at, updated_at";

const FARE_COLUMNS: &str = "id, rate_per_km, surcharge_pct, app_fee, company_fee_pct, \
     driver_fee_pct, additional_cost, discount, traffic_delay_threshold_min, \
     traffic_delay_charge_pct, is_active, created_at";

/// Postgres backend. Row locks are `SELECT ... FOR UPDATE` inside the
/// transaction held by [`PgTx`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl RideStore for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn RideTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>> {
        let user = sqlx::query_as::<_, UserAccount>(
            "SELECT id, name, phone, role, is_active, is_online FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn active_fare_schedule(&self) -> StoreResult<Option<FareSchedule>> {
        let sql = format!(
            "SELECT {FARE_COLUMNS} FROM fare_schedules WHERE is_active \
             ORDER BY created_at DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, FareSchedule>(&sql)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn fare_schedule(&self, id: Uuid) -> StoreResult<Option<FareSchedule>> {
        let sql = format!("SELECT {FARE_COLUMNS} FROM fare_schedules WHERE id = $1");
        Ok(sqlx::query_as::<_, FareSchedule>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn ratings_for(&self, user_id: Uuid) -> StoreResult<Vec<RatingRecord>> {
        Ok(sqlx::query_as::<_, RatingRecord>(
            "SELECT id, user_id, rated_by, score, created_at FROM ratings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_request(&self, id: Uuid) -> StoreResult<Option<RideRequest>> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE id = $1");
        Ok(sqlx::query_as::<_, RideRequest>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn request_routing(&self, request_id: Uuid) -> StoreResult<Vec<RoutingLeg>> {
        Ok(sqlx::query_as::<_, RoutingLeg>(
            "SELECT id, request_id AS owner_id, leg_type, lat, lng, address, seq \
             FROM request_routing WHERE request_id = $1 ORDER BY seq",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn offers_for_request(&self, request_id: Uuid) -> StoreResult<Vec<DriverOffer>> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM driver_offers WHERE request_id = $1 \
             ORDER BY offered_at, id"
        );
        Ok(sqlx::query_as::<_, DriverOffer>(&sql)
            .bind(request_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn request_events(&self, request_id: Uuid) -> StoreResult<Vec<RequestEvent>> {
        Ok(sqlx::query_as::<_, RequestEvent>(
            "SELECT id, request_id, event_type, actor_type, actor_id, payload, created_at \
             FROM request_events WHERE request_id = $1 ORDER BY created_at",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn booking_routing(&self, booking_id: Uuid) -> StoreResult<Vec<RoutingLeg>> {
        Ok(sqlx::query_as::<_, RoutingLeg>(
            "SELECT id, booking_id AS owner_id, leg_type, lat, lng, address, seq \
             FROM booking_routing WHERE booking_id = $1 ORDER BY seq",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE customer_id = $1 OR driver_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn status_logs(&self, entity_id: Uuid) -> StoreResult<Vec<StatusLog>> {
        Ok(sqlx::query_as::<_, StatusLog>(
            "SELECT id, entity_kind, entity_id, status, note, actor_id, changed_at \
             FROM status_logs WHERE entity_id = $1 ORDER BY changed_at",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn due_requests(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM ride_requests WHERE status = 'requested' AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn due_offers(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM driver_offers WHERE status = 'active' AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn ensure_affected(rows: u64, entity: &'static str, id: Uuid) -> StoreResult<()> {
    if rows == 0 {
        return Err(StoreError::MissingRow { entity, id });
    }
    Ok(())
}

#[async_trait]
impl RideTx for PgTx {
    async fn lock_request(&mut self, id: Uuid) -> StoreResult<Option<RideRequest>> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, RideRequest>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_request(&mut self, request: &RideRequest, routing: &[RoutingLeg]) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO ride_requests ({REQUEST_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        sqlx::query(&sql)
            .bind(request.id)
            .bind(request.customer_id)
            .bind(request.fare_schedule_id)
            .bind(request.ride_type)
            .bind(request.distance_km)
            .bind(request.planned_minutes)
            .bind(request.base_fare)
            .bind(request.total_fare)
            .bind(request.status)
            .bind(request.expires_at)
            .bind(request.confirmed_driver_id)
            .bind(request.confirmed_booking_id)
            .bind(request.created_at)
            .bind(request.updated_at)
            .execute(&mut *self.tx)
            .await?;

        for leg in routing {
            sqlx::query(
                "INSERT INTO request_routing (id, request_id, leg_type, lat, lng, address, seq) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(leg.id)
            .bind(request.id)
            .bind(leg.leg_type)
            .bind(leg.lat)
            .bind(leg.lng)
            .bind(&leg.address)
            .bind(leg.seq)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn update_request(&mut self, request: &RideRequest) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE ride_requests SET status = $2, confirmed_driver_id = $3, \
             confirmed_booking_id = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(request.id)
        .bind(request.status)
        .bind(request.confirmed_driver_id)
        .bind(request.confirmed_booking_id)
        .bind(request.updated_at)
        .execute(&mut *self.tx)
        .await?;

        ensure_affected(result.rows_affected(), "ride_request", request.id)
    }

    async fn request_routing(&mut self, request_id: Uuid) -> StoreResult<Vec<RoutingLeg>> {
        Ok(sqlx::query_as::<_, RoutingLeg>(
            "SELECT id, request_id AS owner_id, leg_type, lat, lng, address, seq \
             FROM request_routing WHERE request_id = $1 ORDER BY seq",
        )
        .bind(request_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn lock_offer(&mut self, request_id: Uuid, driver_id: Uuid) -> StoreResult<Option<DriverOffer>> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM driver_offers \
             WHERE request_id = $1 AND driver_id = $2 FOR UPDATE"
        );
        Ok(sqlx::query_as::<_, DriverOffer>(&sql)
            .bind(request_id)
            .bind(driver_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn lock_offers(&mut self, request_id: Uuid) -> StoreResult<Vec<DriverOffer>> {
        let sql = format!(
            "SELECT {OFFER_COLUMNS} FROM driver_offers WHERE request_id = $1 \
             ORDER BY offered_at, id FOR UPDATE"
        );
        Ok(sqlx::query_as::<_, DriverOffer>(&sql)
            .bind(request_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn insert_offer(&mut self, offer: &DriverOffer) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO driver_offers ({OFFER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (request_id, driver_id) DO NOTHING"
        );
        let result = sqlx::query(&sql)
            .bind(offer.id)
            .bind(offer.request_id)
            .bind(offer.driver_id)
            .bind(offer.offered_at)
            .bind(offer.expires_at)
            .bind(offer.status)
            .bind(Json(&offer.snapshot))
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                entity: "driver_offer",
                id: offer.id,
            });
        }
        Ok(())
    }

    async fn update_offer(&mut self, offer: &DriverOffer) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE driver_offers SET offered_at = $2, expires_at = $3, status = $4, snapshot = $5 \
             WHERE id = $1",
        )
        .bind(offer.id)
        .bind(offer.offered_at)
        .bind(offer.expires_at)
        .bind(offer.status)
        .bind(Json(&offer.snapshot))
        .execute(&mut *self.tx)
        .await?;

        ensure_affected(result.rows_affected(), "driver_offer", offer.id)
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        Ok(sqlx::query_as::<_, Booking>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_booking(&mut self, booking: &Booking, routing: &[RoutingLeg]) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
             $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)"
        );
        sqlx::query(&sql)
            .bind(booking.id)
            .bind(booking.request_id)
            .bind(booking.customer_id)
            .bind(booking.driver_id)
            .bind(booking.fare_schedule_id)
            .bind(booking.ride_type)
            .bind(booking.distance_km)
            .bind(booking.planned_minutes)
            .bind(booking.base_fare)
            .bind(booking.surcharge_amount)
            .bind(booking.app_fee_amount)
            .bind(booking.company_fee_amount)
            .bind(booking.driver_fee_amount)
            .bind(booking.additional_cost)
            .bind(booking.discount)
            .bind(booking.traffic_delay_amount)
            .bind(booking.total_fare)
            .bind(booking.status)
            .bind(&booking.otp_code)
            .bind(booking.ride_start_time)
            .bind(booking.ride_end_time)
            .bind(booking.delay_minutes)
            .bind(&booking.cancel_reason)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *self.tx)
            .await?;

        for leg in routing {
            self.upsert_booking_leg(leg).await?;
        }

        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE bookings SET status = $2, ride_start_time = $3, ride_end_time = $4, \
             delay_minutes = $5, traffic_delay_amount = $6, total_fare = $7, cancel_reason = $8, \
             updated_at = $9 WHERE id = $1",
        )
        .bind(booking.id)
        .bind(booking.status)
        .bind(booking.ride_start_time)
        .bind(booking.ride_end_time)
        .bind(booking.delay_minutes)
        .bind(booking.traffic_delay_amount)
        .bind(booking.total_fare)
        .bind(&booking.cancel_reason)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await?;

        ensure_affected(result.rows_affected(), "booking", booking.id)
    }

    async fn booking_routing(&mut self, booking_id: Uuid) -> StoreResult<Vec<RoutingLeg>> {
        Ok(sqlx::query_as::<_, RoutingLeg>(
            "SELECT id, booking_id AS owner_id, leg_type, lat, lng, address, seq \
             FROM booking_routing WHERE booking_id = $1 ORDER BY seq",
        )
        .bind(booking_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn upsert_booking_leg(&mut self, leg: &RoutingLeg) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO booking_routing (id, booking_id, leg_type, lat, lng, address, seq) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET lat = EXCLUDED.lat, lng = EXCLUDED.lng, \
             address = EXCLUDED.address",
        )
        .bind(leg.id)
        .bind(leg.owner_id)
        .bind(leg.leg_type)
        .bind(leg.lat)
        .bind(leg.lng)
        .bind(&leg.address)
        .bind(leg.seq)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn append_event(&mut self, event: &RequestEvent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO request_events (id, request_id, event_type, actor_type, actor_id, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.id)
        .bind(event.request_id)
        .bind(&event.event_type)
        .bind(event.actor_type)
        .bind(event.actor_id)
        .bind(&event.payload)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn append_status_log(&mut self, log: &StatusLog) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO status_logs (id, entity_kind, entity_id, status, note, actor_id, changed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(log.id)
        .bind(log.entity_kind)
        .bind(log.entity_id)
        .bind(&log.status)
        .bind(&log.note)
        .bind(log.actor_id)
        .bind(log.changed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn expire_request_if_due(&mut self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE ride_requests SET status = 'expired', updated_at = $2 \
             WHERE id = $1 AND status = 'requested' AND expires_at <= $2",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expire_offer_if_due(&mut self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<DriverOffer>> {
        let sql = format!(
            "UPDATE driver_offers SET status = 'expired' \
             WHERE id = $1 AND status = 'active' AND expires_at <= $2 RETURNING {OFFER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, DriverOffer>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
