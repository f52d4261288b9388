use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

use crate::models::audit::{RequestEvent, StatusLog};
use crate::models::booking::Booking;
use crate::models::fare::FareSchedule;
use crate::models::offer::DriverOffer;
use crate::models::rating::RatingRecord;
use crate::models::request::RideRequest;
use crate::models::routing::RoutingLeg;
use crate::models::status::{OfferStatus, RideStatus};
use crate::models::user::{UserAccount, UserRole};
use crate::store::{RideStore, RideTx, StoreError, StoreResult};

#[derive(Debug, Default)]
struct RideTables {
    requests: HashMap<Uuid, RideRequest>,
    request_routing: HashMap<Uuid, Vec<RoutingLeg>>,
    offers: HashMap<Uuid, DriverOffer>,
    bookings: HashMap<Uuid, Booking>,
    booking_routing: HashMap<Uuid, Vec<RoutingLeg>>,
    request_events: Vec<RequestEvent>,
    status_logs: Vec<StatusLog>,
}

/// In-process backend.
///
/// One mutex guards all ride tables and is held for the whole life of a
/// transaction, which serializes writers exactly like row locks on every row
/// they touch would. Writes are staged and only reach the tables on commit.
/// Reference data (users, fare schedules, ratings) lives outside that lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<RideTables>>,
    users: DashMap<Uuid, UserAccount>,
    fare_schedules: DashMap<Uuid, FareSchedule>,
    ratings: DashMap<Uuid, Vec<RatingRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_user(&self, user: UserAccount) {
        self.users.insert(user.id, user);
    }

    pub fn set_online(&self, user_id: Uuid, online: bool) {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.is_online = online;
        }
    }

    /// Stores a schedule; an active one deactivates every other schedule.
    pub fn put_fare_schedule(&self, schedule: FareSchedule) {
        if schedule.is_active {
            for mut entry in self.fare_schedules.iter_mut() {
                entry.is_active = false;
            }
        }
        self.fare_schedules.insert(schedule.id, schedule);
    }

    pub fn deactivate_fare_schedules(&self) {
        for mut entry in self.fare_schedules.iter_mut() {
            entry.is_active = false;
        }
    }

    pub fn put_rating(&self, rating: RatingRecord) {
        self.ratings.entry(rating.user_id).or_default().push(rating);
    }

    /// One active customer, two online drivers and an active fare schedule,
    /// with fixed ids so local clients can address them.
    pub fn seed_demo_data(&self, now: DateTime<Utc>) {
        let customer = UserAccount {
            id: Uuid::from_u128(0x1001),
            name: "Demo Customer".to_string(),
            phone: Some("+920000000001".to_string()),
            role: UserRole::Customer,
            is_active: true,
            is_online: true,
        };
        let drivers = [0x2001_u128, 0x2002].map(|raw| UserAccount {
            id: Uuid::from_u128(raw),
            name: format!("Demo Driver {}", raw - 0x2000),
            phone: None,
            role: UserRole::Driver,
            is_active: true,
            is_online: true,
        });

        info!(customer_id = %customer.id, "seeding demo customer");
        self.put_user(customer);
        for driver in drivers {
            info!(driver_id = %driver.id, "seeding demo driver");
            self.put_user(driver);
        }

        self.put_fare_schedule(FareSchedule {
            id: Uuid::from_u128(0x3001),
            rate_per_km: Decimal::from(20),
            surcharge_pct: Decimal::from(5),
            app_fee: Decimal::from(10),
            company_fee_pct: Decimal::from(10),
            driver_fee_pct: Decimal::from(15),
            additional_cost: Decimal::ZERO,
            discount: Decimal::ZERO,
            traffic_delay_threshold_min: 10,
            traffic_delay_charge_pct: Decimal::from(10),
            is_active: true,
            created_at: now,
        });
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn RideTx>> {
        let tables = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(MemoryTx {
            tables,
            staged: RideTables::default(),
        }))
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<UserAccount>> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn active_fare_schedule(&self) -> StoreResult<Option<FareSchedule>> {
        Ok(self
            .fare_schedules
            .iter()
            .filter(|entry| entry.is_active)
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone()))
    }

    async fn fare_schedule(&self, id: Uuid) -> StoreResult<Option<FareSchedule>> {
        Ok(self.fare_schedules.get(&id).map(|entry| entry.value().clone()))
    }

    async fn ratings_for(&self, user_id: Uuid) -> StoreResult<Vec<RatingRecord>> {
        Ok(self
            .ratings
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn get_request(&self, id: Uuid) -> StoreResult<Option<RideRequest>> {
        Ok(self.tables.lock().await.requests.get(&id).cloned())
    }

    async fn request_routing(&self, request_id: Uuid) -> StoreResult<Vec<RoutingLeg>> {
        Ok(sorted_legs(
            self.tables.lock().await.request_routing.get(&request_id),
        ))
    }

    async fn offers_for_request(&self, request_id: Uuid) -> StoreResult<Vec<DriverOffer>> {
        let tables = self.tables.lock().await;
        let mut offers: Vec<DriverOffer> = tables
            .offers
            .values()
            .filter(|offer| offer.request_id == request_id)
            .cloned()
            .collect();
        offers.sort_by_key(|offer| (offer.offered_at, offer.id));
        Ok(offers)
    }

    async fn request_events(&self, request_id: Uuid) -> StoreResult<Vec<RequestEvent>> {
        Ok(self
            .tables
            .lock()
            .await
            .request_events
            .iter()
            .filter(|event| event.request_id == request_id)
            .cloned()
            .collect())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn booking_routing(&self, booking_id: Uuid) -> StoreResult<Vec<RoutingLeg>> {
        Ok(sorted_legs(
            self.tables.lock().await.booking_routing.get(&booking_id),
        ))
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.customer_id == user_id || b.driver_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn status_logs(&self, entity_id: Uuid) -> StoreResult<Vec<StatusLog>> {
        Ok(self
            .tables
            .lock()
            .await
            .status_logs
            .iter()
            .filter(|log| log.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn due_requests(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .await
            .requests
            .values()
            .filter(|r| r.status == RideStatus::Requested && r.expires_at <= now)
            .map(|r| r.id)
            .collect())
    }

    async fn due_offers(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .tables
            .lock()
            .await
            .offers
            .values()
            .filter(|o| o.status == OfferStatus::Active && o.expires_at <= now)
            .map(|o| o.id)
            .collect())
    }
}

fn sorted_legs(legs: Option<&Vec<RoutingLeg>>) -> Vec<RoutingLeg> {
    let mut legs = legs.cloned().unwrap_or_default();
    legs.sort_by_key(|leg| leg.seq);
    legs
}

struct MemoryTx {
    tables: OwnedMutexGuard<RideTables>,
    staged: RideTables,
}

impl MemoryTx {
    fn current_request(&self, id: Uuid) -> Option<RideRequest> {
        self.staged
            .requests
            .get(&id)
            .or_else(|| self.tables.requests.get(&id))
            .cloned()
    }

    fn current_offer(&self, id: Uuid) -> Option<DriverOffer> {
        self.staged
            .offers
            .get(&id)
            .or_else(|| self.tables.offers.get(&id))
            .cloned()
    }

    fn current_booking(&self, id: Uuid) -> Option<Booking> {
        self.staged
            .bookings
            .get(&id)
            .or_else(|| self.tables.bookings.get(&id))
            .cloned()
    }

    fn offers_matching(&self, pred: impl Fn(&DriverOffer) -> bool) -> Vec<DriverOffer> {
        let mut offers: Vec<DriverOffer> = self
            .tables
            .offers
            .keys()
            .chain(self.staged.offers.keys())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .filter_map(|id| self.current_offer(*id))
            .filter(|offer| pred(offer))
            .collect();
        offers.sort_by_key(|offer| (offer.offered_at, offer.id));
        offers
    }

    fn current_booking_routing(&self, booking_id: Uuid) -> Vec<RoutingLeg> {
        self.staged
            .booking_routing
            .get(&booking_id)
            .or_else(|| self.tables.booking_routing.get(&booking_id))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RideTx for MemoryTx {
    async fn lock_request(&mut self, id: Uuid) -> StoreResult<Option<RideRequest>> {
        Ok(self.current_request(id))
    }

    async fn insert_request(&mut self, request: &RideRequest, routing: &[RoutingLeg]) -> StoreResult<()> {
        if self.current_request(request.id).is_some() {
            return Err(StoreError::Duplicate {
                entity: "ride_request",
                id: request.id,
            });
        }
        self.staged.requests.insert(request.id, request.clone());
        self.staged
            .request_routing
            .insert(request.id, routing.to_vec());
        Ok(())
    }

    async fn update_request(&mut self, request: &RideRequest) -> StoreResult<()> {
        if self.current_request(request.id).is_none() {
            return Err(StoreError::MissingRow {
                entity: "ride_request",
                id: request.id,
            });
        }
        self.staged.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn request_routing(&mut self, request_id: Uuid) -> StoreResult<Vec<RoutingLeg>> {
        Ok(sorted_legs(
            self.staged
                .request_routing
                .get(&request_id)
                .or_else(|| self.tables.request_routing.get(&request_id)),
        ))
    }

    async fn lock_offer(&mut self, request_id: Uuid, driver_id: Uuid) -> StoreResult<Option<DriverOffer>> {
        Ok(self
            .offers_matching(|o| o.request_id == request_id && o.driver_id == driver_id)
            .into_iter()
            .next())
    }

    async fn lock_offers(&mut self, request_id: Uuid) -> StoreResult<Vec<DriverOffer>> {
        Ok(self.offers_matching(|o| o.request_id == request_id))
    }

    async fn insert_offer(&mut self, offer: &DriverOffer) -> StoreResult<()> {
        let exists = !self
            .offers_matching(|o| {
                o.id == offer.id || (o.request_id == offer.request_id && o.driver_id == offer.driver_id)
            })
            .is_empty();
        if exists {
            return Err(StoreError::Duplicate {
                entity: "driver_offer",
                id: offer.id,
            });
        }
        self.staged.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn update_offer(&mut self, offer: &DriverOffer) -> StoreResult<()> {
        if self.current_offer(offer.id).is_none() {
            return Err(StoreError::MissingRow {
                entity: "driver_offer",
                id: offer.id,
            });
        }
        self.staged.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.current_booking(id))
    }

    async fn insert_booking(&mut self, booking: &Booking, routing: &[RoutingLeg]) -> StoreResult<()> {
        if self.current_booking(booking.id).is_some() {
            return Err(StoreError::Duplicate {
                entity: "booking",
                id: booking.id,
            });
        }
        self.staged.bookings.insert(booking.id, booking.clone());
        self.staged
            .booking_routing
            .insert(booking.id, routing.to_vec());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        if self.current_booking(booking.id).is_none() {
            return Err(StoreError::MissingRow {
                entity: "booking",
                id: booking.id,
            });
        }
        self.staged.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn booking_routing(&mut self, booking_id: Uuid) -> StoreResult<Vec<RoutingLeg>> {
        let legs = self.current_booking_routing(booking_id);
        Ok(sorted_legs(Some(&legs)))
    }

    async fn upsert_booking_leg(&mut self, leg: &RoutingLeg) -> StoreResult<()> {
        let mut legs = self.current_booking_routing(leg.owner_id);
        match legs.iter_mut().find(|existing| existing.id == leg.id) {
            Some(existing) => *existing = leg.clone(),
            None => legs.push(leg.clone()),
        }
        self.staged.booking_routing.insert(leg.owner_id, legs);
        Ok(())
    }

    async fn append_event(&mut self, event: &RequestEvent) -> StoreResult<()> {
        self.staged.request_events.push(event.clone());
        Ok(())
    }

    async fn append_status_log(&mut self, log: &StatusLog) -> StoreResult<()> {
        self.staged.status_logs.push(log.clone());
        Ok(())
    }

    async fn expire_request_if_due(&mut self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        match self.current_request(id) {
            Some(mut request) if request.status == RideStatus::Requested && request.expires_at <= now => {
                request.status = RideStatus::Expired;
                request.updated_at = now;
                self.staged.requests.insert(id, request);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_offer_if_due(&mut self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<DriverOffer>> {
        match self.current_offer(id) {
            Some(mut offer) if offer.status == OfferStatus::Active && offer.expires_at <= now => {
                offer.status = OfferStatus::Expired;
                self.staged.offers.insert(id, offer.clone());
                Ok(Some(offer))
            }
            _ => Ok(None),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut tables, staged } = *self;

        tables.requests.extend(staged.requests);
        tables.request_routing.extend(staged.request_routing);
        tables.offers.extend(staged.offers);
        tables.bookings.extend(staged.bookings);
        tables.booking_routing.extend(staged.booking_routing);
        tables.request_events.extend(staged.request_events);
        tables.status_logs.extend(staged.status_logs);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::models::request::RideRequest;
    use crate::models::status::{RideStatus, RideType};
    use crate::store::RideStore;

    fn request(expires_in: Duration) -> RideRequest {
        let now = Utc::now();
        RideRequest {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            fare_schedule_id: Uuid::new_v4(),
            ride_type: RideType::Private,
            distance_km: Decimal::TEN,
            planned_minutes: 20,
            base_fare: Decimal::ONE_HUNDRED,
            total_fare: Decimal::ONE_HUNDRED,
            status: RideStatus::Requested,
            expires_at: now + expires_in,
            confirmed_driver_id: None,
            confirmed_booking_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let req = request(Duration::seconds(60));

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_request(&req, &[]).await.unwrap();
            assert!(tx.lock_request(req.id).await.unwrap().is_some());
        }

        assert!(store.get_request(req.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = MemoryStore::new();
        let req = request(Duration::seconds(60));

        let mut tx = store.begin().await.unwrap();
        tx.insert_request(&req, &[]).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_request(req.id).await.unwrap(), Some(req));
    }

    #[tokio::test]
    async fn conditional_expiry_only_fires_once() {
        let store = MemoryStore::new();
        let req = request(Duration::seconds(-1));

        let mut tx = store.begin().await.unwrap();
        tx.insert_request(&req, &[]).await.unwrap();
        tx.commit().await.unwrap();

        let now = Utc::now();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.expire_request_if_due(req.id, now).await.unwrap());
        assert!(!tx.expire_request_if_due(req.id, now).await.unwrap());
        tx.commit().await.unwrap();

        let stored = store.get_request(req.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RideStatus::Expired);
    }
}
