mod common;

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;

use common::*;
use ride_dispatch::engine::confirmation::confirm;
use ride_dispatch::engine::lifecycle::{cancel_ride, complete_ride, mark_arrived, start_ride, update_driver_location};
use ride_dispatch::engine::offers::{list_offers, submit_offer, withdraw_offer};
use ride_dispatch::engine::queries::{
    driver_earnings, get_booking, list_bookings_for_user, recent_places, ride_history, ride_summary,
};
use ride_dispatch::engine::requests::{create_request, get_request, quote_fare};
use ride_dispatch::engine::sweeper::{sweep_expired_offers, sweep_expired_requests};
use ride_dispatch::error::{AppError, ErrorKind};
use ride_dispatch::models::booking::EarningsPeriod;
use ride_dispatch::models::routing::{GeoPoint, LegType};
use ride_dispatch::models::status::{OfferStatus, RideStatus};
use ride_dispatch::models::user::Actor;
use ride_dispatch::store::RideStore;

#[tokio::test]
async fn create_request_prices_and_records_it() {
    let fx = fixture();
    let created = create_request(&fx.state, fx.customer(), ride_input()).await.unwrap();
    let request = &created.request;

    assert_eq!(request.status, RideStatus::Requested);
    assert_eq!(request.base_fare, dec("200"));
    assert_eq!(request.total_fare, dec("240"));
    assert_eq!(request.fare_schedule_id, fx.schedule.id);
    assert_eq!(request.expires_at, start_time() + Duration::seconds(60));
    assert_eq!(created.routing.len(), 2);

    let stored = get_request(&fx.state, request.id).await.unwrap();
    assert_eq!(stored.routing.len(), 2);

    let events = fx.store.request_events(request.id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "request_created");
}

#[tokio::test]
async fn create_request_without_schedule_is_unavailable() {
    let fx = fixture();
    fx.store.deactivate_fare_schedules();

    let err = create_request(&fx.state, fx.customer(), ride_input()).await.unwrap_err();

    assert!(matches!(err, AppError::NoActiveFareSchedule));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(fx.store.bookings_for_user(fx.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn inactive_customer_cannot_request() {
    let fx = fixture();
    let stranger = Actor::customer(uuid::Uuid::new_v4());

    let err = create_request(&fx.state, stranger, ride_input()).await.unwrap_err();
    assert!(matches!(err, AppError::NoActiveCustomer(_)));

    let err = create_request(&fx.state, fx.driver(0), ride_input()).await.unwrap_err();
    assert!(matches!(err, AppError::RoleMismatch(_)));
}

#[tokio::test]
async fn quote_matches_request_fare() {
    let fx = fixture();
    let quote = quote_fare(&fx.state, dec("10"), 20).await.unwrap();

    assert_eq!(quote.total, dec("240"));
    assert_eq!(quote.driver_fee, dec("30"));
}

#[tokio::test]
async fn first_offer_moves_request_to_driver_offered() {
    let fx = fixture();
    let request = requested(&fx).await;

    let offer = offered(&fx, request.id, 0).await;

    assert_eq!(offer.status, OfferStatus::Active);
    assert_eq!(offer.expires_at, start_time() + Duration::seconds(20));
    let km = offer.snapshot.distance_to_pickup_km.unwrap();
    assert!((km - 1.112).abs() < 0.01, "got {km}");
    assert_eq!(offer.snapshot.eta_min, Some(2));
    assert_eq!(offer.snapshot.pickup_address.as_deref(), Some("Saddar"));

    let stored = fx.store.get_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::DriverOffered);

    let events = fx.store.request_events(request.id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "driver_offered"));
}

#[tokio::test]
async fn rebid_refreshes_the_same_offer() {
    let fx = fixture();
    let request = requested(&fx).await;
    let first = offered(&fx, request.id, 0).await;

    fx.clock.advance(Duration::seconds(15));
    let second = offered(&fx, request.id, 0).await;

    assert_eq!(first.id, second.id);
    assert_eq!(second.expires_at, start_time() + Duration::seconds(35));
    assert_eq!(fx.store.offers_for_request(request.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn expired_offer_can_be_renewed_but_withdrawn_cannot() {
    let fx = fixture();
    let request = requested(&fx).await;
    let offer = offered(&fx, request.id, 0).await;
    offered(&fx, request.id, 1).await;

    fx.clock.advance(Duration::seconds(21));
    assert_eq!(sweep_expired_offers(&fx.state).await.unwrap(), 2);

    let renewed = offered(&fx, request.id, 0).await;
    assert_eq!(renewed.id, offer.id);
    assert_eq!(renewed.status, OfferStatus::Active);

    let withdrawn = withdraw_offer(&fx.state, fx.driver(0), request.id).await.unwrap();
    assert_eq!(withdrawn.status, OfferStatus::Withdrawn);

    let err = submit_offer(&fx.state, fx.driver(0), request.id, near_pickup())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OfferClosed(OfferStatus::Withdrawn)));
}

#[tokio::test]
async fn offers_on_a_stale_request_are_refused_before_the_sweep() {
    let fx = fixture();
    let request = requested(&fx).await;

    fx.clock.advance(Duration::seconds(61));
    let err = submit_offer(&fx.state, fx.driver(0), request.id, near_pickup())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::RequestExpired(_)));
    assert_eq!(err.kind(), ErrorKind::Expired);
}

#[tokio::test]
async fn list_offers_shows_only_live_bids_to_the_owner() {
    let fx = fixture();
    let request = requested(&fx).await;
    offered(&fx, request.id, 0).await;
    fx.clock.advance(Duration::seconds(10));
    offered(&fx, request.id, 1).await;

    fx.clock.advance(Duration::seconds(15));
    let live = list_offers(&fx.state, fx.customer(), request.id).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].driver_id, fx.drivers[1]);

    let err = list_offers(&fx.state, Actor::customer(uuid::Uuid::new_v4()), request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAssignedParty(_)));
}

#[tokio::test]
async fn confirm_selects_one_offer_and_rejects_the_rest() {
    let fx = fixture();
    let request = requested(&fx).await;
    for driver in 0..3 {
        offered(&fx, request.id, driver).await;
    }
    fx.store.put_rating(rating(fx.drivers[1], 4));
    fx.store.put_rating(rating(fx.drivers[1], 5));

    let confirmation = confirm(&fx.state, fx.customer(), request.id, fx.drivers[1]).await.unwrap();
    let booking = &confirmation.booking;

    assert_eq!(booking.status, RideStatus::Confirmed);
    assert_eq!(booking.driver_id, fx.drivers[1]);
    assert_eq!(booking.total_fare, dec("240"));
    assert_eq!(booking.driver_fee_amount, dec("30"));
    let otp: u32 = booking.otp_code.parse().unwrap();
    assert!((1000..=9999).contains(&otp));
    assert_eq!(confirmation.driver_rating.average, 4.5);
    assert_eq!(confirmation.driver_rating.count, 2);
    assert_eq!(confirmation.customer_rating.count, 0);

    let offers = fx.store.offers_for_request(request.id).await.unwrap();
    let selected: Vec<_> = offers.iter().filter(|o| o.status == OfferStatus::Selected).collect();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].driver_id, fx.drivers[1]);
    assert_eq!(offers.iter().filter(|o| o.status == OfferStatus::Rejected).count(), 2);

    let stored = fx.store.get_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::Confirmed);
    assert_eq!(stored.confirmed_booking_id, Some(booking.id));
    assert_eq!(stored.confirmed_driver_id, Some(fx.drivers[1]));

    let routing = fx.store.booking_routing(booking.id).await.unwrap();
    assert_eq!(routing.len(), 3);
    let driver_leg = routing.iter().find(|l| l.leg_type == LegType::DriverLocation).unwrap();
    assert_eq!(driver_leg.lat, near_pickup().lat);

    let events: Vec<String> = fx
        .store
        .request_events(request.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert!(events.contains(&"customer_selected_driver".to_string()));
    assert!(events.contains(&"request_confirmed".to_string()));

    let booking_logs = fx.store.status_logs(booking.id).await.unwrap();
    assert_eq!(booking_logs.len(), 1);
    assert_eq!(booking_logs[0].status, "confirmed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirmations_produce_one_booking() {
    let fx = fixture();
    let request = requested(&fx).await;
    offered(&fx, request.id, 0).await;
    offered(&fx, request.id, 1).await;
    let request_id = request.id;

    let tasks: Vec<_> = [0, 1]
        .into_iter()
        .map(|driver| {
            let state = fx.state.clone();
            let customer = fx.customer();
            let driver_id = fx.drivers[driver];
            tokio::spawn(async move { confirm(&state, customer, request_id, driver_id).await })
        })
        .collect();

    let mut successes = 0;
    let mut failures = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => failures.push(err),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], AppError::RequestNotOfferable(RideStatus::Confirmed)));
    assert_eq!(fx.store.bookings_for_user(fx.customer).await.unwrap().len(), 1);

    let offers = fx.store.offers_for_request(request.id).await.unwrap();
    assert_eq!(offers.iter().filter(|o| o.status == OfferStatus::Selected).count(), 1);
    assert_eq!(offers.iter().filter(|o| o.status == OfferStatus::Rejected).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bids_from_one_driver_leave_one_offer() {
    let fx = fixture();
    let request = requested(&fx).await;
    let request_id = request.id;

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let state = fx.state.clone();
            let driver = fx.driver(0);
            tokio::spawn(async move { submit_offer(&state, driver, request_id, near_pickup()).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let offers = fx.store.offers_for_request(request_id).await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].driver_id, fx.drivers[0]);
    assert_eq!(offers[0].status, OfferStatus::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirm_and_late_bid_serialize_on_the_request() {
    for _ in 0..8 {
        let fx = fixture();
        let request = requested(&fx).await;
        offered(&fx, request.id, 0).await;
        let request_id = request.id;

        let confirming = {
            let state = fx.state.clone();
            let customer = fx.customer();
            let winner = fx.drivers[0];
            tokio::spawn(async move { confirm(&state, customer, request_id, winner).await })
        };
        let bidding = {
            let state = fx.state.clone();
            let driver = fx.driver(1);
            tokio::spawn(async move { submit_offer(&state, driver, request_id, near_pickup()).await })
        };

        confirming.await.unwrap().unwrap();
        let late_offer = fx
            .store
            .offers_for_request(request_id)
            .await
            .unwrap()
            .into_iter()
            .find(|o| o.driver_id == fx.drivers[1]);

        match bidding.await.unwrap() {
            Ok(_) => assert_eq!(late_offer.map(|o| o.status), Some(OfferStatus::Rejected)),
            Err(err) => {
                assert!(matches!(err, AppError::RequestNotOfferable(RideStatus::Confirmed)));
                assert!(late_offer.is_none());
            }
        }

        let offers = fx.store.offers_for_request(request_id).await.unwrap();
        assert_eq!(offers.iter().filter(|o| o.status == OfferStatus::Selected).count(), 1);
        assert!(offers.iter().all(|o| o.status != OfferStatus::Active));
    }
}

#[tokio::test]
async fn high_precision_distance_survives_confirmation() {
    let fx = fixture();
    let mut input = ride_input();
    input.distance_km = dec("3.3335");

    let created = create_request(&fx.state, fx.customer(), input).await.unwrap();
    assert_eq!(created.request.distance_km, dec("3.334"));
    assert_eq!(created.request.base_fare, dec("66.68"));

    offered(&fx, created.request.id, 0).await;
    let confirmation = confirm(&fx.state, fx.customer(), created.request.id, fx.drivers[0])
        .await
        .unwrap();
    assert_eq!(confirmation.booking.base_fare, dec("66.68"));
}

#[tokio::test]
async fn offline_driver_cannot_be_confirmed() {
    let fx = fixture();
    let request = requested(&fx).await;
    offered(&fx, request.id, 0).await;
    fx.store.set_online(fx.drivers[0], false);

    let err = confirm(&fx.state, fx.customer(), request.id, fx.drivers[0]).await.unwrap_err();
    assert!(matches!(err, AppError::DriverOffline(_)));
}

#[tokio::test]
async fn confirm_rechecks_offer_deadline() {
    let fx = fixture();
    let request = requested(&fx).await;
    offered(&fx, request.id, 0).await;

    fx.clock.advance(Duration::seconds(21));
    let err = confirm(&fx.state, fx.customer(), request.id, fx.drivers[0]).await.unwrap_err();
    assert!(matches!(err, AppError::OfferExpired(_)));

    let err = confirm(&fx.state, fx.customer(), request.id, fx.drivers[2]).await.unwrap_err();
    assert!(matches!(err, AppError::OfferNotFound(_)));
}

#[tokio::test]
async fn fare_mismatch_rolls_back_everything() {
    let fx = fixture();
    let request = requested(&fx).await;
    offered(&fx, request.id, 0).await;
    offered(&fx, request.id, 1).await;

    let mut repriced = schedule(start_time() + Duration::seconds(1));
    repriced.rate_per_km = dec("25");
    fx.store.put_fare_schedule(repriced);

    let err = confirm(&fx.state, fx.customer(), request.id, fx.drivers[0]).await.unwrap_err();
    assert!(matches!(err, AppError::FareMismatch));

    let stored = fx.store.get_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::DriverOffered);
    assert!(stored.confirmed_booking_id.is_none());
    let offers = fx.store.offers_for_request(request.id).await.unwrap();
    assert!(offers.iter().all(|o| o.status == OfferStatus::Active));
    assert!(fx.store.bookings_for_user(fx.customer).await.unwrap().is_empty());
}

#[tokio::test]
async fn sweeper_expires_unclaimed_requests_once() {
    let fx = fixture();
    let request = requested(&fx).await;

    fx.clock.advance(Duration::seconds(59));
    assert_eq!(sweep_expired_requests(&fx.state).await.unwrap(), 0);

    fx.clock.advance(Duration::seconds(2));
    assert_eq!(sweep_expired_requests(&fx.state).await.unwrap(), 1);
    assert_eq!(sweep_expired_requests(&fx.state).await.unwrap(), 0);

    let stored = fx.store.get_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::Expired);

    let logs = fx.store.status_logs(request.id).await.unwrap();
    assert_eq!(logs.iter().filter(|l| l.status == "expired").count(), 1);
    let events = fx.store.request_events(request.id).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == "request_expired"));
}

#[tokio::test]
async fn offer_sweep_leaves_request_offered() {
    let fx = fixture();
    let request = requested(&fx).await;
    offered(&fx, request.id, 0).await;

    fx.clock.advance(Duration::seconds(21));
    assert_eq!(sweep_expired_offers(&fx.state).await.unwrap(), 1);

    let offers = fx.store.offers_for_request(request.id).await.unwrap();
    assert_eq!(offers[0].status, OfferStatus::Expired);
    let stored = fx.store.get_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::DriverOffered);
    assert!(list_offers(&fx.state, fx.customer(), request.id).await.unwrap().is_empty());

    // An offered request is no longer `requested`, so the request sweep skips it.
    fx.clock.advance(Duration::seconds(60));
    assert_eq!(sweep_expired_requests(&fx.state).await.unwrap(), 0);
}

#[tokio::test]
async fn late_ride_pays_traffic_delay() {
    let fx = fixture();
    let booking = confirmed(&fx).await;

    mark_arrived(&fx.state, fx.driver(0), booking.id).await.unwrap();
    let started = start_ride(&fx.state, fx.driver(0), booking.id, Some(&booking.otp_code))
        .await
        .unwrap();
    assert_eq!(started.ride_start_time, Some(start_time()));

    fx.clock.advance(Duration::minutes(35));
    let done = complete_ride(&fx.state, fx.driver(0), booking.id).await.unwrap();

    assert_eq!(done.status, RideStatus::Completed);
    assert_eq!(done.delay_minutes, 15);
    assert_eq!(done.traffic_delay_amount, dec("20"));
    assert_eq!(done.total_fare, dec("260"));
    assert_eq!(done.ride_end_time, Some(start_time() + Duration::minutes(35)));
}

#[tokio::test]
async fn on_time_ride_pays_no_traffic_delay() {
    let fx = fixture();
    let booking = confirmed(&fx).await;

    start_ride(&fx.state, fx.driver(0), booking.id, None).await.unwrap();
    fx.clock.advance(Duration::minutes(25));
    let done = complete_ride(&fx.state, fx.driver(0), booking.id).await.unwrap();

    assert_eq!(done.delay_minutes, 5);
    assert_eq!(done.traffic_delay_amount, Decimal::ZERO);
    assert_eq!(done.total_fare, dec("240"));
}

#[tokio::test]
async fn wrong_otp_keeps_ride_waiting() {
    let fx = fixture();
    let booking = confirmed(&fx).await;
    let wrong = if booking.otp_code == "1000" { "1001" } else { "1000" };

    let err = start_ride(&fx.state, fx.driver(0), booking.id, Some(wrong)).await.unwrap_err();
    assert!(matches!(err, AppError::OtpMismatch));

    let stored = fx.store.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::Confirmed);
    assert!(stored.ride_start_time.is_none());
}

#[tokio::test]
async fn completed_ride_cannot_be_cancelled() {
    let fx = fixture();
    let booking = confirmed(&fx).await;
    start_ride(&fx.state, fx.driver(0), booking.id, None).await.unwrap();
    complete_ride(&fx.state, fx.driver(0), booking.id).await.unwrap();

    let err = cancel_ride(&fx.state, fx.driver(0), booking.id, "car broke down")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CancellationNotAllowed(RideStatus::Completed)));
    let stored = fx.store.get_booking(booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RideStatus::Completed);
}

#[tokio::test]
async fn repeated_transition_is_a_no_op() {
    let fx = fixture();
    let booking = confirmed(&fx).await;

    let first = mark_arrived(&fx.state, fx.driver(0), booking.id).await.unwrap();
    let second = mark_arrived(&fx.state, fx.driver(0), booking.id).await.unwrap();

    assert_eq!(first.status, RideStatus::Arrived);
    assert_eq!(second, first);
    let logs = fx.store.status_logs(booking.id).await.unwrap();
    assert_eq!(logs.iter().filter(|l| l.status == "arrived").count(), 1);
}

#[tokio::test]
async fn completion_requires_a_started_ride() {
    let fx = fixture();
    let booking = confirmed(&fx).await;

    let err = complete_ride(&fx.state, fx.driver(0), booking.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidTransition {
            from: RideStatus::Confirmed,
            to: RideStatus::Completed
        }
    ));
}

#[tokio::test]
async fn only_the_assigned_driver_moves_the_ride() {
    let fx = fixture();
    let booking = confirmed(&fx).await;

    let err = mark_arrived(&fx.state, fx.driver(1), booking.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotAssignedParty(_)));

    let err = mark_arrived(&fx.state, fx.customer(), booking.id).await.unwrap_err();
    assert!(matches!(err, AppError::RoleMismatch(_)));
}

#[tokio::test]
async fn customer_cancellation_is_final() {
    let notifier = Arc::new(RecordingNotifier::default());
    let fx = fixture_with_notifier(notifier.clone());
    let booking = confirmed(&fx).await;

    let cancelled = cancel_ride(&fx.state, fx.customer(), booking.id, "plans changed")
        .await
        .unwrap();
    assert_eq!(cancelled.status, RideStatus::CancelledByCustomer);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("plans changed"));

    let again = cancel_ride(&fx.state, fx.customer(), booking.id, "plans changed")
        .await
        .unwrap();
    assert_eq!(again.status, RideStatus::CancelledByCustomer);

    let err = cancel_ride(&fx.state, fx.driver(0), booking.id, "").await.unwrap_err();
    assert!(matches!(err, AppError::CancellationNotAllowed(_)));

    let logs = fx.store.status_logs(booking.id).await.unwrap();
    let log = logs.iter().find(|l| l.status == "cancelled_by_customer").unwrap();
    assert!(log.note.contains("plans changed"));

    let driver_titles = notifier.titles_for(fx.drivers[0]);
    assert_eq!(
        driver_titles.iter().filter(|t| t.as_str() == "Ride Cancelled").count(),
        1
    );
}

#[tokio::test]
async fn notification_failure_does_not_undo_confirmation() {
    let fx = fixture_with_notifier(Arc::new(FailingNotifier));
    let request = requested(&fx).await;
    offered(&fx, request.id, 0).await;

    let confirmation = confirm(&fx.state, fx.customer(), request.id, fx.drivers[0]).await.unwrap();

    let stored = fx.store.get_booking(confirmation.booking.id).await.unwrap();
    assert!(stored.is_some());
    let request = fx.store.get_request(request.id).await.unwrap().unwrap();
    assert_eq!(request.status, RideStatus::Confirmed);
}

#[tokio::test]
async fn confirmation_notifies_winner_customer_and_losers() {
    let notifier = Arc::new(RecordingNotifier::default());
    let fx = fixture_with_notifier(notifier.clone());
    let request = requested(&fx).await;
    offered(&fx, request.id, 0).await;
    offered(&fx, request.id, 1).await;

    confirm(&fx.state, fx.customer(), request.id, fx.drivers[0]).await.unwrap();

    assert!(notifier.titles_for(fx.drivers[0]).contains(&"Ride Confirmed".to_string()));
    assert!(notifier.titles_for(fx.drivers[1]).contains(&"Offer Not Selected".to_string()));
    let customer_titles = notifier.titles_for(fx.customer);
    assert!(customer_titles.contains(&"New Driver Offer".to_string()));
    assert!(customer_titles.contains(&"Driver Assigned".to_string()));
}

#[tokio::test]
async fn driver_location_leg_follows_the_driver() {
    let fx = fixture();
    let booking = confirmed(&fx).await;
    let moved = GeoPoint {
        lat: 24.87,
        lng: 67.02,
    };

    let leg = update_driver_location(&fx.state, fx.driver(0), booking.id, moved).await.unwrap();
    assert_eq!(leg.leg_type, LegType::DriverLocation);

    let routing = fx.store.booking_routing(booking.id).await.unwrap();
    let driver_legs: Vec<_> = routing.iter().filter(|l| l.leg_type == LegType::DriverLocation).collect();
    assert_eq!(driver_legs.len(), 1);
    assert_eq!(driver_legs[0].lat, 24.87);

    let summary = ride_summary(&fx.state, fx.customer(), booking.id).await.unwrap();
    assert_eq!(summary.driver_location.map(|l| l.lng), Some(67.02));
    assert_eq!(summary.customer.name.as_deref(), Some("Ayesha"));
    assert_eq!(summary.otp.as_deref(), Some(booking.otp_code.as_str()));
}

#[tokio::test]
async fn otp_is_shown_only_to_the_customer() {
    let fx = fixture();
    let booking = confirmed(&fx).await;

    let summary = ride_summary(&fx.state, fx.driver(0), booking.id).await.unwrap();
    assert!(summary.otp.is_none());

    let view = get_booking(&fx.state, fx.driver(0), booking.id).await.unwrap();
    assert!(view.booking.otp_code.is_empty());
    let view = get_booking(&fx.state, fx.customer(), booking.id).await.unwrap();
    assert_eq!(view.booking.otp_code, booking.otp_code);

    let rides = list_bookings_for_user(&fx.state, fx.driver(0)).await.unwrap();
    assert!(rides.iter().all(|b| b.otp_code.is_empty()));
}

#[tokio::test]
async fn strangers_cannot_read_a_ride() {
    let fx = fixture();
    let booking = confirmed(&fx).await;

    let err = ride_summary(&fx.state, fx.driver(1), booking.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotAssignedParty(_)));
    let err = get_booking(&fx.state, Actor::customer(uuid::Uuid::new_v4()), booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotAssignedParty(_)));
}

#[tokio::test]
async fn history_earnings_and_places_reflect_finished_rides() {
    let fx = fixture();

    let finished = confirmed(&fx).await;
    start_ride(&fx.state, fx.driver(0), finished.id, None).await.unwrap();
    complete_ride(&fx.state, fx.driver(0), finished.id).await.unwrap();

    let cancelled = confirmed(&fx).await;
    cancel_ride(&fx.state, fx.driver(0), cancelled.id, "flat tyre").await.unwrap();

    let history = ride_history(&fx.state, fx.customer()).await.unwrap();
    assert_eq!(history.completed.len(), 1);
    assert_eq!(history.cancelled.len(), 1);
    assert!(history.in_progress.is_empty());
    let receipt = &history.completed[0].receipt;
    assert_eq!(receipt.platform_fee, dec("30"));
    assert_eq!(receipt.total, dec("240"));
    assert!(history.completed[0].distance_km.unwrap() > 0.0);

    let earnings = driver_earnings(&fx.state, fx.driver(0), EarningsPeriod::Today).await.unwrap();
    assert_eq!(earnings.rides, 1);
    assert_eq!(earnings.total, dec("240"));

    let places = recent_places(&fx.state, fx.customer()).await.unwrap();
    assert_eq!(places.len(), 1);
    assert_eq!(places[0].address, "Gulshan-e-Iqbal");
}

fn rating(user_id: uuid::Uuid, score: i16) -> ride_dispatch::models::rating::RatingRecord {
    ride_dispatch::models::rating::RatingRecord {
        id: uuid::Uuid::new_v4(),
        user_id,
        rated_by: uuid::Uuid::new_v4(),
        score,
        created_at: start_time(),
    }
}
