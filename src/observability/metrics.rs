use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ride_requests_total: IntCounterVec,
    pub driver_offers_total: IntCounterVec,
    pub confirmations_total: IntCounterVec,
    pub confirmation_latency_seconds: HistogramVec,
    pub ride_transitions_total: IntCounterVec,
    pub sweeper_expired_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ride_requests_total = IntCounterVec::new(
            Opts::new("ride_requests_total", "Ride request creations by outcome"),
            &["outcome"],
        )
        .expect("valid ride_requests_total metric");

        let driver_offers_total = IntCounterVec::new(
            Opts::new("driver_offers_total", "Driver offer submissions by outcome"),
            &["outcome"],
        )
        .expect("valid driver_offers_total metric");

        let confirmations_total = IntCounterVec::new(
            Opts::new("confirmations_total", "Confirmation attempts by outcome"),
            &["outcome"],
        )
        .expect("valid confirmations_total metric");

        let confirmation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Latency of the confirmation transaction in seconds",
            ),
            &["outcome"],
        )
        .expect("valid confirmation_latency_seconds metric");

        let ride_transitions_total = IntCounterVec::new(
            Opts::new("ride_transitions_total", "Applied booking transitions by target status"),
            &["status"],
        )
        .expect("valid ride_transitions_total metric");

        let sweeper_expired_total = IntCounterVec::new(
            Opts::new("sweeper_expired_total", "Rows expired by the sweepers"),
            &["kind"],
        )
        .expect("valid sweeper_expired_total metric");

        registry
            .register(Box::new(ride_requests_total.clone()))
            .expect("register ride_requests_total");
        registry
            .register(Box::new(driver_offers_total.clone()))
            .expect("register driver_offers_total");
        registry
            .register(Box::new(confirmations_total.clone()))
            .expect("register confirmations_total");
        registry
            .register(Box::new(confirmation_latency_seconds.clone()))
            .expect("register confirmation_latency_seconds");
        registry
            .register(Box::new(ride_transitions_total.clone()))
            .expect("register ride_transitions_total");
        registry
            .register(Box::new(sweeper_expired_total.clone()))
            .expect("register sweeper_expired_total");

        Self {
            registry,
            ride_requests_total,
            driver_offers_total,
            confirmations_total,
            confirmation_latency_seconds,
            ride_transitions_total,
            sweeper_expired_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

/// Label value for a finished operation.
pub fn outcome<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}
