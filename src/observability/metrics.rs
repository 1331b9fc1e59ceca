use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ride_requests_total: IntCounterVec,
    pub rides_in_queue: IntGauge,
    pub matches_total: IntCounter,
    pub timeouts_total: IntCounter,
    pub tick_duration_seconds: Histogram,
    pub port_failures_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ride_requests_total = IntCounterVec::new(
            Opts::new("ride_requests_total", "Submitted ride requests by outcome"),
            &["outcome"],
        )
        .expect("valid ride_requests_total metric");

        let rides_in_queue = IntGauge::new("rides_in_queue", "Ride requests waiting for a match")
            .expect("valid rides_in_queue metric");

        let matches_total = IntCounter::new("matches_total", "Shared-ride matches committed")
            .expect("valid matches_total metric");

        let timeouts_total =
            IntCounter::new("timeouts_total", "Ride requests reaped after their deadline")
                .expect("valid timeouts_total metric");

        let tick_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "tick_duration_seconds",
            "Duration of one matching pass in seconds",
        ))
        .expect("valid tick_duration_seconds metric");

        let port_failures_total = IntCounterVec::new(
            Opts::new("port_failures_total", "Failed calls to external ports"),
            &["port"],
        )
        .expect("valid port_failures_total metric");

        registry
            .register(Box::new(ride_requests_total.clone()))
            .expect("register ride_requests_total");
        registry
            .register(Box::new(rides_in_queue.clone()))
            .expect("register rides_in_queue");
        registry
            .register(Box::new(matches_total.clone()))
            .expect("register matches_total");
        registry
            .register(Box::new(timeouts_total.clone()))
            .expect("register timeouts_total");
        registry
            .register(Box::new(tick_duration_seconds.clone()))
            .expect("register tick_duration_seconds");
        registry
            .register(Box::new(port_failures_total.clone()))
            .expect("register port_failures_total");

        Self {
            registry,
            ride_requests_total,
            rides_in_queue,
            matches_total,
            timeouts_total,
            tick_duration_seconds,
            port_failures_total,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
