use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_requests_total: IntCounterVec,
    pub approval_latency_seconds: HistogramVec,
    pub scheduling_conflicts_total: IntCounterVec,
    pub events_published_total: IntCounterVec,
    pub events_dropped_total: IntCounterVec,
    pub active_connections: IntGauge,
    pub tracking_samples_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_requests_total = IntCounterVec::new(
            Opts::new("order_requests_total", "Order request lifecycle events by outcome"),
            &["outcome"],
        )
        .expect("valid order_requests_total metric");

        let approval_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "approval_latency_seconds",
                "Latency of order request approval in seconds",
            ),
            &["outcome"],
        )
        .expect("valid approval_latency_seconds metric");

        let scheduling_conflicts_total = IntCounterVec::new(
            Opts::new(
                "scheduling_conflicts_total",
                "Rejected bookings by conflicting resource kind",
            ),
            &["resource"],
        )
        .expect("valid scheduling_conflicts_total metric");

        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Events published by event type"),
            &["event"],
        )
        .expect("valid events_published_total metric");

        let events_dropped_total = IntCounterVec::new(
            Opts::new(
                "events_dropped_total",
                "Events not delivered to a subscriber, by reason",
            ),
            &["reason"],
        )
        .expect("valid events_dropped_total metric");

        let active_connections =
            IntGauge::new("active_connections", "Currently connected event subscribers")
                .expect("valid active_connections metric");

        let tracking_samples_total = IntCounterVec::new(
            Opts::new("tracking_samples_total", "Driver location pings by outcome"),
            &["outcome"],
        )
        .expect("valid tracking_samples_total metric");

        registry
            .register(Box::new(order_requests_total.clone()))
            .expect("register order_requests_total");
        registry
            .register(Box::new(approval_latency_seconds.clone()))
            .expect("register approval_latency_seconds");
        registry
            .register(Box::new(scheduling_conflicts_total.clone()))
            .expect("register scheduling_conflicts_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(events_dropped_total.clone()))
            .expect("register events_dropped_total");
        registry
            .register(Box::new(active_connections.clone()))
            .expect("register active_connections");
        registry
            .register(Box::new(tracking_samples_total.clone()))
            .expect("register tracking_samples_total");

        Self {
            registry,
            order_requests_total,
            approval_latency_seconds,
            scheduling_conflicts_total,
            events_published_total,
            events_dropped_total,
            active_connections,
            tracking_samples_total,
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
