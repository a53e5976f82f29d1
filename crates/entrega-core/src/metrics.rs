use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

/// OTel metrics for the delivery pipeline. Created once per consumer and
/// recorded on every dispatch.
pub struct Metrics {
    pub deliveries_received: Counter<u64>,
    pub deliveries_acked: Counter<u64>,
    pub deliveries_requeued: Counter<u64>,
    pub deliveries_rejected: Counter<u64>,
    pub deliveries_stale: Counter<u64>,
    pub dispatch_failures: Counter<u64>,
    pub ack_failures: Counter<u64>,
    pub deliveries_inflight: Gauge<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create metrics from the global meter provider. If no meter provider
    /// is configured (OTel disabled), the instruments are no-op.
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("entrega");
        Self::from_meter(&meter)
    }

    /// Create metrics from a specific meter (used in tests with an in-memory
    /// exporter).
    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            deliveries_received: meter
                .u64_counter("entrega.deliveries.received")
                .with_description("Deliveries entering the dispatch pipeline")
                .build(),
            deliveries_acked: meter
                .u64_counter("entrega.deliveries.acked")
                .with_description("Deliveries finalized with a positive acknowledgment")
                .build(),
            deliveries_requeued: meter
                .u64_counter("entrega.deliveries.requeued")
                .with_description("Deliveries finalized with a requeueing nack")
                .build(),
            deliveries_rejected: meter
                .u64_counter("entrega.deliveries.rejected")
                .with_description("Deliveries finalized with a non-requeueing nack")
                .build(),
            deliveries_stale: meter
                .u64_counter("entrega.deliveries.stale")
                .with_description("Deliveries observed past their declared time budget")
                .build(),
            dispatch_failures: meter
                .u64_counter("entrega.dispatch.failures")
                .with_description("Dispatch failures by pipeline stage")
                .build(),
            ack_failures: meter
                .u64_counter("entrega.ack.failures")
                .with_description("Broker acknowledgment calls that failed")
                .build(),
            deliveries_inflight: meter
                .u64_gauge("entrega.deliveries.inflight")
                .with_description("Deliveries currently between receipt and finalization")
                .build(),
        }
    }

    pub fn record_received(&self, queue: &str) {
        self.deliveries_received
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn record_ack(&self, queue: &str) {
        self.deliveries_acked
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn record_requeue(&self, queue: &str) {
        self.deliveries_requeued
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn record_reject(&self, queue: &str) {
        self.deliveries_rejected
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn record_stale(&self, queue: &str) {
        self.deliveries_stale
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn record_dispatch_failure(&self, queue: &str, stage: &'static str) {
        self.dispatch_failures.add(
            1,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("stage", stage),
            ],
        );
    }

    pub fn record_ack_failure(&self, queue: &str) {
        self.ack_failures
            .add(1, &[KeyValue::new("queue", queue.to_string())]);
    }

    pub fn set_inflight(&self, queue: &str, count: u64) {
        self.deliveries_inflight
            .record(count, &[KeyValue::new("queue", queue.to_string())]);
    }
}
