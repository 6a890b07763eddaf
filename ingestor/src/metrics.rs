use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_readings_total",
        "Total readings persisted"
    ))
    .unwrap();
    pub static ref VALID_READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_valid_readings_total",
        "Total readings that passed validation"
    ))
    .unwrap();
    pub static ref INVALID_READINGS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_invalid_readings_total",
        "Total readings stored with validation errors"
    ))
    .unwrap();
    pub static ref ALERTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("ingestor_alerts_total", "Total alerts raised"),
        &["alert_type", "severity"]
    )
    .unwrap();
    pub static ref BATCH_ITEMS_SKIPPED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_batch_items_skipped_total",
        "Total batch items skipped because they were malformed or failed to persist"
    ))
    .unwrap();
    pub static ref REJECTED_REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_rejected_requests_total",
        "Total ingestion requests rejected before anything was persisted"
    ))
    .unwrap();
    pub static ref CLOCK_SKEW_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_clock_skew_total",
        "Total readings recorded after they were received"
    ))
    .unwrap();
    pub static ref DB_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "ingestor_db_failures_total",
        "Total database write failures"
    ))
    .unwrap();
    pub static ref INGEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "ingestor_ingest_latency_seconds",
            "Time taken to persist a reading or batch"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY.register(Box::new(READINGS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(VALID_READINGS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INVALID_READINGS_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(ALERTS_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(BATCH_ITEMS_SKIPPED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(REJECTED_REQUESTS_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(CLOCK_SKEW_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(DB_FAILURES_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(INGEST_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
