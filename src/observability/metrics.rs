use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Refresh metrics
    pub refresh_attempts: IntCounterVec,
    pub refresh_failures: IntCounterVec,
    pub refresh_duration: HistogramVec,

    // Validation metrics
    pub validation_requests: IntCounter,
    pub validation_failures: IntCounterVec,

    // Store metrics
    pub store_saves: IntCounter,
    pub decrypt_failures: IntCounter,
    pub stored_tokens: IntGaugeVec,

    // Middleware metrics
    pub expired_retries: IntCounter,

    // Runtime
    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("tokenkeeper".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            // Refresh
            refresh_attempts: IntCounterVec::new(Opts::new("refresh_attempts_total", "Token refresh attempts by kind"), &["kind"]).unwrap(),
            refresh_failures: IntCounterVec::new(Opts::new("refresh_failures_total", "Token refresh failures by kind and reason"), &["kind", "reason"]).unwrap(),
            refresh_duration: HistogramVec::new(HistogramOpts::new("refresh_duration_seconds", "Refresh duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["kind"]).unwrap(),

            // Validation
            validation_requests: IntCounter::new("validation_requests_total", "Token introspection calls").unwrap(),
            validation_failures: IntCounterVec::new(Opts::new("validation_failures_total", "Introspection failures by reason"), &["reason"]).unwrap(),

            // Store
            store_saves: IntCounter::new("store_saves_total", "Whole-file store rewrites").unwrap(),
            decrypt_failures: IntCounter::new("store_decrypt_failures_total", "Stored payloads no scheme could decode").unwrap(),
            stored_tokens: IntGaugeVec::new(Opts::new("stored_tokens_total", "Stored tokens per kind"), &["kind"]).unwrap(),

            // Middleware
            expired_retries: IntCounter::new("expired_token_retries_total", "Provider calls retried after a refresh").unwrap(),

            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.refresh_attempts.clone())).unwrap();
        reg.register(Box::new(metrics.refresh_failures.clone())).unwrap();
        reg.register(Box::new(metrics.refresh_duration.clone())).unwrap();
        reg.register(Box::new(metrics.validation_requests.clone())).unwrap();
        reg.register(Box::new(metrics.validation_failures.clone())).unwrap();
        reg.register(Box::new(metrics.store_saves.clone())).unwrap();
        reg.register(Box::new(metrics.decrypt_failures.clone())).unwrap();
        reg.register(Box::new(metrics.stored_tokens.clone())).unwrap();
        reg.register(Box::new(metrics.expired_retries.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
