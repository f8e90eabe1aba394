use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

/// Metric name prefix for all inbox metrics
const PREFIX: &str = "notification_inbox";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Reconciliation
    pub static ref LIVE_UPDATES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_live_updates_total"), "Inbound events merged, by kind"),
        &["kind"]
    ).expect("Failed to create live_updates_total metric");

    pub static ref ANOMALOUS_DELETES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_anomalous_deletes_total"),
        "Deletes for notifications that were never cached"
    ).expect("Failed to create anomalous_deletes_total metric");

    pub static ref MALFORMED_EVENTS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_malformed_events_total"),
        "Inbound events rejected at classification"
    ).expect("Failed to create malformed_events_total metric");

    // Pagination
    pub static ref RECORDS_LOADED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_records_loaded_total"),
        "Notifications returned by load-older pages"
    ).expect("Failed to create records_loaded_total metric");

    // Backend
    pub static ref BACKEND_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_backend_failures_total"), "Failed backend calls, by operation"),
        &["operation"]
    ).expect("Failed to create backend_failures_total metric");

    // State
    pub static ref UNREAD_COUNT: Gauge = Gauge::new(
        format!("{PREFIX}_unread_count"),
        "Last unread count reported by the backend"
    ).expect("Failed to create unread_count metric");

    pub static ref CACHED_NOTIFICATIONS: Gauge = Gauge::new(
        format!("{PREFIX}_cached_notifications"),
        "Notifications currently held in the inbox cache"
    ).expect("Failed to create cached_notifications metric");
}

/// Register all metrics with the inbox registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(LIVE_UPDATES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ANOMALOUS_DELETES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MALFORMED_EVENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RECORDS_LOADED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKEND_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(UNREAD_COUNT.clone()));
    let _ = REGISTRY.register(Box::new(CACHED_NOTIFICATIONS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_live_update(kind: &str) {
    LIVE_UPDATES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_anomalous_delete() {
    ANOMALOUS_DELETES_TOTAL.inc();
}

pub fn record_malformed_event() {
    MALFORMED_EVENTS_TOTAL.inc();
}

pub fn record_records_loaded(count: usize) {
    RECORDS_LOADED_TOTAL.inc_by(count as f64);
}

pub fn record_backend_failure(operation: &str) {
    BACKEND_FAILURES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn set_unread_count(count: usize) {
    UNREAD_COUNT.set(count as f64);
}

pub fn set_cached_notifications(count: usize) {
    CACHED_NOTIFICATIONS.set(count as f64);
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_metrics_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
}
