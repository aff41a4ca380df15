//! Prometheus metrics for the normalized cache
//!
//! Registered once per process in the default registry; every store and
//! facade instance reports into the same series, labelled by backend.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Counter: record loads by backend and outcome (hit/miss)
    pub static ref CACHE_LOADS: CounterVec = register_counter_vec!(
        "normcache_loads_total",
        "Record loads by backend and outcome",
        &["backend", "outcome"]
    )
    .expect("Failed to create loads metric");

    /// Counter: evicted records by reason (size, entries, expired)
    pub static ref EVICTIONS: CounterVec = register_counter_vec!(
        "normcache_evictions_total",
        "Evicted records by reason",
        &["reason"]
    )
    .expect("Failed to create evictions metric");

    /// Histogram: batch merge duration per backend (seconds)
    pub static ref MERGE_DURATION: HistogramVec = register_histogram_vec!(
        "normcache_merge_duration_seconds",
        "Duration of batch merges",
        &["backend"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .expect("Failed to create merge_duration metric");

    /// Counter: records merged per backend
    pub static ref RECORDS_MERGED: CounterVec = register_counter_vec!(
        "normcache_records_merged_total",
        "Records merged per backend",
        &["backend"]
    )
    .expect("Failed to create records_merged metric");

    /// Counter: failed write-through to the secondary tier
    pub static ref SECONDARY_WRITE_FAILURES: CounterVec = register_counter_vec!(
        "normcache_secondary_write_failures_total",
        "Write-through failures by secondary backend",
        &["backend"]
    )
    .expect("Failed to create secondary_write_failures metric");

    /// Counter: failed reads by error kind
    pub static ref READ_ERRORS: CounterVec = register_counter_vec!(
        "normcache_read_errors_total",
        "Failed reads by error kind",
        &["kind"]
    )
    .expect("Failed to create read_errors metric");

    /// Gauge: resident entries per backend
    pub static ref RESIDENT_ENTRIES: GaugeVec = register_gauge_vec!(
        "normcache_resident_entries",
        "Records currently held per backend",
        &["backend"]
    )
    .expect("Failed to create resident_entries metric");
}

pub fn record_load(backend: &str, hit: bool) {
    CACHE_LOADS
        .with_label_values(&[backend, if hit { "hit" } else { "miss" }])
        .inc();
}

pub fn record_eviction(reason: &str) {
    EVICTIONS.with_label_values(&[reason]).inc();
}

/// Record one batch merge
pub fn record_merge(backend: &str, records: usize, duration_secs: f64) {
    MERGE_DURATION
        .with_label_values(&[backend])
        .observe(duration_secs);
    RECORDS_MERGED
        .with_label_values(&[backend])
        .inc_by(records as f64);
}

pub fn record_secondary_write_failure(backend: &str) {
    SECONDARY_WRITE_FAILURES.with_label_values(&[backend]).inc();
}

pub fn record_read_error(kind: &str) {
    READ_ERRORS.with_label_values(&[kind]).inc();
}

pub fn set_resident_entries(backend: &str, count: usize) {
    RESIDENT_ENTRIES
        .with_label_values(&[backend])
        .set(count as f64);
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        record_load("memory", true);
        record_load("memory", false);
        record_eviction("size");
        record_merge("sqlite", 3, 0.002);
        record_secondary_write_failure("sqlite");
        record_read_error("cache_miss");
        set_resident_entries("memory", 12);

        let output = encode_metrics();
        assert!(output.contains("normcache_loads_total"));
        assert!(output.contains("normcache_merge_duration_seconds"));
        assert!(output.contains("normcache_evictions_total"));
    }
}
