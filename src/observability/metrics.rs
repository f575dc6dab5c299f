//! # Metrics
//!
//! Prometheus metrics for the daemon's two hot paths: the synchronous fetch
//! driver (C5) and the rotation engine (C6).

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static FETCHES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("secret_sync_fetches_total", "Total number of fetch requests served")
        .expect("failed to create FETCHES_TOTAL metric")
});

static FETCH_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("secret_sync_fetch_errors_total", "Total number of failed fetch requests by kind"),
        &["kind"],
    )
    .expect("failed to create FETCH_ERRORS_TOTAL metric")
});

static FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new("secret_sync_fetch_duration_seconds", "Duration of fetch requests in seconds")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("failed to create FETCH_DURATION metric")
});

static ROTATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("secret_sync_rotations_total", "Total number of successful secret rotations")
        .expect("failed to create ROTATIONS_TOTAL metric")
});

static ROTATION_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("secret_sync_rotation_failures_total", "Total number of failed rotation attempts")
        .expect("failed to create ROTATION_FAILURES_TOTAL metric")
});

static ROTATION_TICK_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new("secret_sync_rotation_tick_duration_seconds", "Duration of one rotation tick")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
    )
    .expect("failed to create ROTATION_TICK_DURATION metric")
});

static TRACKED_SECRETS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("secret_sync_tracked_secrets", "Current number of records in the tracking registry")
        .expect("failed to create TRACKED_SECRETS metric")
});

static PROVIDER_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "secret_sync_provider_operation_duration_seconds",
            "Duration of provider operations in seconds by provider type",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["provider"],
    )
    .expect("failed to create PROVIDER_OPERATION_DURATION metric")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(FETCHES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(ROTATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ROTATION_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ROTATION_TICK_DURATION.clone()))?;
    REGISTRY.register(Box::new(TRACKED_SECRETS.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_DURATION.clone()))?;
    Ok(())
}

pub fn increment_fetches() {
    FETCHES_TOTAL.inc();
}

pub fn increment_fetch_errors(kind: &str) {
    FETCH_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_fetch_duration(seconds: f64) {
    FETCH_DURATION.observe(seconds);
}

pub fn increment_rotations() {
    ROTATIONS_TOTAL.inc();
}

pub fn increment_rotation_failures() {
    ROTATION_FAILURES_TOTAL.inc();
}

pub fn observe_rotation_tick_duration(seconds: f64) {
    ROTATION_TICK_DURATION.observe(seconds);
}

pub fn set_tracked_secrets(count: i64) {
    TRACKED_SECRETS.set(count);
}

pub fn observe_provider_operation_duration(provider: &str, seconds: f64) {
    PROVIDER_OPERATION_DURATION.with_label_values(&[provider]).observe(seconds);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_without_error() {
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn fetches_counter_increments() {
        let before = FETCHES_TOTAL.get();
        increment_fetches();
        assert_eq!(FETCHES_TOTAL.get(), before + 1);
    }

    #[test]
    fn tracked_secrets_gauge_reflects_last_set_value() {
        set_tracked_secrets(3);
        assert_eq!(TRACKED_SECRETS.get(), 3);
        set_tracked_secrets(7);
        assert_eq!(TRACKED_SECRETS.get(), 7);
    }

    #[test]
    fn fetch_errors_counted_by_kind() {
        let before = FETCH_ERRORS_TOTAL.with_label_values(&["timeout"]).get();
        increment_fetch_errors("timeout");
        assert_eq!(FETCH_ERRORS_TOTAL.with_label_values(&["timeout"]).get(), before + 1);
    }
}
