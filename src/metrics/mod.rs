//! Metrics module for the submission service.
//!
//! - This module contains the global Prometheus registry.
//! - Defines the transaction lifecycle metrics recorded by the observer.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

lazy_static! {
    // Global Prometheus registry.
    pub static ref REGISTRY: Registry = Registry::new();

    // Counter: transaction lifecycle events by type and event label.
    pub static ref TRANSACTION_EVENTS: CounterVec = {
        let opts = Opts::new("tss_transaction_events_total", "Total number of transaction lifecycle events");
        let counter_vec = CounterVec::new(opts, &["transaction_type", "event"]).unwrap();
        REGISTRY.register(Box::new(counter_vec.clone())).unwrap();
        counter_vec
    };

    // Histogram: time from transaction creation to a terminal outcome.
    pub static ref TRANSACTION_PROCESSING_SECONDS: HistogramVec = {
        let histogram_opts = HistogramOpts::new(
            "tss_transaction_processing_seconds",
            "Seconds from transaction creation until it is processed",
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0]);
        let histogram_vec =
            HistogramVec::new(histogram_opts, &["transaction_type", "outcome"]).unwrap();
        REGISTRY.register(Box::new(histogram_vec.clone())).unwrap();
        histogram_vec
    };

    // Counter: reconciliations that ended with an unexpected error.
    pub static ref RECONCILIATION_ERRORS: CounterVec = {
        let opts = Opts::new("tss_reconciliation_errors_total", "Total number of unexpected reconciliation errors");
        let counter_vec = CounterVec::new(opts, &["transaction_type"]).unwrap();
        REGISTRY.register(Box::new(counter_vec.clone())).unwrap();
        counter_vec
    };

    // Counter: errors handed to the crash tracker.
    pub static ref CRASH_REPORTS: CounterVec = {
        let opts = Opts::new("tss_crash_reports_total", "Total number of errors reported to the crash tracker");
        let counter_vec = CounterVec::new(opts, &["source"]).unwrap();
        REGISTRY.register(Box::new(counter_vec.clone())).unwrap();
        counter_vec
    };
}

/// Gather all metrics and encode into the provided format.
pub fn gather_metrics() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}
