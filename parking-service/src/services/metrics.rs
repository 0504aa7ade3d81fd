//! Metrics module for parking-service.
//! Provides Prometheus metrics for settlement operations and per-tenant metering.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec, register_int_counter_vec,
    CounterVec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "parking_db_query_duration_seconds",
            "Database query duration"
        ),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Session operations counter (per-tenant metering)
pub static SESSION_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Debt operations counter (per-tenant metering)
pub static DEBT_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Shift operations counter (per-tenant metering)
pub static SHIFT_OPERATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Payment amount counter by method (monetary tracking)
pub static PAYMENT_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    SESSION_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "parking_session_operations_total",
                "Total session operations by tenant and operation type"
            ),
            &["tenant_id", "operation"]
        )
        .expect("Failed to register SESSION_OPERATIONS_TOTAL")
    });

    DEBT_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "parking_debt_operations_total",
                "Total debt operations by tenant and operation type"
            ),
            &["tenant_id", "operation"]
        )
        .expect("Failed to register DEBT_OPERATIONS_TOTAL")
    });

    SHIFT_OPERATIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "parking_shift_operations_total",
                "Total shift operations by tenant and operation type"
            ),
            &["tenant_id", "operation"]
        )
        .expect("Failed to register SHIFT_OPERATIONS_TOTAL")
    });

    PAYMENT_AMOUNT_TOTAL.get_or_init(|| {
        register_counter_vec!(
            opts!(
                "parking_payment_amount_total",
                "Total payment amounts by tenant and method"
            ),
            &["tenant_id", "method"]
        )
        .expect("Failed to register PAYMENT_AMOUNT_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("parking_errors_total", "Total errors by code"),
            &["code"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });
}

/// Record a session operation for per-tenant metering.
pub fn record_session_operation(tenant_id: &str, operation: &str) {
    if let Some(counter) = SESSION_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, operation]).inc();
    }
}

/// Record a debt operation for per-tenant metering.
pub fn record_debt_operation(tenant_id: &str, operation: &str) {
    if let Some(counter) = DEBT_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, operation]).inc();
    }
}

/// Record a shift operation for per-tenant metering.
pub fn record_shift_operation(tenant_id: &str, operation: &str) {
    if let Some(counter) = SHIFT_OPERATIONS_TOTAL.get() {
        counter.with_label_values(&[tenant_id, operation]).inc();
    }
}

/// Record a collected payment amount.
pub fn record_payment_amount(tenant_id: &str, method: &str, amount: f64) {
    if let Some(counter) = PAYMENT_AMOUNT_TOTAL.get() {
        counter.with_label_values(&[tenant_id, method]).inc_by(amount);
    }
}

/// Record an error by stable code.
pub fn record_error(code: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[code]).inc();
    }
}

/// Gather all registered metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
