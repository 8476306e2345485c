//! Metrics registry and helpers.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register all metric descriptions.
pub fn register_metrics() {
    // Counters
    describe_counter!("conveyor_jobs_created_total", "Total number of jobs created");
    describe_counter!(
        "conveyor_jobs_completed_total",
        "Total number of jobs that reached the completed state"
    );
    describe_counter!(
        "conveyor_jobs_failed_total",
        "Total number of jobs that reached the failed state"
    );
    describe_counter!("conveyor_jobs_deleted_total", "Total number of jobs deleted");
    describe_counter!(
        "conveyor_items_processed_total",
        "Total number of payload items processed"
    );
    describe_counter!(
        "conveyor_dispatches_total",
        "Total number of outbound self-trigger requests"
    );
    describe_counter!(
        "conveyor_healthcheck_ticks_total",
        "Total number of health-check interval firings"
    );
    describe_counter!("conveyor_errors_total", "Total number of errors");

    // Gauges
    describe_gauge!(
        "conveyor_queue_depth",
        "Number of non-terminal jobs in the queue"
    );

    // Histograms
    describe_histogram!(
        "conveyor_invocation_duration_seconds",
        "Duration of a single worker invocation"
    );
}

/// Record a completed worker invocation.
pub fn record_invocation(handler: &str, items: u64, duration_secs: f64) {
    counter!("conveyor_items_processed_total", "handler" => handler.to_string())
        .increment(items);
    histogram!("conveyor_invocation_duration_seconds", "handler" => handler.to_string())
        .record(duration_secs);
}

/// Record an outbound self-trigger attempt.
pub fn record_dispatch(handler: &str, ok: bool) {
    counter!(
        "conveyor_dispatches_total",
        "handler" => handler.to_string(),
        "outcome" => if ok { "ok" } else { "failed" },
    )
    .increment(1);
}

/// Record a health-check interval firing.
pub fn record_healthcheck_tick(handler: &str) {
    counter!("conveyor_healthcheck_ticks_total", "handler" => handler.to_string()).increment(1);
}

/// Update the queue depth gauge for a handler.
pub fn set_queue_depth(handler: &str, depth: u64) {
    gauge!("conveyor_queue_depth", "handler" => handler.to_string()).set(depth as f64);
}
