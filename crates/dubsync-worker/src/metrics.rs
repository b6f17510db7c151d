//! Prometheus metrics for the dubbing worker.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed (the binary installs the Prometheus one).

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // Timing
    pub const SEGMENTS_SCHEDULED_TOTAL: &str = "dubsync_segments_scheduled_total";
    pub const SEGMENT_DRIFT_SECONDS: &str = "dubsync_segment_drift_seconds";
    pub const PROBE_FAILURES_TOTAL: &str = "dubsync_probe_failures_total";

    // Rules
    pub const RULE_MUTATIONS_TOTAL: &str = "dubsync_rule_mutations_total";

    // Assembly
    pub const ASSEMBLIES_TOTAL: &str = "dubsync_assemblies_total";
    pub const ASSEMBLY_DURATION_SECONDS: &str = "dubsync_assembly_duration_seconds";
}

/// Record one placement decision (`synced`, `abandoned` or `natural`).
pub fn record_scheduled(outcome: &str, drift_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::SEGMENTS_SCHEDULED_TOTAL, &labels).increment(1);
    histogram!(names::SEGMENT_DRIFT_SECONDS).record(drift_secs);
}

/// Record a probe that fell back to the segment window.
pub fn record_probe_failure(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::PROBE_FAILURES_TOTAL, &labels).increment(1);
}

/// Record rules that mutated a segment or a text.
pub fn record_rule_mutation(kind: &str, count: u64) {
    let labels = [("kind", kind.to_string())];
    counter!(names::RULE_MUTATIONS_TOTAL, &labels).increment(count);
}

/// Record an assembly attempt.
pub fn record_assembly(strategy: &str, success: bool, duration_secs: f64) {
    let labels = [
        ("strategy", strategy.to_string()),
        ("outcome", if success { "success" } else { "failure" }.to_string()),
    ];
    counter!(names::ASSEMBLIES_TOTAL, &labels).increment(1);
    histogram!(names::ASSEMBLY_DURATION_SECONDS, &labels).record(duration_secs);
}
