//! Prometheus metrics for the monitoring engine
//!
//! - `watchkeeper_checks_issued_total` (counter) - Check requests by kind
//! - `watchkeeper_results_total` (counter) - Results by source and outcome
//! - `watchkeeper_state_changes_total` (counter) - State changes by type
//! - `watchkeeper_notifications_total` (counter) - Committed notifications by kind
//! - `watchkeeper_notifications_suppressed_total` (counter) - Suppressions by reason
//! - `watchkeeper_dispatches_total` (counter) - Per-contact dispatches
//! - `watchkeeper_commands_total` (counter) - External commands by verb and result
//! - `watchkeeper_listener_failures_total` (counter) - Failed event deliveries
//! - `watchkeeper_outstanding_checks` (gauge) - Checks awaiting a result
//! - `watchkeeper_scheduled_checkables` (gauge) - Entries in the schedule

use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use super::{Result, TelemetryError};

/// Engine metrics for Prometheus
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Arc<Registry>,

    /// Check requests issued (by kind)
    checks_issued_total: CounterVec,

    /// Results received (by source, outcome)
    results_total: CounterVec,

    /// State changes (by state_type)
    state_changes_total: CounterVec,

    /// Committed notifications (by kind)
    notifications_total: CounterVec,

    /// Suppressed evaluations (by reason)
    notifications_suppressed_total: CounterVec,

    /// Dispatches handed to listeners
    dispatches_total: Counter,

    /// External commands (by verb, result)
    commands_total: CounterVec,

    /// Listener delivery failures
    listener_failures_total: Counter,

    /// Outstanding checks
    outstanding_checks: Gauge,

    /// Scheduled checkables
    scheduled_checkables: Gauge,
}

impl EngineMetrics {
    /// Create metrics registered with a fresh registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create metrics and register them with the provided registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let checks_issued_total = CounterVec::new(
            Opts::new("checks_issued_total", "Total number of check requests issued")
                .namespace("watchkeeper"),
            &["kind"],
        )?;

        let results_total = CounterVec::new(
            Opts::new("results_total", "Total number of check results received")
                .namespace("watchkeeper"),
            &["source", "outcome"],
        )?;

        let state_changes_total = CounterVec::new(
            Opts::new("state_changes_total", "Total number of state change events")
                .namespace("watchkeeper"),
            &["state_type"],
        )?;

        let notifications_total = CounterVec::new(
            Opts::new("notifications_total", "Total number of committed notifications")
                .namespace("watchkeeper"),
            &["kind"],
        )?;

        let notifications_suppressed_total = CounterVec::new(
            Opts::new(
                "notifications_suppressed_total",
                "Total number of suppressed notification evaluations",
            )
            .namespace("watchkeeper"),
            &["reason"],
        )?;

        let dispatches_total = Counter::new(
            "watchkeeper_dispatches_total",
            "Total number of per-contact notification dispatches",
        )?;

        let commands_total = CounterVec::new(
            Opts::new("commands_total", "Total number of external commands processed")
                .namespace("watchkeeper"),
            &["verb", "result"],
        )?;

        let listener_failures_total = Counter::new(
            "watchkeeper_listener_failures_total",
            "Total number of failed event deliveries",
        )?;

        let outstanding_checks = Gauge::new(
            "watchkeeper_outstanding_checks",
            "Number of checks awaiting a result",
        )?;

        let scheduled_checkables = Gauge::new(
            "watchkeeper_scheduled_checkables",
            "Number of checkables in the schedule",
        )?;

        registry.register(Box::new(checks_issued_total.clone()))?;
        registry.register(Box::new(results_total.clone()))?;
        registry.register(Box::new(state_changes_total.clone()))?;
        registry.register(Box::new(notifications_total.clone()))?;
        registry.register(Box::new(notifications_suppressed_total.clone()))?;
        registry.register(Box::new(dispatches_total.clone()))?;
        registry.register(Box::new(commands_total.clone()))?;
        registry.register(Box::new(listener_failures_total.clone()))?;
        registry.register(Box::new(outstanding_checks.clone()))?;
        registry.register(Box::new(scheduled_checkables.clone()))?;

        Ok(Self {
            registry,
            checks_issued_total,
            results_total,
            state_changes_total,
            notifications_total,
            notifications_suppressed_total,
            dispatches_total,
            commands_total,
            listener_failures_total,
            outstanding_checks,
            scheduled_checkables,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn record_check_issued(&self, kind: &str) {
        self.checks_issued_total.with_label_values(&[kind]).inc();
    }

    /// Record a result; outcome is `applied` or a stale reason
    pub fn record_result(&self, source: &str, outcome: &str) {
        self.results_total.with_label_values(&[source, outcome]).inc();
    }

    pub fn record_state_change(&self, state_type: &str) {
        self.state_changes_total.with_label_values(&[state_type]).inc();
    }

    pub fn record_notification(&self, kind: &str, dispatches: usize) {
        self.notifications_total.with_label_values(&[kind]).inc();
        self.dispatches_total.inc_by(dispatches as f64);
    }

    pub fn record_suppressed(&self, reason: &str) {
        self.notifications_suppressed_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_command(&self, verb: &str, success: bool) {
        let result = if success { "ok" } else { "error" };
        self.commands_total.with_label_values(&[verb, result]).inc();
    }

    pub fn record_listener_failures(&self, failures: usize) {
        if failures > 0 {
            self.listener_failures_total.inc_by(failures as f64);
        }
    }

    pub fn set_outstanding(&self, count: usize) {
        self.outstanding_checks.set(count as f64);
    }

    pub fn set_scheduled(&self, count: usize) {
        self.scheduled_checkables.set(count as f64);
    }

    /// Render every registered metric in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::EncodingFailed(e.to_string()))
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = EngineMetrics::new();
        assert!(metrics.is_ok());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        EngineMetrics::with_registry(Arc::clone(&registry)).unwrap();
        assert!(EngineMetrics::with_registry(registry).is_err());
    }

    #[test]
    fn test_encode_contains_recorded_values() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.record_check_issued("service");
        metrics.record_result("active", "applied");
        metrics.record_command("DISABLE_HOST_CHECK", true);
        metrics.record_notification("problem", 2);
        metrics.set_outstanding(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("watchkeeper_checks_issued_total{kind=\"service\"} 1"));
        assert!(text.contains("watchkeeper_dispatches_total 2"));
        assert!(text.contains("watchkeeper_outstanding_checks 3"));
        assert!(text.contains("verb=\"DISABLE_HOST_CHECK\""));
    }
}
