//! Prometheus metrics for portal observability.

use metrics::{counter, gauge};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a login attempt outcome (`success`, `invalid`, `locked`, `disabled`).
pub fn login_attempt(outcome: &'static str) {
    counter!("portal_logins_total", "outcome" => outcome).increment(1);
}

/// Record a request rejected by the rate limiter.
pub fn rate_limited(scope: &str) {
    counter!("portal_rate_limited_total", "scope" => scope.to_string()).increment(1);
}

/// Record a state-changing request rejected for a missing or bad CSRF token.
pub fn csrf_rejected() {
    counter!("portal_csrf_rejections_total").increment(1);
}

/// Record a completed purchase.
pub fn purchase_completed() {
    counter!("portal_purchases_total").increment(1);
}

/// Record delivered notifications per channel.
pub fn notifications_sent(channel: &str, count: u64) {
    counter!("portal_notifications_sent_total", "channel" => channel.to_string()).increment(count);
}

/// Record a workflow execution.
pub fn workflow_run(trigger: &str) {
    counter!("portal_workflow_runs_total", "trigger" => trigger.to_string()).increment(1);
}

/// Set the number of unexpired sessions.
pub fn active_sessions(count: i64) {
    gauge!("portal_active_sessions").set(count as f64);
}
