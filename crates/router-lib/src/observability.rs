//! Observability infrastructure for the router
//!
//! Provides:
//! - Prometheus metrics (request outcomes and latency, bootstrap attempts,
//!   probe rounds, sampler throughput and store size)
//! - Structured logging of lifecycle events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Request latency buckets in seconds; model round trips dominate
const REQUEST_LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RouterMetricsInner> = OnceLock::new();

struct RouterMetricsInner {
    requests: IntCounterVec,
    request_latency_seconds: Histogram,
    bootstrap_attempts: IntCounter,
    bootstrap_failures: IntCounterVec,
    agent_generation: IntGauge,
    tools_discovered: IntGauge,
    probe_rounds: IntCounter,
    samples_recorded: IntCounter,
    sample_errors: IntCounter,
    store_samples: IntGauge,
}

impl RouterMetricsInner {
    fn new() -> Self {
        Self {
            requests: register_int_counter_vec!(
                "tool_router_requests_total",
                "Chat requests served, by outcome",
                &["outcome"]
            )
            .expect("Failed to register requests_total"),

            request_latency_seconds: register_histogram!(
                "tool_router_request_latency_seconds",
                "End-to-end latency of chat requests",
                REQUEST_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register request_latency_seconds"),

            bootstrap_attempts: register_int_counter!(
                "tool_router_bootstrap_attempts_total",
                "Bootstrap sequences started"
            )
            .expect("Failed to register bootstrap_attempts"),

            bootstrap_failures: register_int_counter_vec!(
                "tool_router_bootstrap_failures_total",
                "Bootstrap sequences that failed, by error kind",
                &["kind"]
            )
            .expect("Failed to register bootstrap_failures"),

            agent_generation: register_int_gauge!(
                "tool_router_agent_generation",
                "Generation of the currently published agent (0 = none)"
            )
            .expect("Failed to register agent_generation"),

            tools_discovered: register_int_gauge!(
                "tool_router_tools_discovered",
                "Number of tools bound to the published agent"
            )
            .expect("Failed to register tools_discovered"),

            probe_rounds: register_int_counter!(
                "tool_router_probe_rounds_total",
                "Readiness probe rounds across all endpoints"
            )
            .expect("Failed to register probe_rounds"),

            samples_recorded: register_int_counter!(
                "tool_router_samples_recorded_total",
                "Utilization samples appended to the rolling store"
            )
            .expect("Failed to register samples_recorded"),

            sample_errors: register_int_counter!(
                "tool_router_sample_errors_total",
                "Utilization reads that failed and were skipped"
            )
            .expect("Failed to register sample_errors"),

            store_samples: register_int_gauge!(
                "tool_router_store_samples",
                "Samples currently retained in the rolling store"
            )
            .expect("Failed to register store_samples"),
        }
    }
}

/// Router metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RouterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RouterMetricsInner {
        GLOBAL_METRICS.get_or_init(RouterMetricsInner::new)
    }

    /// Count a served request; outcome is `reply`, `initializing` or `error`
    pub fn observe_request(&self, outcome: &str, duration_secs: f64) {
        self.inner().requests.with_label_values(&[outcome]).inc();
        self.inner().request_latency_seconds.observe(duration_secs);
    }

    pub fn inc_bootstrap_attempts(&self) {
        self.inner().bootstrap_attempts.inc();
    }

    pub fn inc_bootstrap_failures(&self, kind: &str) {
        self.inner().bootstrap_failures.with_label_values(&[kind]).inc();
    }

    pub fn set_agent_generation(&self, generation: u64, tools: usize) {
        self.inner().agent_generation.set(generation as i64);
        self.inner().tools_discovered.set(tools as i64);
    }

    pub fn inc_probe_rounds(&self) {
        self.inner().probe_rounds.inc();
    }

    pub fn inc_samples_recorded(&self) {
        self.inner().samples_recorded.inc();
    }

    pub fn inc_sample_errors(&self) {
        self.inner().sample_errors.inc();
    }

    pub fn set_store_samples(&self, count: i64) {
        self.inner().store_samples.set(count);
    }
}

/// Structured logger for router lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, backends: &[String]) {
        info!(
            event = "router_started",
            service = %self.service,
            version = %version,
            backends = ?backends,
            "Tool router started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "router_shutdown",
            service = %self.service,
            reason = %reason,
            "Tool router shutting down"
        );
    }

    pub fn log_agent_published(&self, generation: u64, model: &str, tools: &[String]) {
        info!(
            event = "agent_published",
            service = %self.service,
            generation = generation,
            model = %model,
            tool_count = tools.len(),
            tools = ?tools,
            "Agent published"
        );
    }

    pub fn log_bootstrap_failure(&self, attempt: u64, kind: &str, error: &str, fatal: bool) {
        if fatal {
            error!(
                event = "bootstrap_aborted",
                service = %self.service,
                attempt = attempt,
                kind = %kind,
                error = %error,
                "Bootstrap aborted by a non-retryable error"
            );
        } else {
            warn!(
                event = "bootstrap_attempt_failed",
                service = %self.service,
                attempt = attempt,
                kind = %kind,
                error = %error,
                "Bootstrap attempt failed, restarting after cool-down"
            );
        }
    }
}
