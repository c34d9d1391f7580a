//! Observability for the edge node
//!
//! Provides:
//! - Prometheus metrics (ticks, readings, forecasts, missions, analytics, scaling)
//! - Structured JSON logging of well-known node events

use crate::models::{ForecastResult, MissionOutcome, MissionReason, ScalingDecision};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec, Gauge,
    Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Buckets for mission durations (seconds)
const MISSION_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 120.0];

/// Buckets for aggregation runs (seconds)
const AGGREGATION_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

static GLOBAL_METRICS: OnceLock<EdgeMetricsInner> = OnceLock::new();

struct EdgeMetricsInner {
    ticks: IntCounter,
    sensor_errors: IntCounter,
    soiling_level: Gauge,
    forecast_risk: Gauge,
    simulated_forecasts: IntCounter,
    missions: IntCounterVec,
    missions_rejected: IntCounter,
    mission_duration_seconds: Histogram,
    aggregation_latency_seconds: Histogram,
    device_errors: IntCounter,
    composite_metric: Gauge,
    recommended_replicas: Gauge,
    report_errors: IntCounter,
}

impl EdgeMetricsInner {
    fn new() -> Self {
        Self {
            ticks: register_int_counter!("edge_node_ticks_total", "Scheduler ticks executed")
                .expect("Failed to register ticks"),

            sensor_errors: register_int_counter!(
                "edge_node_sensor_errors_total",
                "Sensor reads that failed after retries"
            )
            .expect("Failed to register sensor_errors"),

            soiling_level: register_gauge!(
                "edge_node_soiling_level",
                "Most recent contamination reading"
            )
            .expect("Failed to register soiling_level"),

            forecast_risk: register_gauge!(
                "edge_node_forecast_risk",
                "Most recent normalized dust risk"
            )
            .expect("Failed to register forecast_risk"),

            simulated_forecasts: register_int_counter!(
                "edge_node_simulated_forecasts_total",
                "Forecasts served from the simulated fallback"
            )
            .expect("Failed to register simulated_forecasts"),

            missions: register_int_counter_vec!(
                "edge_node_missions_total",
                "Cleaning missions by reason and terminal status",
                &["reason", "status"]
            )
            .expect("Failed to register missions"),

            missions_rejected: register_int_counter!(
                "edge_node_missions_rejected_total",
                "Mission requests refused because another mission was in flight"
            )
            .expect("Failed to register missions_rejected"),

            mission_duration_seconds: register_histogram!(
                "edge_node_mission_duration_seconds",
                "Wall time of cleaning missions",
                MISSION_BUCKETS.to_vec()
            )
            .expect("Failed to register mission_duration_seconds"),

            aggregation_latency_seconds: register_histogram!(
                "edge_node_aggregation_latency_seconds",
                "Time spent analyzing a set of device batches",
                AGGREGATION_BUCKETS.to_vec()
            )
            .expect("Failed to register aggregation_latency_seconds"),

            device_errors: register_int_counter!(
                "edge_node_device_errors_total",
                "Device batches that could not be analyzed"
            )
            .expect("Failed to register device_errors"),

            composite_metric: register_gauge!(
                "edge_node_composite_metric",
                "Sum of average soiling over analyzed devices"
            )
            .expect("Failed to register composite_metric"),

            recommended_replicas: register_gauge!(
                "edge_node_recommended_replicas",
                "Replica count recommended for the compute tier"
            )
            .expect("Failed to register recommended_replicas"),

            report_errors: register_int_counter!(
                "edge_node_report_errors_total",
                "Cloud reports that could not be delivered"
            )
            .expect("Failed to register report_errors"),
        }
    }
}

/// Handle to the process-wide metrics; clones share the same metrics
#[derive(Clone)]
pub struct EdgeMetrics {
    inner: &'static EdgeMetricsInner,
}

impl Default for EdgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeMetrics {
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(EdgeMetricsInner::new),
        }
    }

    fn inner(&self) -> &EdgeMetricsInner {
        self.inner
    }

    pub fn inc_ticks(&self) {
        self.inner().ticks.inc();
    }

    pub fn inc_sensor_errors(&self) {
        self.inner().sensor_errors.inc();
    }

    pub fn set_soiling_level(&self, value: f64) {
        self.inner().soiling_level.set(value);
    }

    pub fn record_forecast(&self, forecast: &ForecastResult) {
        self.inner().forecast_risk.set(forecast.risk);
        if forecast.simulated {
            self.inner().simulated_forecasts.inc();
        }
    }

    pub fn record_mission(&self, outcome: &MissionOutcome) {
        self.inner()
            .missions
            .with_label_values(&[&outcome.reason.to_string(), outcome.status.as_str()])
            .inc();
        self.inner()
            .mission_duration_seconds
            .observe(outcome.duration_ms as f64 / 1000.0);
    }

    pub fn inc_missions_rejected(&self) {
        self.inner().missions_rejected.inc();
    }

    pub fn observe_aggregation(&self, elapsed_ms: u64, device_errors: usize) {
        self.inner()
            .aggregation_latency_seconds
            .observe(elapsed_ms as f64 / 1000.0);
        self.inner().device_errors.inc_by(device_errors as u64);
    }

    pub fn record_scaling(&self, decision: &ScalingDecision) {
        self.inner().composite_metric.set(decision.metric);
        self.inner()
            .recommended_replicas
            .set(decision.replica_count as f64);
    }

    pub fn inc_report_errors(&self) {
        self.inner().report_errors.inc();
    }

    pub fn ticks(&self) -> u64 {
        self.inner().ticks.get()
    }
}

/// Structured logger for node events
#[derive(Clone)]
pub struct StructuredLogger {
    node_id: String,
}

impl StructuredLogger {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn log_startup(&self, version: &str, forecast_source: &str, reporter: &str) {
        info!(
            event = "node_started",
            node = %self.node_id,
            version = %version,
            forecast_source = %forecast_source,
            reporter = %reporter,
            "Edge node started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "node_shutdown",
            node = %self.node_id,
            reason = %reason,
            "Edge node shutting down"
        );
    }

    pub fn log_trigger(&self, cycle: u64, reason: MissionReason, value: f64, threshold: f64) {
        warn!(
            event = "cleaning_triggered",
            node = %self.node_id,
            cycle,
            reason = %reason,
            value,
            threshold,
            "Cleaning threshold exceeded"
        );
    }

    pub fn log_mission(&self, outcome: &MissionOutcome) {
        if outcome.status.is_success() {
            info!(
                event = "mission_finished",
                node = %self.node_id,
                reason = %outcome.reason,
                status = %outcome.status,
                duration_ms = outcome.duration_ms,
                "Cleaning mission completed"
            );
        } else {
            warn!(
                event = "mission_finished",
                node = %self.node_id,
                reason = %outcome.reason,
                status = %outcome.status,
                phase = %outcome.phase_reached,
                detail = ?outcome.detail,
                duration_ms = outcome.duration_ms,
                "Cleaning mission failed"
            );
        }
    }

    pub fn log_analytics(
        &self,
        cycle: u64,
        devices: usize,
        errors: usize,
        attention: usize,
        composite_metric: f64,
    ) {
        info!(
            event = "analytics_completed",
            node = %self.node_id,
            cycle,
            devices,
            errors,
            needs_attention = attention,
            composite_metric,
            "Fleet analytics completed"
        );
    }

    pub fn log_scaling(&self, cycle: u64, decision: &ScalingDecision) {
        info!(
            event = "scaling_decided",
            node = %self.node_id,
            cycle,
            metric = decision.metric,
            threshold = decision.threshold,
            replicas = decision.replica_count,
            "Scaling recommendation computed"
        );
    }
}
