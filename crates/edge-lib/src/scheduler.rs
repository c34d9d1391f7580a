//! Periodic orchestration loop
//!
//! Each tick reads the sensor, evaluates the reactive trigger, queries the
//! forecast, evaluates the predictive trigger and, on report cycles, runs
//! fleet analytics, scaling and the cloud report. Every failure inside a
//! tick is logged and contained; the next tick is always scheduled.

use crate::analytics::{AnalyticsAggregator, AnalyticsConfig, BatchSource, SimulatedBatchSource};
use crate::error::MissionError;
use crate::forecast::{should_trigger_preemptive, ForecastSource, DEFAULT_DUST_RISK_THRESHOLD};
use crate::health::{components, HealthRegistry};
use crate::mission::MissionController;
use crate::models::{
    CycleReport, ForecastResult, MissionOutcome, MissionReason, MissionRequest, Reading,
};
use crate::observability::{EdgeMetrics, StructuredLogger};
use crate::report::{CloudReporter, LogReporter};
use crate::scaling::ScalingAdvisor;
use crate::sensor::SensorSource;
use crate::shutdown::ShutdownCoordinator;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the orchestration loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub node_id: String,
    /// Wait between the end of one tick and the start of the next
    pub poll_interval: Duration,
    /// Reactive trigger, fires when `reading >= soiling_threshold`
    pub soiling_threshold: f64,
    /// Predictive trigger, fires when `risk > dust_risk_threshold`
    pub dust_risk_threshold: f64,
    /// Analytics and cloud reporting run when `cycle % report_every == 0`
    pub report_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            node_id: "edge-node".to_string(),
            poll_interval: Duration::from_secs(10),
            soiling_threshold: 0.7,
            dust_risk_threshold: DEFAULT_DUST_RISK_THRESHOLD,
            report_every: 5,
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub cycle: u64,
    pub reading: Option<Reading>,
    pub forecast: Option<ForecastResult>,
    pub missions: Vec<MissionOutcome>,
    /// Mission requests refused because another mission was in flight
    pub missions_rejected: usize,
    /// Present on report cycles
    pub report: Option<CycleReport>,
    pub report_delivered: bool,
}

/// The orchestration loop and everything it drives
pub struct CycleScheduler {
    config: SchedulerConfig,
    sensor: Arc<dyn SensorSource>,
    forecast: Arc<dyn ForecastSource>,
    controller: Arc<MissionController>,
    aggregator: AnalyticsAggregator,
    batches: Arc<dyn BatchSource>,
    advisor: ScalingAdvisor,
    reporter: Arc<dyn CloudReporter>,
    metrics: EdgeMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl CycleScheduler {
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Tick until shutdown is requested; returns the number of ticks run
    pub async fn run(self, shutdown: ShutdownCoordinator) -> u64 {
        info!(
            interval_secs = self.config.poll_interval.as_secs_f64(),
            report_every = self.config.report_every,
            "Starting orchestration loop"
        );

        let mut cycle = 0u64;
        loop {
            if shutdown.is_stopping() {
                info!(cycles = cycle, "Terminating scheduler");
                break;
            }

            let started = Instant::now();
            let summary = self.tick(cycle).await;
            debug!(
                cycle,
                elapsed_ms = started.elapsed().as_millis() as u64,
                missions = summary.missions.len(),
                reported = summary.report_delivered,
                "Tick complete"
            );
            cycle += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.stopped() => {}
            }
        }
        cycle
    }

    /// Run one full cycle; never fails
    pub async fn tick(&self, cycle: u64) -> TickSummary {
        self.metrics.inc_ticks();
        let mut summary = TickSummary {
            cycle,
            ..Default::default()
        };

        summary.reading = self.read_sensor(cycle).await;
        if let Some(reading) = &summary.reading {
            if reading.value >= self.config.soiling_threshold {
                self.logger.log_trigger(
                    cycle,
                    MissionReason::Soiling,
                    reading.value,
                    self.config.soiling_threshold,
                );
                self.dispatch(MissionReason::Soiling, &mut summary).await;
            }
        }

        summary.forecast = self.query_forecast(cycle).await;
        if should_trigger_preemptive(summary.forecast.as_ref(), self.config.dust_risk_threshold) {
            let risk = summary.forecast.as_ref().map(|f| f.risk).unwrap_or_default();
            self.logger.log_trigger(
                cycle,
                MissionReason::Predictive,
                risk,
                self.config.dust_risk_threshold,
            );
            self.dispatch(MissionReason::Predictive, &mut summary).await;
        }

        if self.config.report_every > 0 && cycle % self.config.report_every == 0 {
            let report = self.build_report(cycle, &summary).await;
            summary.report_delivered = self.deliver(&report).await;
            summary.report = Some(report);
        }

        summary
    }

    async fn read_sensor(&self, cycle: u64) -> Option<Reading> {
        match self.sensor.read().await {
            Ok(reading) => {
                info!(cycle, soiling = reading.value, "Sensor reading");
                self.metrics.set_soiling_level(reading.value);
                self.health.set_healthy(components::SENSOR).await;
                Some(reading)
            }
            Err(e) => {
                warn!(cycle, error = %e, "Sensor read failed, skipping reactive check");
                self.metrics.inc_sensor_errors();
                self.health
                    .set_unhealthy(components::SENSOR, e.to_string())
                    .await;
                None
            }
        }
    }

    async fn query_forecast(&self, cycle: u64) -> Option<ForecastResult> {
        match self.forecast.forecast().await {
            Ok(forecast) => {
                debug!(
                    cycle,
                    risk = forecast.risk,
                    simulated = forecast.simulated,
                    source = self.forecast.name(),
                    "Forecast received"
                );
                self.metrics.record_forecast(&forecast);
                if forecast.simulated && self.forecast.name() != "simulated" {
                    self.health
                        .set_degraded(components::FORECAST, "Serving simulated dust risk")
                        .await;
                } else {
                    self.health.set_healthy(components::FORECAST).await;
                }
                Some(forecast)
            }
            Err(e) => {
                warn!(cycle, error = %e, "Forecast unavailable, predictive check skipped");
                self.health
                    .set_degraded(components::FORECAST, e.to_string())
                    .await;
                None
            }
        }
    }

    async fn dispatch(&self, reason: MissionReason, summary: &mut TickSummary) {
        match self.controller.start_mission(MissionRequest::new(reason)).await {
            Ok(outcome) => {
                self.metrics.record_mission(&outcome);
                self.logger.log_mission(&outcome);
                if outcome.status.is_success() {
                    self.health.set_healthy(components::MISSION).await;
                } else {
                    self.health
                        .set_degraded(
                            components::MISSION,
                            format!("Last mission ended with {}", outcome.status),
                        )
                        .await;
                }
                summary.missions.push(outcome);
            }
            Err(MissionError::Busy) => {
                self.metrics.inc_missions_rejected();
                summary.missions_rejected += 1;
            }
            Err(e @ MissionError::ShutDown) => {
                warn!(cycle = summary.cycle, reason = %reason, error = %e, "Mission not started");
            }
        }
    }

    async fn build_report(&self, cycle: u64, summary: &TickSummary) -> CycleReport {
        let batches = match self.batches.fetch_batches().await {
            Ok(batches) => batches,
            Err(e) => {
                warn!(cycle, error = %e, "Device batches unavailable");
                self.health
                    .set_degraded(components::ANALYTICS, e.to_string())
                    .await;
                Vec::new()
            }
        };
        let fetched = batches.len();

        let aggregation = self.aggregator.run(batches, summary.forecast).await;
        let errors = aggregation.error_count();
        self.metrics.observe_aggregation(aggregation.elapsed_ms, errors);
        self.logger.log_analytics(
            cycle,
            aggregation.results.len(),
            errors,
            aggregation.devices_needing_attention().count(),
            aggregation.composite_metric,
        );
        if fetched > 0 {
            if errors == 0 {
                self.health.set_healthy(components::ANALYTICS).await;
            } else {
                self.health
                    .set_degraded(
                        components::ANALYTICS,
                        format!("{errors} of {fetched} device batches failed"),
                    )
                    .await;
            }
        }

        let scaling = self.advisor.advise(aggregation.composite_metric);
        self.metrics.record_scaling(&scaling);
        self.logger.log_scaling(cycle, &scaling);

        CycleReport {
            node_id: self.logger.node_id().to_string(),
            cycle,
            reading: summary.reading,
            forecast: summary.forecast,
            composite_metric: aggregation.composite_metric,
            devices: aggregation.results,
            scaling,
            generated_at: Utc::now(),
        }
    }

    async fn deliver(&self, report: &CycleReport) -> bool {
        match self.reporter.report(report).await {
            Ok(()) => {
                self.health.set_healthy(components::REPORTER).await;
                true
            }
            Err(e) => {
                warn!(
                    cycle = report.cycle,
                    sink = self.reporter.name(),
                    error = %e,
                    "Cloud report failed"
                );
                self.metrics.inc_report_errors();
                self.health
                    .set_degraded(components::REPORTER, e.to_string())
                    .await;
                false
            }
        }
    }
}

/// Builder for the orchestration loop
pub struct CycleSchedulerBuilder {
    config: SchedulerConfig,
    sensor: Option<Arc<dyn SensorSource>>,
    forecast: Option<Arc<dyn ForecastSource>>,
    controller: Option<Arc<MissionController>>,
    analytics: AnalyticsConfig,
    batches: Option<Arc<dyn BatchSource>>,
    advisor: ScalingAdvisor,
    reporter: Option<Arc<dyn CloudReporter>>,
    health: Option<HealthRegistry>,
}

impl CycleSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            sensor: None,
            forecast: None,
            controller: None,
            analytics: AnalyticsConfig::default(),
            batches: None,
            advisor: ScalingAdvisor::default(),
            reporter: None,
            health: None,
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sensor(mut self, sensor: Arc<dyn SensorSource>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn forecast(mut self, forecast: Arc<dyn ForecastSource>) -> Self {
        self.forecast = Some(forecast);
        self
    }

    pub fn controller(mut self, controller: Arc<MissionController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.analytics = analytics;
        self
    }

    /// Defaults to a simulated fleet of four devices
    pub fn batches(mut self, batches: Arc<dyn BatchSource>) -> Self {
        self.batches = Some(batches);
        self
    }

    pub fn advisor(mut self, advisor: ScalingAdvisor) -> Self {
        self.advisor = advisor;
        self
    }

    /// Defaults to the log-only reporter
    pub fn reporter(mut self, reporter: Arc<dyn CloudReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<CycleScheduler> {
        let sensor = self
            .sensor
            .ok_or_else(|| anyhow::anyhow!("Sensor is required"))?;
        let forecast = self
            .forecast
            .ok_or_else(|| anyhow::anyhow!("Forecast source is required"))?;
        let controller = self
            .controller
            .ok_or_else(|| anyhow::anyhow!("Mission controller is required"))?;
        if self.config.report_every == 0 {
            anyhow::bail!("Report frequency must be positive");
        }

        Ok(CycleScheduler {
            logger: StructuredLogger::new(self.config.node_id.clone()),
            config: self.config,
            sensor,
            forecast,
            controller,
            aggregator: AnalyticsAggregator::new(self.analytics),
            batches: self
                .batches
                .unwrap_or_else(|| Arc::new(SimulatedBatchSource::new(4, 12))),
            advisor: self.advisor,
            reporter: self.reporter.unwrap_or_else(|| Arc::new(LogReporter)),
            metrics: EdgeMetrics::new(),
            health: self.health.unwrap_or_default(),
        })
    }
}

impl Default for CycleSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
