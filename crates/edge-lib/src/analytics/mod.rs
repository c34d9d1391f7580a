//! Fleet analytics over per-device reading batches
//!
//! Each batch is analyzed on a bounded worker pool. The aggregator waits for
//! every submitted batch (join barrier) but collects results in completion
//! order. A batch that cannot be analyzed yields an explicit error result;
//! the number of outputs always equals the number of inputs.

mod batches;

pub use batches::{BatchSource, SimulatedBatchSource};

use crate::error::AggregationError;
use crate::forecast::should_trigger_preemptive;
use crate::models::{is_unit_interval, AnalysisResult, DeviceBatch, ForecastResult};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default number of concurrent analysis workers
pub const DEFAULT_WORKERS: usize = 4;

/// Thresholds applied to every batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyticsConfig {
    /// Average above which a device needs attention
    pub attention_avg_threshold: f64,
    /// Single reading above which a device needs attention
    pub attention_max_threshold: f64,
    /// Forecast risk above which pre-emptive cleaning is recommended
    pub dust_risk_threshold: f64,
    pub workers: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            attention_avg_threshold: 0.75,
            attention_max_threshold: 0.9,
            dust_risk_threshold: crate::forecast::DEFAULT_DUST_RISK_THRESHOLD,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Analyze one device batch
pub fn analyze_batch(
    batch: &DeviceBatch,
    forecast: Option<&ForecastResult>,
    config: &AnalyticsConfig,
) -> Result<AnalysisResult, AggregationError> {
    if batch.readings.is_empty() {
        return Err(AggregationError::EmptyBatch(batch.device_id.clone()));
    }

    let mut sum = 0.0;
    let mut max = f64::MIN;
    for reading in &batch.readings {
        if !is_unit_interval(reading.value) {
            return Err(AggregationError::ReadingOutOfRange {
                device_id: batch.device_id.clone(),
                value: reading.value,
            });
        }
        sum += reading.value;
        max = max.max(reading.value);
    }
    let avg = sum / batch.readings.len() as f64;

    Ok(AnalysisResult {
        device_id: batch.device_id.clone(),
        avg,
        max,
        needs_attention: avg > config.attention_avg_threshold
            || max > config.attention_max_threshold,
        preemptive_recommended: should_trigger_preemptive(forecast, config.dust_risk_threshold),
        timestamp: Utc::now(),
        error: None,
    })
}

/// Outputs of one aggregation run
#[derive(Debug, Clone)]
pub struct AggregationReport {
    /// One entry per submitted batch, in completion order
    pub results: Vec<AnalysisResult>,
    /// Sum of `avg` over successful results
    pub composite_metric: f64,
    pub elapsed_ms: u64,
}

impl AggregationReport {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    pub fn devices_needing_attention(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results
            .iter()
            .filter(|r| r.is_success() && r.needs_attention)
    }
}

/// Bounded fan-out/fan-in over device batches
#[derive(Debug, Clone)]
pub struct AnalyticsAggregator {
    config: AnalyticsConfig,
}

impl AnalyticsAggregator {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Analyze every batch and reduce successful results into the composite metric
    pub async fn run(
        &self,
        batches: Vec<DeviceBatch>,
        forecast: Option<ForecastResult>,
    ) -> AggregationReport {
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut pending: HashSet<String> = HashSet::with_capacity(batches.len());
        let mut workers = JoinSet::new();

        for batch in batches {
            pending.insert(batch.device_id.clone());
            let permits = permits.clone();
            let config = self.config;
            workers.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await;
                let outcome = analyze_batch(&batch, forecast.as_ref(), &config);
                (batch.device_id, outcome)
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((device_id, outcome)) => {
                    pending.remove(&device_id);
                    results.push(match outcome {
                        Ok(result) => {
                            debug!(
                                device_id = %result.device_id,
                                avg = result.avg,
                                max = result.max,
                                needs_attention = result.needs_attention,
                                "Device batch analyzed"
                            );
                            result
                        }
                        Err(e) => {
                            warn!(device_id = %device_id, error = %e, "Device batch rejected");
                            AnalysisResult::failed(device_id, e.to_string())
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Analysis worker aborted"),
            }
        }

        // Workers that panicked still owe an output
        for device_id in pending {
            let error = AggregationError::WorkerFailed(device_id.clone());
            results.push(AnalysisResult::failed(device_id, error.to_string()));
        }

        let composite_metric = composite_metric(&results);
        AggregationReport {
            results,
            composite_metric,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Sum of averages over successful results; order independent
pub fn composite_metric(results: &[AnalysisResult]) -> f64 {
    results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.avg)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reading;
    use proptest::prelude::*;

    fn batch(device_id: &str, values: &[f64]) -> DeviceBatch {
        DeviceBatch::new(
            device_id,
            values.iter().map(|v| Reading::new(*v).unwrap()).collect(),
        )
    }

    #[test]
    fn test_analyze_batch_example() {
        let result = analyze_batch(
            &batch("node_1", &[0.50, 0.60, 0.95]),
            None,
            &AnalyticsConfig::default(),
        )
        .unwrap();

        assert!((result.avg - 2.05 / 3.0).abs() < 1e-9);
        assert!(result.avg <= 0.75);
        assert_eq!(result.max, 0.95);
        // max over 0.9 alone flags the device
        assert!(result.needs_attention);
        assert!(!result.preemptive_recommended);
    }

    #[test]
    fn test_attention_from_average_only() {
        let result = analyze_batch(
            &batch("node_1", &[0.8, 0.8, 0.8]),
            None,
            &AnalyticsConfig::default(),
        )
        .unwrap();
        assert!(result.needs_attention);

        let calm = analyze_batch(
            &batch("node_2", &[0.5, 0.75, 0.9]),
            None,
            &AnalyticsConfig::default(),
        )
        .unwrap();
        assert!(!calm.needs_attention);
    }

    #[test]
    fn test_preemptive_requires_forecast_over_threshold() {
        let config = AnalyticsConfig::default();
        let b = batch("node_1", &[0.4]);

        let high = ForecastResult::measured(0.71);
        let at = ForecastResult::measured(0.7);

        assert!(analyze_batch(&b, Some(&high), &config).unwrap().preemptive_recommended);
        assert!(!analyze_batch(&b, Some(&at), &config).unwrap().preemptive_recommended);
        assert!(!analyze_batch(&b, None, &config).unwrap().preemptive_recommended);
    }

    #[test]
    fn test_empty_batch_is_error() {
        let result = analyze_batch(
            &DeviceBatch::new("node_9", vec![]),
            None,
            &AnalyticsConfig::default(),
        );
        assert_eq!(result, Err(AggregationError::EmptyBatch("node_9".into())));
    }

    #[test]
    fn test_out_of_range_reading_is_error() {
        let mut b = batch("node_1", &[0.2]);
        b.readings[0].value = 1.7;
        let result = analyze_batch(&b, None, &AnalyticsConfig::default());
        assert!(matches!(result, Err(AggregationError::ReadingOutOfRange { .. })));
    }

    #[tokio::test]
    async fn test_run_sums_successful_averages() {
        let aggregator = AnalyticsAggregator::new(AnalyticsConfig::default());
        let batches = vec![
            batch("node_1", &[0.20, 0.20]),
            batch("node_2", &[0.30]),
            batch("node_3", &[0.40, 0.40, 0.40]),
            DeviceBatch::new("node_4", vec![]),
        ];

        let report = aggregator.run(batches, None).await;

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.success_count(), 3);
        assert_eq!(report.error_count(), 1);
        assert!((report.composite_metric - 0.90).abs() < 1e-9);

        let failed = report.results.iter().find(|r| !r.is_success()).unwrap();
        assert_eq!(failed.device_id, "node_4");
        assert!(failed.error.as_ref().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_run_with_more_batches_than_workers() {
        let config = AnalyticsConfig {
            workers: 2,
            ..AnalyticsConfig::default()
        };
        let aggregator = AnalyticsAggregator::new(config);
        let batches: Vec<DeviceBatch> = (0..25)
            .map(|i| batch(&format!("node_{i}"), &[0.5, 0.5]))
            .collect();

        let report = aggregator.run(batches, None).await;

        assert_eq!(report.results.len(), 25);
        assert_eq!(report.error_count(), 0);
        assert!((report.composite_metric - 12.5).abs() < 1e-9);

        let mut ids: Vec<_> = report.results.iter().map(|r| r.device_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 25);
    }

    #[tokio::test]
    async fn test_run_empty_input() {
        let aggregator = AnalyticsAggregator::new(AnalyticsConfig::default());
        let report = aggregator.run(vec![], None).await;
        assert!(report.results.is_empty());
        assert_eq!(report.composite_metric, 0.0);
    }

    #[tokio::test]
    async fn test_zero_workers_still_progresses() {
        let config = AnalyticsConfig {
            workers: 0,
            ..AnalyticsConfig::default()
        };
        let report = AnalyticsAggregator::new(config)
            .run(vec![batch("node_1", &[0.1])], None)
            .await;
        assert_eq!(report.success_count(), 1);
    }

    fn arb_batches() -> impl Strategy<Value = Vec<Vec<f64>>> {
        proptest::collection::vec(proptest::collection::vec(0.0f64..=1.0, 0..12), 0..10)
    }

    proptest! {
        #[test]
        fn attention_matches_definition(values in proptest::collection::vec(0.0f64..=1.0, 1..50)) {
            let config = AnalyticsConfig::default();
            let result = analyze_batch(&batch("node", &values), None, &config).unwrap();

            let avg = values.iter().sum::<f64>() / values.len() as f64;
            let max = values.iter().cloned().fold(f64::MIN, f64::max);
            prop_assert_eq!(
                result.needs_attention,
                avg > config.attention_avg_threshold || max > config.attention_max_threshold
            );
            prop_assert!(result.avg >= 0.0 && result.avg <= 1.0 + 1e-12);
        }

        #[test]
        fn every_batch_yields_one_output(batches in arb_batches()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let input: Vec<DeviceBatch> = batches
                .iter()
                .enumerate()
                .map(|(i, values)| batch(&format!("node_{i}"), values))
                .collect();
            let empty = batches.iter().filter(|b| b.is_empty()).count();
            let expected_metric: f64 = batches
                .iter()
                .filter(|b| !b.is_empty())
                .map(|b| b.iter().sum::<f64>() / b.len() as f64)
                .sum();

            let report = runtime.block_on(
                AnalyticsAggregator::new(AnalyticsConfig::default()).run(input, None),
            );

            prop_assert_eq!(report.results.len(), batches.len());
            prop_assert_eq!(report.error_count(), empty);
            prop_assert!((report.composite_metric - expected_metric).abs() < 1e-9);
        }
    }
}
