//! Local fleet analytics and scaling commands
//!
//! These run the node's analytics and scaling logic on this machine; no
//! node is contacted.

use anyhow::Result;
use colored::Colorize;
use edge_lib::analytics::{AnalyticsAggregator, AnalyticsConfig, SimulatedBatchSource};
use edge_lib::models::{ForecastResult, ScalingDecision};
use edge_lib::scaling::ScalingAdvisor;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{color_level, print_info, print_json, print_table, OutputFormat};

/// Row for the per-device analysis table
#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Device")]
    device_id: String,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Attention")]
    attention: String,
    #[tabled(rename = "Pre-emptive")]
    preemptive: String,
}

/// Parameters for a local analytics run
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    pub devices: usize,
    pub batch_size: usize,
    pub workers: usize,
    /// Dust risk to analyze against; `None` means no forecast
    pub risk: Option<f64>,
    pub scaling_threshold: f64,
}

#[derive(Serialize)]
struct AnalyzeOutput<'a> {
    devices: &'a [edge_lib::models::AnalysisResult],
    composite_metric: f64,
    elapsed_ms: u64,
    scaling: ScalingDecision,
}

/// Analyze a simulated fleet and recommend a replica count
pub async fn analyze(options: AnalyzeOptions, format: OutputFormat) -> Result<()> {
    let config = AnalyticsConfig {
        workers: options.workers,
        ..AnalyticsConfig::default()
    };
    let batches = SimulatedBatchSource::new(options.devices, options.batch_size).generate();
    let forecast = options.risk.map(ForecastResult::measured);

    let mut report = AnalyticsAggregator::new(config).run(batches, forecast).await;
    report.results.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    let scaling = ScalingAdvisor::new(options.scaling_threshold).advise(report.composite_metric);

    match format {
        OutputFormat::Json => print_json(&AnalyzeOutput {
            devices: &report.results,
            composite_metric: report.composite_metric,
            elapsed_ms: report.elapsed_ms,
            scaling,
        })?,
        OutputFormat::Table => {
            let rows: Vec<DeviceRow> = report
                .results
                .iter()
                .map(|r| match &r.error {
                    Some(error) => DeviceRow {
                        device_id: r.device_id.clone(),
                        avg: "-".to_string(),
                        max: "-".to_string(),
                        attention: error.red().to_string(),
                        preemptive: "-".to_string(),
                    },
                    None => DeviceRow {
                        device_id: r.device_id.clone(),
                        avg: color_level(r.avg, config.attention_avg_threshold),
                        max: color_level(r.max, config.attention_max_threshold),
                        attention: yes_no(r.needs_attention),
                        preemptive: yes_no(r.preemptive_recommended),
                    },
                })
                .collect();
            print_table(&rows);
            println!();
            println!(
                "{} {:.2} ({} ok, {} failed, {} ms)",
                "Composite metric:".bold(),
                report.composite_metric,
                report.success_count(),
                report.error_count(),
                report.elapsed_ms
            );
            print_scaling(&scaling);
        }
    }

    Ok(())
}

/// Recommend a replica count for a given composite metric
pub fn scale(metric: f64, threshold: f64, format: OutputFormat) -> Result<()> {
    if !(threshold.is_finite() && threshold > 0.0) {
        anyhow::bail!("Threshold must be a positive number");
    }
    let decision = ScalingAdvisor::new(threshold).advise(metric);

    match format {
        OutputFormat::Json => print_json(&decision)?,
        OutputFormat::Table => print_scaling(&decision),
    }
    Ok(())
}

fn print_scaling(decision: &ScalingDecision) {
    print_info(&format!(
        "Metric {:.2} against threshold {:.2}: {} replica(s)",
        decision.metric,
        decision.threshold,
        decision.replica_count.to_string().bold()
    ));
}

fn yes_no(value: bool) -> String {
    if value {
        "yes".yellow().to_string()
    } else {
        "no".to_string()
    }
}
