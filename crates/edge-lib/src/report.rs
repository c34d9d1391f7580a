//! Delivery of cycle reports to the cloud tier
//!
//! The HTTP sink retries transient failures with backoff; rejected reports
//! are not retried. When no endpoint is configured, reports are only logged.

use crate::error::ReportError;
use crate::models::CycleReport;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Sink for cycle reports
#[async_trait]
pub trait CloudReporter: Send + Sync {
    async fn report(&self, report: &CycleReport) -> Result<(), ReportError>;

    fn name(&self) -> &'static str;
}

/// Reporter that only writes the report to the log
#[derive(Debug, Clone, Default)]
pub struct LogReporter;

#[async_trait]
impl CloudReporter for LogReporter {
    async fn report(&self, report: &CycleReport) -> Result<(), ReportError> {
        info!(
            event = "cloud_report",
            sink = "log",
            node = %report.node_id,
            cycle = report.cycle,
            devices = report.devices.len(),
            composite_metric = report.composite_metric,
            replicas = report.scaling.replica_count,
            "Cloud report submitted"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Posts reports as JSON to the cloud ingestion endpoint
pub struct HttpCloudReporter {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpCloudReporter {
    pub fn new(endpoint: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        url::Url::parse(endpoint).with_context(|| format!("Invalid cloud endpoint: {endpoint}"))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create cloud HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            retry,
        })
    }

    async fn post_once(&self, report: &CycleReport) -> Result<(), ReportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(report)
            .send()
            .await
            .map_err(|e| ReportError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ReportError::Transient(format!("sink returned {status}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(ReportError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CloudReporter for HttpCloudReporter {
    async fn report(&self, report: &CycleReport) -> Result<(), ReportError> {
        self.retry
            .run("cloud_report", ReportError::is_retryable, || self.post_once(report))
            .await?;

        info!(
            event = "cloud_report",
            sink = "http",
            node = %report.node_id,
            cycle = report.cycle,
            composite_metric = report.composite_metric,
            replicas = report.scaling.replica_count,
            "Cloud report submitted"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Select the reporter for this process
pub fn create_reporter(
    endpoint: Option<&str>,
    timeout: Duration,
    retry: RetryPolicy,
) -> Result<Arc<dyn CloudReporter>> {
    match endpoint.map(str::trim).filter(|e| !e.is_empty()) {
        Some(endpoint) => Ok(Arc::new(HttpCloudReporter::new(endpoint, timeout, retry)?)),
        None => Ok(Arc::new(LogReporter)),
    }
}
