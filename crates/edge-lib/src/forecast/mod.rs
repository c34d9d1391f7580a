//! Predictive dust-risk forecasting
//!
//! The scheduler depends only on [`ForecastSource`]. Which variant backs it
//! (the remote provider or the simulated one) is decided once, from
//! configuration, by [`create_forecast_source`].

mod provider;
mod simulated;

pub use provider::HttpForecastSource;
pub use simulated::SimulatedForecastSource;

use crate::error::ForecastError;
use crate::models::ForecastResult;
use crate::retry::RetryPolicy;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Native dust optical depth scale mapped onto [0, 1]
pub const NORMALIZATION_FACTOR: f64 = 3.0;

/// Correction for the provider's known underestimation bias
pub const COMPENSATION_FACTOR: f64 = 1.2;

/// Default threshold above which a forecast triggers pre-emptive cleaning
pub const DEFAULT_DUST_RISK_THRESHOLD: f64 = 0.7;

/// Best-effort source of the cycle's dust risk
///
/// Implementations never fail for transport or payload problems; they
/// return a result flagged `simulated` instead. Rejected credentials are
/// the only error surfaced to the caller.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn forecast(&self) -> Result<ForecastResult, ForecastError>;

    /// Short label for logs and health reporting
    fn name(&self) -> &'static str;
}

/// Settings for the remote forecast provider
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Forecast lead time requested from the provider
    pub lead_time_hours: u32,
    /// JSON field holding the raw measurement
    pub measurement_field: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            url: "https://api.example.com/copernicus/forecast".to_string(),
            api_key: None,
            latitude: 37.0,
            longitude: -2.5,
            lead_time_hours: 24,
            measurement_field: "duaod550".to_string(),
            request_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Map a raw provider measurement onto the [0, 1] risk scale
pub fn normalize_measurement(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    (raw / NORMALIZATION_FACTOR * COMPENSATION_FACTOR).clamp(0.0, 1.0)
}

/// Whether the forecast alone warrants a pre-emptive mission
pub fn should_trigger_preemptive(forecast: Option<&ForecastResult>, threshold: f64) -> bool {
    forecast.map(|f| f.risk > threshold).unwrap_or(false)
}

/// Select the forecast variant for this process
pub fn create_forecast_source(config: ForecastConfig) -> Result<Arc<dyn ForecastSource>> {
    let has_key = config
        .api_key
        .as_deref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);

    if has_key {
        tracing::info!(url = %config.url, "Using remote forecast provider");
        Ok(Arc::new(HttpForecastSource::new(config)?))
    } else {
        tracing::warn!("No forecast API key configured, using simulated forecasts");
        Ok(Arc::new(SimulatedForecastSource::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_measurement() {
        assert_eq!(normalize_measurement(0.0), 0.0);
        assert!((normalize_measurement(1.5) - 0.6).abs() < 1e-12);
        assert_eq!(normalize_measurement(3.0), 1.0);
        assert_eq!(normalize_measurement(-0.4), 0.0);
        assert_eq!(normalize_measurement(f64::NAN), 0.0);
    }

    #[test]
    fn test_should_trigger_preemptive() {
        let high = ForecastResult::measured(0.8);
        let edge = ForecastResult::measured(0.7);

        assert!(should_trigger_preemptive(Some(&high), 0.7));
        assert!(!should_trigger_preemptive(Some(&edge), 0.7));
        assert!(!should_trigger_preemptive(None, 0.0));
    }

    #[test]
    fn test_create_source_without_key_is_simulated() {
        let source = create_forecast_source(ForecastConfig::default()).unwrap();
        assert_eq!(source.name(), "simulated");

        let blank = ForecastConfig {
            api_key: Some("  ".to_string()),
            ..ForecastConfig::default()
        };
        assert_eq!(create_forecast_source(blank).unwrap().name(), "simulated");
    }

    #[test]
    fn test_create_source_with_key_is_remote() {
        let config = ForecastConfig {
            api_key: Some("secret".to_string()),
            ..ForecastConfig::default()
        };
        assert_eq!(create_forecast_source(config).unwrap().name(), "provider");
    }
}
