//! Remote dust forecast provider client
//!
//! Fetches a raw optical depth measurement over HTTP, retries transport
//! hiccups with backoff, and degrades to a simulated value on anything but
//! rejected credentials.

use super::simulated::simulated_forecast;
use super::{normalize_measurement, ForecastConfig, ForecastSource};
use crate::error::ForecastError;
use crate::models::ForecastResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

/// HTTP client for the forecast provider
pub struct HttpForecastSource {
    client: Client,
    config: ForecastConfig,
}

impl HttpForecastSource {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        url::Url::parse(&config.url)
            .with_context(|| format!("Invalid forecast URL: {}", config.url))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create forecast HTTP client")?;

        Ok(Self { client, config })
    }

    fn api_key(&self) -> Option<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// One request to the provider, returning the raw measurement
    async fn fetch_raw(&self, api_key: &str) -> Result<f64, ForecastError> {
        let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let response = self
            .client
            .get(&self.config.url)
            .query(&[
                ("apikey", api_key.to_string()),
                ("parameter", self.config.measurement_field.clone()),
                ("lat", self.config.latitude.to_string()),
                ("lon", self.config.longitude.to_string()),
                ("date", date),
                ("leadtime_hour", self.config.lead_time_hours.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ForecastError::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ForecastError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ForecastError::Transient(format!("provider returned {status}")));
        }
        if !status.is_success() {
            return Err(ForecastError::Malformed(format!("unexpected status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ForecastError::Transient(e.to_string()))?;

        self.parse_measurement(&body)
    }

    fn parse_measurement(&self, body: &str) -> Result<f64, ForecastError> {
        let json: serde_json::Value =
            serde_json::from_str(body).map_err(|e| ForecastError::Malformed(e.to_string()))?;

        json.get(&self.config.measurement_field)
            .and_then(serde_json::Value::as_f64)
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ForecastError::Malformed(format!(
                    "missing numeric field '{}'",
                    self.config.measurement_field
                ))
            })
    }

    fn fallback(&self, cause: &ForecastError) -> ForecastResult {
        let result = simulated_forecast();
        warn!(
            event = "forecast_fallback",
            cause = %cause,
            simulated_risk = result.risk,
            "Forecast unavailable, using simulated risk"
        );
        result
    }
}

#[async_trait]
impl ForecastSource for HttpForecastSource {
    async fn forecast(&self) -> Result<ForecastResult, ForecastError> {
        let Some(api_key) = self.api_key() else {
            return Ok(self.fallback(&ForecastError::MissingCredentials));
        };

        let fetched = self
            .config
            .retry
            .run("forecast_fetch", ForecastError::is_retryable, || {
                self.fetch_raw(api_key)
            })
            .await;

        match fetched {
            Ok(raw) => {
                let result = ForecastResult::measured(normalize_measurement(raw));
                debug!(raw, risk = result.risk, "Fetched dust forecast");
                Ok(result)
            }
            Err(e @ ForecastError::Unauthorized { .. }) => Err(e),
            Err(e) => Ok(self.fallback(&e)),
        }
    }

    fn name(&self) -> &'static str {
        "provider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use mockito::Matcher;

    fn config_for(url: String) -> ForecastConfig {
        ForecastConfig {
            url,
            api_key: Some("test-key".to_string()),
            retry: RetryPolicy::immediate(3),
            ..ForecastConfig::default()
        }
    }

    #[tokio::test]
    async fn test_measurement_is_normalized() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/forecast")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("apikey".into(), "test-key".into()),
                Matcher::UrlEncoded("parameter".into(), "duaod550".into()),
                Matcher::UrlEncoded("lat".into(), "37".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"duaod550": 1.5}"#)
            .create_async()
            .await;

        let source = HttpForecastSource::new(config_for(format!("{}/forecast", server.url()))).unwrap();
        let result = source.forecast().await.unwrap();

        mock.assert_async().await;
        assert!(!result.simulated);
        assert!((result.risk - 0.6).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_large_measurement_is_clamped() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/forecast")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"duaod550": 9.0}"#)
            .create_async()
            .await;

        let source = HttpForecastSource::new(config_for(format!("{}/forecast", server.url()))).unwrap();
        assert_eq!(source.forecast().await.unwrap().risk, 1.0);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_simulated() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/forecast")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let source = HttpForecastSource::new(config_for(format!("{}/forecast", server.url()))).unwrap();
        let result = source.forecast().await.unwrap();

        mock.assert_async().await;
        assert!(result.simulated);
        assert!((0.0..=1.0).contains(&result.risk));
    }

    #[tokio::test]
    async fn test_unreachable_provider_falls_back() {
        let source = HttpForecastSource::new(config_for("http://127.0.0.1:1/forecast".into())).unwrap();
        let result = source.forecast().await.unwrap();

        assert!(result.simulated);
        assert!((0.0..=1.0).contains(&result.risk));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/forecast")
            .match_query(Matcher::Any)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let source = HttpForecastSource::new(config_for(format!("{}/forecast", server.url()))).unwrap();
        let result = source.forecast().await;

        mock.assert_async().await;
        assert_eq!(result, Err(ForecastError::Unauthorized { status: 401 }));
    }

    #[tokio::test]
    async fn test_malformed_body_falls_back_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/forecast")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"risk": "high"}"#)
            .expect(1)
            .create_async()
            .await;

        let source = HttpForecastSource::new(config_for(format!("{}/forecast", server.url()))).unwrap();
        let result = source.forecast().await.unwrap();

        mock.assert_async().await;
        assert!(result.simulated);
    }

    #[tokio::test]
    async fn test_missing_key_falls_back_without_request() {
        let config = ForecastConfig {
            api_key: None,
            ..config_for("http://127.0.0.1:1/forecast".into())
        };
        let source = HttpForecastSource::new(config).unwrap();
        assert!(source.forecast().await.unwrap().simulated);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(HttpForecastSource::new(config_for("not a url".into())).is_err());
    }
}
