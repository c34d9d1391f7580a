//! Node configuration
//!
//! Loaded from `EDGE_*` environment variables, optionally layered over a
//! file named by `EDGE_CONFIG_FILE`. Environment values win. Validation
//! failures are fatal at start-up.

use edge_lib::analytics::AnalyticsConfig;
use edge_lib::error::ConfigError;
use edge_lib::forecast::ForecastConfig;
use edge_lib::mission::MissionTimeouts;
use edge_lib::retry::RetryPolicy;
use edge_lib::scaling::ScalingAdvisor;
use edge_lib::scheduler::SchedulerConfig;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "EDGE_CONFIG_FILE";

/// Edge node configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Port for the mission trigger, health and metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Bearer token for `POST /start_mission`; unset rejects every request
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_soiling_threshold")]
    pub soiling_threshold: f64,

    #[serde(default = "default_attention_avg_threshold")]
    pub attention_avg_threshold: f64,

    #[serde(default = "default_attention_max_threshold")]
    pub attention_max_threshold: f64,

    #[serde(default = "default_dust_risk_threshold")]
    pub dust_risk_threshold: f64,

    /// Analytics and cloud reporting run every this many cycles
    #[serde(default = "default_cloud_report_freq")]
    pub cloud_report_freq: u64,

    #[serde(default = "default_aggregator_workers")]
    pub aggregator_workers: usize,

    /// In units of the sum-of-averages composite metric
    #[serde(default = "default_scaling_threshold")]
    pub scaling_threshold: f64,

    #[serde(default = "default_robot_addr")]
    pub robot_addr: String,

    #[serde(default = "default_robot_local_port")]
    pub robot_local_port: u16,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    #[serde(default = "default_flight_timeout")]
    pub takeoff_timeout_ms: u64,

    #[serde(default = "default_flight_timeout")]
    pub landing_timeout_ms: u64,

    #[serde(default = "default_cleaning_duration")]
    pub cleaning_duration_secs: u64,

    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,

    #[serde(default)]
    pub forecast_api_key: Option<String>,

    #[serde(default = "default_forecast_lat")]
    pub forecast_lat: f64,

    #[serde(default = "default_forecast_lon")]
    pub forecast_lon: f64,

    #[serde(default = "default_forecast_timeout")]
    pub forecast_timeout_secs: u64,

    #[serde(default = "default_measurement_field")]
    pub forecast_measurement_field: String,

    /// Cloud sink; unset reports to the log only
    #[serde(default)]
    pub cloud_endpoint: Option<String>,

    #[serde(default = "default_simulated_devices")]
    pub simulated_devices: usize,

    #[serde(default = "default_simulated_batch_size")]
    pub simulated_batch_size: usize,
}

fn default_node_id() -> String {
    "edge-node".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    10
}

fn default_soiling_threshold() -> f64 {
    0.7
}

fn default_attention_avg_threshold() -> f64 {
    0.75
}

fn default_attention_max_threshold() -> f64 {
    0.9
}

fn default_dust_risk_threshold() -> f64 {
    edge_lib::forecast::DEFAULT_DUST_RISK_THRESHOLD
}

fn default_cloud_report_freq() -> u64 {
    5
}

fn default_aggregator_workers() -> usize {
    edge_lib::analytics::DEFAULT_WORKERS
}

fn default_scaling_threshold() -> f64 {
    edge_lib::scaling::DEFAULT_SCALING_THRESHOLD
}

fn default_robot_addr() -> String {
    "192.168.10.1:8889".to_string()
}

fn default_robot_local_port() -> u16 {
    9000
}

fn default_command_timeout() -> u64 {
    5000
}

fn default_flight_timeout() -> u64 {
    10_000
}

fn default_cleaning_duration() -> u64 {
    10
}

fn default_forecast_url() -> String {
    ForecastConfig::default().url
}

fn default_forecast_lat() -> f64 {
    37.0
}

fn default_forecast_lon() -> f64 {
    -2.5
}

fn default_forecast_timeout() -> u64 {
    10
}

fn default_measurement_field() -> String {
    "duaod550".to_string()
}

fn default_simulated_devices() -> usize {
    4
}

fn default_simulated_batch_size() -> usize {
    12
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api_port: default_api_port(),
            api_token: None,
            poll_interval_secs: default_poll_interval(),
            soiling_threshold: default_soiling_threshold(),
            attention_avg_threshold: default_attention_avg_threshold(),
            attention_max_threshold: default_attention_max_threshold(),
            dust_risk_threshold: default_dust_risk_threshold(),
            cloud_report_freq: default_cloud_report_freq(),
            aggregator_workers: default_aggregator_workers(),
            scaling_threshold: default_scaling_threshold(),
            robot_addr: default_robot_addr(),
            robot_local_port: default_robot_local_port(),
            command_timeout_ms: default_command_timeout(),
            takeoff_timeout_ms: default_flight_timeout(),
            landing_timeout_ms: default_flight_timeout(),
            cleaning_duration_secs: default_cleaning_duration(),
            forecast_url: default_forecast_url(),
            forecast_api_key: None,
            forecast_lat: default_forecast_lat(),
            forecast_lon: default_forecast_lon(),
            forecast_timeout_secs: default_forecast_timeout(),
            forecast_measurement_field: default_measurement_field(),
            cloud_endpoint: None,
            simulated_devices: default_simulated_devices(),
            simulated_batch_size: default_simulated_batch_size(),
        }
    }
}

impl NodeConfig {
    /// Load from the process environment and validate
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::load_from(file.as_deref(), None)
    }

    /// Load from an optional file and an environment map (`None` reads the
    /// process environment), then validate
    pub fn load_from(
        file: Option<&str>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file.filter(|p| !p.trim().is_empty()) {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("EDGE")
                .try_parsing(true)
                .source(env),
        );

        let config: NodeConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("soiling_threshold", self.soiling_threshold),
            ("attention_avg_threshold", self.attention_avg_threshold),
            ("attention_max_threshold", self.attention_max_threshold),
            ("dust_risk_threshold", self.dust_risk_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }

        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("cloud_report_freq", self.cloud_report_freq),
            ("aggregator_workers", self.aggregator_workers as u64),
            ("command_timeout_ms", self.command_timeout_ms),
            ("takeoff_timeout_ms", self.takeoff_timeout_ms),
            ("landing_timeout_ms", self.landing_timeout_ms),
            ("cleaning_duration_secs", self.cleaning_duration_secs),
            ("forecast_timeout_secs", self.forecast_timeout_secs),
            ("simulated_devices", self.simulated_devices as u64),
            ("simulated_batch_size", self.simulated_batch_size as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive { name });
            }
        }

        if !(self.scaling_threshold.is_finite() && self.scaling_threshold > 0.0) {
            return Err(ConfigError::NotPositive {
                name: "scaling_threshold",
            });
        }

        validate_url("forecast_url", &self.forecast_url)?;
        if let Some(endpoint) = self.cloud_endpoint.as_deref() {
            validate_url("cloud_endpoint", endpoint)?;
        }
        self.robot_addr()?;

        Ok(())
    }

    pub fn robot_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.robot_addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                name: "robot_addr",
                value: self.robot_addr.clone(),
            })
    }

    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.robot_local_port))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            node_id: self.node_id.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            soiling_threshold: self.soiling_threshold,
            dust_risk_threshold: self.dust_risk_threshold,
            report_every: self.cloud_report_freq,
        }
    }

    pub fn analytics_config(&self) -> AnalyticsConfig {
        AnalyticsConfig {
            attention_avg_threshold: self.attention_avg_threshold,
            attention_max_threshold: self.attention_max_threshold,
            dust_risk_threshold: self.dust_risk_threshold,
            workers: self.aggregator_workers,
        }
    }

    pub fn mission_timeouts(&self) -> MissionTimeouts {
        MissionTimeouts {
            command_mode: Duration::from_millis(self.command_timeout_ms),
            takeoff: Duration::from_millis(self.takeoff_timeout_ms),
            landing: Duration::from_millis(self.landing_timeout_ms),
            cleaning_hold: Duration::from_secs(self.cleaning_duration_secs),
        }
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            url: self.forecast_url.clone(),
            api_key: self.forecast_api_key.clone(),
            latitude: self.forecast_lat,
            longitude: self.forecast_lon,
            measurement_field: self.forecast_measurement_field.clone(),
            request_timeout: Duration::from_secs(self.forecast_timeout_secs),
            ..ForecastConfig::default()
        }
    }

    pub fn scaling_advisor(&self) -> ScalingAdvisor {
        ScalingAdvisor::new(self.scaling_threshold)
    }

    /// Retry applied to sensor reads and cloud reports
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

fn validate_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidUrl {
            name,
            reason: e.to_string(),
        })
}
