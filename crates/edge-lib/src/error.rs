//! Error types for the edge node core
//!
//! Each component boundary has its own error enum so callers can decide
//! locally what to retry, what to degrade, and what is fatal. Only
//! [`ConfigError`] is allowed to stop the process, and only at start-up.

use std::time::Duration;
use thiserror::Error;

/// Invalid or missing setting detected while loading configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be positive")]
    NotPositive { name: &'static str },

    #[error("{name} is not a valid URL: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("{name} is not a valid socket address: {value}")]
    InvalidAddress { name: &'static str, value: String },

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Failure reading the local contamination sensor
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SensorError {
    /// Bus hiccup or similar; safe to retry
    #[error("transient sensor I/O failure: {0}")]
    Transient(String),

    #[error("sensor reading {0} outside [0, 1]")]
    OutOfRange(f64),
}

impl SensorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SensorError::Transient(_))
    }
}

/// Failure talking to the forecast provider
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForecastError {
    #[error("transient forecast transport error: {0}")]
    Transient(String),

    #[error("forecast provider rejected credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("no forecast API key configured")]
    MissingCredentials,

    #[error("malformed forecast response: {0}")]
    Malformed(String),
}

impl ForecastError {
    /// Only transport hiccups are retried; auth and payload problems are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, ForecastError::Transient(_))
    }
}

/// Failure on the robot command link
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("robot link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("response is not valid UTF-8")]
    InvalidEncoding,
}

/// Reasons a mission request is refused before any command is sent
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MissionError {
    #[error("another mission is already in flight")]
    Busy,

    #[error("mission controller has been shut down")]
    ShutDown,
}

/// Failure scoped to a single device batch
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggregationError {
    #[error("batch for device {0} is empty")]
    EmptyBatch(String),

    #[error("device {device_id} reported value {value} outside [0, 1]")]
    ReadingOutOfRange { device_id: String, value: f64 },

    #[error("analysis worker for device {0} did not complete")]
    WorkerFailed(String),
}

/// Failure delivering a cycle report to the cloud tier
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReportError {
    #[error("transient cloud sink error: {0}")]
    Transient(String),

    #[error("cloud sink rejected report (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

impl ReportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReportError::Transient(_))
    }
}
