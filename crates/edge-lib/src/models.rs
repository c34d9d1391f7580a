//! Core data models for the edge node

use crate::error::SensorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One contamination measurement in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Build a reading stamped now, rejecting values outside [0, 1]
    pub fn new(value: f64) -> Result<Self, SensorError> {
        Self::at(value, Utc::now())
    }

    pub fn at(value: f64, timestamp: DateTime<Utc>) -> Result<Self, SensorError> {
        if !is_unit_interval(value) {
            return Err(SensorError::OutOfRange(value));
        }
        Ok(Self { value, timestamp })
    }
}

/// Normalized dust risk for the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub risk: f64,
    /// True when the provider could not be used and the risk was made up
    pub simulated: bool,
    pub timestamp: DateTime<Utc>,
}

impl ForecastResult {
    pub fn measured(risk: f64) -> Self {
        Self {
            risk: risk.clamp(0.0, 1.0),
            simulated: false,
            timestamp: Utc::now(),
        }
    }

    pub fn simulated(risk: f64) -> Self {
        Self {
            risk: risk.clamp(0.0, 1.0),
            simulated: true,
            timestamp: Utc::now(),
        }
    }
}

/// Why a cleaning mission was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionReason {
    Soiling,
    Predictive,
    Manual,
}

impl fmt::Display for MissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionReason::Soiling => write!(f, "soiling"),
            MissionReason::Predictive => write!(f, "predictive"),
            MissionReason::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRequest {
    pub reason: MissionReason,
}

impl MissionRequest {
    pub fn new(reason: MissionReason) -> Self {
        Self { reason }
    }
}

/// One step of the robot command sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    CommandMode,
    Takeoff,
    Cleaning,
    Landing,
}

impl MissionPhase {
    /// Command string sent to the robot, if the phase sends one
    pub fn command(&self) -> Option<&'static str> {
        match self {
            MissionPhase::CommandMode => Some("command"),
            MissionPhase::Takeoff => Some("takeoff"),
            MissionPhase::Cleaning => None,
            MissionPhase::Landing => Some("land"),
        }
    }

    /// Terminal status reported when this phase fails
    pub fn failure_status(&self) -> MissionStatus {
        match self {
            MissionPhase::CommandMode => MissionStatus::CommandModeFailure,
            MissionPhase::Takeoff => MissionStatus::TakeoffFailure,
            MissionPhase::Landing => MissionStatus::LandingFailure,
            MissionPhase::Cleaning => MissionStatus::SequenceFailure,
        }
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionPhase::CommandMode => write!(f, "command_mode"),
            MissionPhase::Takeoff => write!(f, "takeoff"),
            MissionPhase::Cleaning => write!(f, "cleaning"),
            MissionPhase::Landing => write!(f, "landing"),
        }
    }
}

/// Terminal status of a mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    MissionSuccess,
    CommandModeFailure,
    TakeoffFailure,
    LandingFailure,
    SequenceFailure,
}

impl MissionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, MissionStatus::MissionSuccess)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::MissionSuccess => "mission_success",
            MissionStatus::CommandModeFailure => "command_mode_failure",
            MissionStatus::TakeoffFailure => "takeoff_failure",
            MissionStatus::LandingFailure => "landing_failure",
            MissionStatus::SequenceFailure => "sequence_failure",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one mission run, discarded after reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionOutcome {
    pub reason: MissionReason,
    /// Last phase entered before the mission terminated
    pub phase_reached: MissionPhase,
    pub status: MissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

/// Ordered readings reported by one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBatch {
    pub device_id: String,
    pub readings: Vec<Reading>,
}

impl DeviceBatch {
    pub fn new(device_id: impl Into<String>, readings: Vec<Reading>) -> Self {
        Self {
            device_id: device_id.into(),
            readings,
        }
    }
}

/// Analysis of one device batch; `error` is set when the batch could not be analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub device_id: String,
    pub avg: f64,
    pub max: f64,
    pub needs_attention: bool,
    pub preemptive_recommended: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn failed(device_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            avg: 0.0,
            max: 0.0,
            needs_attention: false,
            preemptive_recommended: false,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Replica recommendation for the remote compute tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub replica_count: u32,
    pub metric: f64,
    pub threshold: f64,
}

/// Payload delivered to the cloud tier on report cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub node_id: String,
    pub cycle: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastResult>,
    pub devices: Vec<AnalysisResult>,
    pub composite_metric: f64,
    pub scaling: ScalingDecision,
    pub generated_at: DateTime<Utc>,
}

pub(crate) fn is_unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_rejects_out_of_range() {
        assert!(Reading::new(0.0).is_ok());
        assert!(Reading::new(1.0).is_ok());
        assert_eq!(Reading::new(1.01), Err(SensorError::OutOfRange(1.01)));
        assert!(Reading::new(-0.1).is_err());
        assert!(Reading::new(f64::NAN).is_err());
    }

    #[test]
    fn test_forecast_result_clamps_risk() {
        assert_eq!(ForecastResult::measured(1.4).risk, 1.0);
        assert_eq!(ForecastResult::simulated(-0.2).risk, 0.0);
        assert!(ForecastResult::simulated(0.3).simulated);
    }

    #[test]
    fn test_mission_status_serializes_snake_case() {
        let json = serde_json::to_string(&MissionStatus::TakeoffFailure).unwrap();
        assert_eq!(json, "\"takeoff_failure\"");
        assert_eq!(MissionStatus::MissionSuccess.to_string(), "mission_success");
    }

    #[test]
    fn test_phase_failure_status() {
        assert_eq!(
            MissionPhase::CommandMode.failure_status(),
            MissionStatus::CommandModeFailure
        );
        assert_eq!(MissionPhase::Landing.failure_status(), MissionStatus::LandingFailure);
        assert_eq!(MissionPhase::Cleaning.command(), None);
        assert_eq!(MissionPhase::Landing.command(), Some("land"));
    }

    #[test]
    fn test_failed_analysis_result() {
        let result = AnalysisResult::failed("node_1", "empty");
        assert!(!result.is_success());
        assert!(!result.needs_attention);
    }
}
