//! Core library for the solar-panel cleaning edge node
//!
//! This crate provides:
//! - Sensor and dust-risk forecast sources with bounded retry
//! - The cleaning mission protocol over a UDP command link
//! - Fleet analytics on a bounded worker pool and scaling advice
//! - The periodic orchestration loop and cooperative shutdown
//! - Health checks, metrics and structured logging

pub mod analytics;
pub mod error;
pub mod forecast;
pub mod health;
pub mod mission;
pub mod models;
pub mod observability;
pub mod report;
pub mod retry;
pub mod scaling;
pub mod scheduler;
pub mod sensor;
pub mod shutdown;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EdgeMetrics, StructuredLogger};
pub use scheduler::{CycleScheduler, CycleSchedulerBuilder, SchedulerConfig, TickSummary};
pub use shutdown::ShutdownCoordinator;
