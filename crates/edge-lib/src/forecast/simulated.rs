//! Simulated forecast used when the provider is unavailable

use super::ForecastSource;
use crate::error::ForecastError;
use crate::models::ForecastResult;
use crate::sensor::simulated_value;
use async_trait::async_trait;

/// Always returns a uniform risk in [0, 1], flagged `simulated`
#[derive(Debug, Clone, Default)]
pub struct SimulatedForecastSource;

impl SimulatedForecastSource {
    pub fn new() -> Self {
        Self
    }
}

/// Flagged fallback value shared by every forecast variant
pub(crate) fn simulated_forecast() -> ForecastResult {
    ForecastResult::simulated(simulated_value(&mut rand::thread_rng(), 0.0, 1.0))
}

#[async_trait]
impl ForecastSource for SimulatedForecastSource {
    async fn forecast(&self) -> Result<ForecastResult, ForecastError> {
        Ok(simulated_forecast())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
