//! Contamination sensor sources
//!
//! The physical driver lives outside this crate; the node only depends on
//! [`SensorSource`]. A simulated source stands in until hardware is wired.

use crate::error::SensorError;
use crate::models::Reading;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;

/// Supplies one contamination reading per call
#[async_trait]
pub trait SensorSource: Send + Sync {
    async fn read(&self) -> Result<Reading, SensorError>;
}

/// Simulated soiling sensor producing uniform values rounded to two decimals
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    low: f64,
    high: f64,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self {
            low: 0.3,
            high: 1.0,
        }
    }
}

impl SimulatedSensor {
    /// Range is clamped into [0, 1]
    pub fn with_range(low: f64, high: f64) -> Self {
        let low = low.clamp(0.0, 1.0);
        let high = high.clamp(low, 1.0);
        Self { low, high }
    }

    pub fn sample(&self) -> f64 {
        simulated_value(&mut rand::thread_rng(), self.low, self.high)
    }
}

#[async_trait]
impl SensorSource for SimulatedSensor {
    async fn read(&self) -> Result<Reading, SensorError> {
        Reading::new(self.sample())
    }
}

/// Uniform value in [low, high] rounded to two decimals
pub(crate) fn simulated_value<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    let raw = if high > low { rng.gen_range(low..=high) } else { low };
    ((raw * 100.0).round() / 100.0).clamp(low, high)
}

/// Wraps a sensor with the bus retry policy; only transient errors are retried
pub struct RetryingSensor {
    inner: Arc<dyn SensorSource>,
    policy: RetryPolicy,
}

impl RetryingSensor {
    pub fn new(inner: Arc<dyn SensorSource>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl SensorSource for RetryingSensor {
    async fn read(&self) -> Result<Reading, SensorError> {
        self.policy
            .run("sensor_read", SensorError::is_retryable, || self.inner.read())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Sensor that replays a fixed script of results
    struct ScriptedSensor {
        script: Mutex<Vec<Result<f64, SensorError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSensor {
        fn new(mut script: Vec<Result<f64, SensorError>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SensorSource for ScriptedSensor {
        async fn read(&self) -> Result<Reading, SensorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop().expect("script exhausted");
            Reading::new(next?)
        }
    }

    #[tokio::test]
    async fn test_simulated_sensor_in_range() {
        let sensor = SimulatedSensor::default();
        for _ in 0..200 {
            let reading = sensor.read().await.unwrap();
            assert!((0.3..=1.0).contains(&reading.value));
            let cents = reading.value * 100.0;
            assert!((cents - cents.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_with_range_clamps() {
        let sensor = SimulatedSensor::with_range(-1.0, 2.0);
        assert_eq!(sensor.low, 0.0);
        assert_eq!(sensor.high, 1.0);

        let fixed = SimulatedSensor::with_range(0.5, 0.2);
        assert_eq!(fixed.sample(), 0.5);
    }

    #[tokio::test]
    async fn test_retrying_sensor_recovers_from_transient() {
        let inner = Arc::new(ScriptedSensor::new(vec![
            Err(SensorError::Transient("bus busy".into())),
            Ok(0.42),
        ]));
        let sensor = RetryingSensor::new(inner.clone(), RetryPolicy::immediate(3));

        let reading = sensor.read().await.unwrap();
        assert_eq!(reading.value, 0.42);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retrying_sensor_does_not_retry_out_of_range() {
        let inner = Arc::new(ScriptedSensor::new(vec![Ok(1.5), Ok(0.5)]));
        let sensor = RetryingSensor::new(inner.clone(), RetryPolicy::immediate(3));

        assert_eq!(sensor.read().await, Err(SensorError::OutOfRange(1.5)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
