//! Sources of per-device reading batches for fleet analytics

use crate::models::{DeviceBatch, Reading};
use crate::sensor::simulated_value;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

/// Supplies the batches analyzed on report cycles
#[async_trait]
pub trait BatchSource: Send + Sync {
    async fn fetch_batches(&self) -> Result<Vec<DeviceBatch>>;
}

/// Simulated fleet of `node_1..node_N`, each reporting `batch_size` readings
#[derive(Debug, Clone)]
pub struct SimulatedBatchSource {
    num_devices: usize,
    batch_size: usize,
    /// Spacing between simulated readings
    sample_interval: ChronoDuration,
}

impl SimulatedBatchSource {
    pub fn new(num_devices: usize, batch_size: usize) -> Self {
        Self {
            num_devices,
            batch_size,
            sample_interval: ChronoDuration::seconds(10),
        }
    }

    pub fn generate(&self) -> Vec<DeviceBatch> {
        let mut rng = rand::thread_rng();
        let now = Utc::now();
        (1..=self.num_devices)
            .map(|i| {
                let readings = (0..self.batch_size)
                    .map(|j| {
                        let offset = self.sample_interval * (self.batch_size - j - 1) as i32;
                        Reading {
                            value: simulated_value(&mut rng, 0.3, 1.0),
                            timestamp: now - offset,
                        }
                    })
                    .collect();
                DeviceBatch::new(format!("node_{i}"), readings)
            })
            .collect()
    }
}

#[async_trait]
impl BatchSource for SimulatedBatchSource {
    async fn fetch_batches(&self) -> Result<Vec<DeviceBatch>> {
        Ok(self.generate())
    }
}
