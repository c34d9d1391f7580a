//! Replica recommendation for the remote compute tier

use crate::models::ScalingDecision;

/// Default threshold, in units of the sum-of-averages composite metric
pub const DEFAULT_SCALING_THRESHOLD: f64 = 2.0;

/// Upper band starts at this multiple of the threshold
pub const HIGH_LOAD_FACTOR: f64 = 1.5;

/// Map the composite metric to a replica count in {1, 2, 4}
///
/// Monotonic non-decreasing in `metric`. A NaN metric maps to 1.
pub fn decide_scale(metric: f64, threshold: f64) -> u32 {
    if metric >= threshold * HIGH_LOAD_FACTOR {
        4
    } else if metric >= threshold {
        2
    } else {
        1
    }
}

/// Pure advisor holding the configured threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingAdvisor {
    threshold: f64,
}

impl Default for ScalingAdvisor {
    fn default() -> Self {
        Self::new(DEFAULT_SCALING_THRESHOLD)
    }
}

impl ScalingAdvisor {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn advise(&self, metric: f64) -> ScalingDecision {
        ScalingDecision {
            replica_count: decide_scale(metric, self.threshold),
            metric,
            threshold: self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bands() {
        assert_eq!(decide_scale(0.0, 2.0), 1);
        assert_eq!(decide_scale(1.99, 2.0), 1);
        assert_eq!(decide_scale(2.0, 2.0), 2);
        assert_eq!(decide_scale(2.99, 2.0), 2);
        assert_eq!(decide_scale(3.0, 2.0), 4);
        assert_eq!(decide_scale(100.0, 2.0), 4);
    }

    #[test]
    fn test_small_metric_against_large_threshold() {
        assert_eq!(decide_scale(0.90, 130.0), 1);
    }

    #[test]
    fn test_nan_metric_is_minimum() {
        assert_eq!(decide_scale(f64::NAN, 2.0), 1);
    }

    #[test]
    fn test_advisor() {
        let decision = ScalingAdvisor::new(1.0).advise(1.2);
        assert_eq!(decision.replica_count, 2);
        assert_eq!(decision.threshold, 1.0);
        assert_eq!(decision.metric, 1.2);
    }

    proptest! {
        #[test]
        fn decide_scale_is_monotonic(
            a in 0.0f64..1000.0,
            b in 0.0f64..1000.0,
            threshold in 0.001f64..500.0,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(decide_scale(lo, threshold) <= decide_scale(hi, threshold));
        }

        #[test]
        fn decide_scale_output_domain(metric in -10.0f64..1000.0, threshold in 0.001f64..500.0) {
            prop_assert!([1, 2, 4].contains(&decide_scale(metric, threshold)));
        }
    }
}
