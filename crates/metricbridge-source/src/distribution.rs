use std::sync::{Mutex, PoisonError};

use metricbridge_common::error::{MetricsError, Result};

/// Pre-bucketed distribution: observations are counted into fixed upper
/// bounds at record time rather than sampled.
#[derive(Debug)]
pub struct Distribution {
    bounds: Vec<f64>,
    state: Mutex<DistributionState>,
}

#[derive(Debug)]
struct DistributionState {
    bucket_counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl Distribution {
    pub fn new(bounds: &[f64]) -> Result<Self> {
        if bounds.is_empty() {
            return Err(MetricsError::InvalidArgument(
                "distribution needs at least one bucket bound".to_string(),
            ));
        }
        if bounds.iter().any(|bound| !bound.is_finite()) {
            return Err(MetricsError::InvalidArgument(
                "distribution bucket bounds must be finite".to_string(),
            ));
        }
        if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(MetricsError::InvalidArgument(
                "distribution bucket bounds must be strictly increasing".to_string(),
            ));
        }

        Ok(Self {
            bounds: bounds.to_vec(),
            state: Mutex::new(DistributionState {
                bucket_counts: vec![0; bounds.len()],
                count: 0,
                sum: 0.0,
            }),
        })
    }

    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    pub fn observe(&self, value: f64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = self.bounds.iter().position(|bound| value <= *bound) {
            state.bucket_counts[index] += 1;
        }
        state.count += 1;
        state.sum += value;
    }

    pub fn snapshot(&self) -> DistributionSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut cumulative = 0_u64;
        let buckets = self
            .bounds
            .iter()
            .zip(state.bucket_counts.iter())
            .map(|(bound, bucket_count)| {
                cumulative = cumulative.saturating_add(*bucket_count);
                (*bound, cumulative)
            })
            .collect();

        DistributionSnapshot {
            count: state.count,
            sum: state.sum,
            buckets,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSnapshot {
    count: u64,
    sum: f64,
    buckets: Vec<(f64, u64)>,
}

impl DistributionSnapshot {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// `(upper bound, cumulative count)` pairs in bound order. Observations
    /// above the last bound only show up in [`count`](Self::count).
    pub fn buckets(&self) -> &[(f64, u64)] {
        &self.buckets
    }
}

#[cfg(test)]
mod tests {
    use super::Distribution;

    #[test]
    fn rejects_unordered_bounds() {
        assert!(Distribution::new(&[]).is_err());
        assert!(Distribution::new(&[1.0, 1.0]).is_err());
        assert!(Distribution::new(&[2.0, 1.0]).is_err());
        assert!(Distribution::new(&[1.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn buckets_are_cumulative() {
        let distribution = Distribution::new(&[1.0, 5.0, 10.0]).unwrap();
        for value in [0.5, 1.0, 3.0, 7.0, 50.0] {
            distribution.observe(value);
        }

        let snapshot = distribution.snapshot();
        assert_eq!(snapshot.count(), 5);
        assert_eq!(snapshot.sum(), 61.5);
        assert_eq!(snapshot.buckets(), &[(1.0, 2), (5.0, 3), (10.0, 4)]);
    }
}
