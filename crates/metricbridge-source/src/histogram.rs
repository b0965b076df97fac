use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

/// Number of samples a histogram keeps for percentile queries.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// Distribution of integer observations.
///
/// `count` and `sum` cover every observation ever recorded. The statistical
/// accessors on [`HistogramSnapshot`] (min, max, mean, percentiles, ...) are
/// computed over a bounded reservoir holding the most recent observations.
#[derive(Debug)]
pub struct Histogram {
    state: Mutex<HistogramState>,
}

#[derive(Debug)]
struct HistogramState {
    reservoir: VecDeque<i64>,
    capacity: usize,
    count: i64,
    sum: i64,
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_reservoir_size(DEFAULT_RESERVOIR_SIZE)
    }

    pub fn with_reservoir_size(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(HistogramState {
                reservoir: VecDeque::with_capacity(capacity),
                capacity,
                count: 0,
                sum: 0,
            }),
        }
    }

    pub fn update(&self, value: i64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.reservoir.len() == state.capacity {
            state.reservoir.pop_front();
        }
        state.reservoir.push_back(value);
        state.count = state.count.saturating_add(1);
        state.sum = state.sum.saturating_add(value);
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reservoir.clear();
        state.count = 0;
        state.sum = 0;
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        HistogramSnapshot::new(state.count, state.sum, state.reservoir.iter().copied().collect())
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    count: i64,
    sum: i64,
    values: Vec<i64>,
    sorted: Vec<i64>,
}

impl HistogramSnapshot {
    pub fn new(count: i64, sum: i64, values: Vec<i64>) -> Self {
        let mut sorted = values.clone();
        sorted.sort_unstable();
        Self {
            count,
            sum,
            values,
            sorted,
        }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn sum(&self) -> i64 {
        self.sum
    }

    /// Reservoir contents, oldest first.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Most recent observation still in the reservoir.
    pub fn last(&self) -> Option<i64> {
        self.values.last().copied()
    }

    pub fn min(&self) -> i64 {
        self.sorted.first().copied().unwrap_or(0)
    }

    pub fn max(&self) -> i64 {
        self.sorted.last().copied().unwrap_or(0)
    }

    pub fn mean(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let total: f64 = self.sorted.iter().map(|value| *value as f64).sum();
        total / self.sorted.len() as f64
    }

    /// Population variance of the reservoir.
    pub fn variance(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let squares: f64 = self
            .sorted
            .iter()
            .map(|value| {
                let delta = *value as f64 - mean;
                delta * delta
            })
            .sum();
        squares / self.sorted.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Value at percentile `p` (0–1 scale), interpolating between the two
    /// neighbouring ranks at position `p * (n + 1)`.
    pub fn percentile(&self, p: f64) -> f64 {
        percentile_of_sorted(&self.sorted, p)
    }

    pub fn percentiles(&self, ps: &[f64]) -> Vec<f64> {
        ps.iter()
            .map(|p| percentile_of_sorted(&self.sorted, *p))
            .collect()
    }
}

fn percentile_of_sorted(sorted: &[i64], p: f64) -> f64 {
    let size = sorted.len();
    if size == 0 {
        return 0.0;
    }

    let pos = p * (size + 1) as f64;
    if pos < 1.0 {
        sorted[0] as f64
    } else if pos >= size as f64 {
        sorted[size - 1] as f64
    } else {
        let rank = pos.floor() as usize;
        let lower = sorted[rank - 1] as f64;
        let upper = sorted[rank] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }
}

#[cfg(test)]
mod tests {
    use super::Histogram;

    #[test]
    fn empty_snapshot_is_all_zero() {
        let snapshot = Histogram::new().snapshot();
        assert_eq!(snapshot.count(), 0);
        assert_eq!(snapshot.min(), 0);
        assert_eq!(snapshot.max(), 0);
        assert_eq!(snapshot.mean(), 0.0);
        assert_eq!(snapshot.percentile(0.5), 0.0);
        assert!(snapshot.last().is_none());
    }

    #[test]
    fn statistics_over_one_to_hundred() {
        let histogram = Histogram::new();
        for value in 1..=100 {
            histogram.update(value);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 100);
        assert_eq!(snapshot.sum(), 5050);
        assert_eq!(snapshot.min(), 1);
        assert_eq!(snapshot.max(), 100);
        assert_eq!(snapshot.mean(), 50.5);
        assert_eq!(snapshot.last(), Some(100));
        assert!((snapshot.variance() - 833.25).abs() < 1e-9);
        assert_eq!(snapshot.percentile(0.5), 50.5);
        assert!((snapshot.percentile(0.99) - 99.99).abs() < 1e-9);
        assert_eq!(snapshot.percentile(0.001), 1.0);
        assert_eq!(snapshot.percentile(1.0), 100.0);
    }

    #[test]
    fn percentiles_are_non_decreasing() {
        let histogram = Histogram::new();
        for value in [7, 3, 9, 1, 4, 4, 12, 8] {
            histogram.update(value);
        }

        let values = histogram
            .snapshot()
            .percentiles(&[0.05, 0.1, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99]);
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn reservoir_keeps_most_recent_values() {
        let histogram = Histogram::with_reservoir_size(3);
        for value in 1..=5 {
            histogram.update(value);
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.values(), &[3, 4, 5]);
        assert_eq!(snapshot.count(), 5);
        assert_eq!(snapshot.sum(), 15);
        assert_eq!(snapshot.min(), 3);
    }
}
