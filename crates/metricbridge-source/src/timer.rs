use std::time::{Duration, Instant};

use crate::{
    histogram::{Histogram, HistogramSnapshot},
    meter::{Meter, MeterSnapshot},
};

/// Duration histogram (nanoseconds) paired with a meter of how often the
/// timed event happens.
#[derive(Debug, Default)]
pub struct Timer {
    histogram: Histogram,
    meter: Meter,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.update(nanos);
        self.meter.mark(1);
    }

    pub fn update_since(&self, started_at: Instant) {
        self.update(started_at.elapsed());
    }

    /// Runs `f` and records how long it took.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let started_at = Instant::now();
        let result = f();
        self.update_since(started_at);
        result
    }

    pub fn stop(&self) {
        self.meter.stop();
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            histogram: self.histogram.snapshot(),
            meter: self.meter.snapshot(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerSnapshot {
    histogram: HistogramSnapshot,
    meter: MeterSnapshot,
}

impl TimerSnapshot {
    pub fn histogram(&self) -> &HistogramSnapshot {
        &self.histogram
    }

    pub fn meter(&self) -> &MeterSnapshot {
        &self.meter
    }

    pub fn count(&self) -> i64 {
        self.histogram.count()
    }

    pub fn sum(&self) -> i64 {
        self.histogram.sum()
    }

    pub fn min(&self) -> i64 {
        self.histogram.min()
    }

    pub fn max(&self) -> i64 {
        self.histogram.max()
    }

    pub fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    pub fn std_dev(&self) -> f64 {
        self.histogram.std_dev()
    }

    pub fn variance(&self) -> f64 {
        self.histogram.variance()
    }

    pub fn percentiles(&self, ps: &[f64]) -> Vec<f64> {
        self.histogram.percentiles(ps)
    }

    pub fn rate1(&self) -> f64 {
        self.meter.rate1()
    }

    pub fn rate5(&self) -> f64 {
        self.meter.rate5()
    }

    pub fn rate15(&self) -> f64 {
        self.meter.rate15()
    }

    pub fn rate_mean(&self) -> f64 {
        self.meter.rate_mean()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Timer;

    #[test]
    fn records_durations_in_nanoseconds() {
        let timer = Timer::new();
        timer.update(Duration::from_micros(1));
        timer.update(Duration::from_micros(3));

        let snapshot = timer.snapshot();
        assert_eq!(snapshot.count(), 2);
        assert_eq!(snapshot.sum(), 4_000);
        assert_eq!(snapshot.min(), 1_000);
        assert_eq!(snapshot.max(), 3_000);
        assert_eq!(snapshot.mean(), 2_000.0);
        assert_eq!(snapshot.meter().count(), 2);
    }

    #[test]
    fn time_returns_closure_result() {
        let timer = Timer::new();
        let value = timer.time(|| 42);
        assert_eq!(value, 42);
        assert_eq!(timer.snapshot().count(), 1);
    }
}
