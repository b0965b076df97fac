//! Collector replaying a distribution computed outside the exporter.
//!
//! The exporter's own histograms only accept observations one at a time and
//! bucket them by frequency. Percentile-derived buckets are computed by the
//! publisher instead, so they are handed over as a finished
//! [`ConstHistogram`] and swapped in wholesale.

use std::{
    any::Any,
    sync::{Arc, Mutex, PoisonError},
};

use metricbridge_exporter::{
    histogram::ConstHistogram,
    registry::Collector,
    types::{Desc, MetricFamily},
};

#[derive(Debug, Default)]
pub struct HistogramCollector {
    snapshot: Mutex<Option<Arc<ConstHistogram>>>,
}

impl HistogramCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the held snapshot.
    pub fn update(&self, histogram: ConstHistogram) {
        let next = Arc::new(histogram);
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(next);
    }

    pub fn current(&self) -> Option<Arc<ConstHistogram>> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Collector for HistogramCollector {
    /// Intentionally empty: the descriptor travels with each snapshot, so the
    /// collector registers unchecked.
    fn describe(&self) -> Vec<Desc> {
        Vec::new()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.current()
            .map(|histogram| vec![histogram.to_family()])
            .unwrap_or_default()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use metricbridge_common::Labels;
    use metricbridge_exporter::{
        histogram::ConstHistogram,
        registry::Collector,
        types::{Desc, MetricValue},
    };

    use super::HistogramCollector;

    fn histogram(generation: u64) -> ConstHistogram {
        ConstHistogram::new(
            Desc::new("test_subsys_latency_timer", "latency", vec![], Labels::new()),
            generation,
            generation as f64 * 2.0,
            vec![(0.5, generation), (0.95, generation), (0.99, generation)],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn empty_collector_collects_nothing() {
        let collector = HistogramCollector::new();
        assert!(collector.describe().is_empty());
        assert!(collector.collect().is_empty());
    }

    #[test]
    fn update_replaces_snapshot() {
        let collector = HistogramCollector::new();
        collector.update(histogram(1));
        collector.update(histogram(7));

        let families = collector.collect();
        assert_eq!(families.len(), 1);
        let MetricValue::Histogram { count, sum, .. } = &families[0].samples[0].value else {
            panic!("expected a histogram sample");
        };
        assert_eq!(*count, 7);
        assert_eq!(*sum, 14.0);
    }

    #[test]
    fn concurrent_collect_sees_whole_snapshots() {
        let collector = Arc::new(HistogramCollector::new());

        thread::scope(|scope| {
            let writer = Arc::clone(&collector);
            scope.spawn(move || {
                for generation in 1..=2_000 {
                    writer.update(histogram(generation));
                }
            });

            for _ in 0..4 {
                let reader = Arc::clone(&collector);
                scope.spawn(move || {
                    for _ in 0..2_000 {
                        for family in reader.collect() {
                            let MetricValue::Histogram {
                                buckets,
                                count,
                                sum,
                            } = &family.samples[0].value
                            else {
                                panic!("expected a histogram sample");
                            };
                            assert_eq!(*sum, *count as f64 * 2.0);
                            assert!(buckets.iter().all(|(_, cumulative)| cumulative == count));
                        }
                    }
                });
            }
        });

        assert_eq!(collector.current().unwrap().count(), 2_000);
    }
}
