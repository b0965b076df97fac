use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use metricbridge_common::error::{MetricsError, Result};
use tracing::debug;

use crate::{
    counter::Counter,
    distribution::Distribution,
    gauge::{FloatGauge, Gauge},
    histogram::Histogram,
    meter::{Ewma, Meter},
    timer::Timer,
};

/// A registered metric. New kinds may be added, so consumers must keep a
/// fallback arm when matching.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    FloatGauge(Arc<FloatGauge>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
    Timer(Arc<Timer>),
    Distribution(Arc<Distribution>),
    Ewma(Arc<Ewma>),
}

impl Metric {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Counter(_) => "counter",
            Self::Gauge(_) => "gauge",
            Self::FloatGauge(_) => "float_gauge",
            Self::Histogram(_) => "histogram",
            Self::Meter(_) => "meter",
            Self::Timer(_) => "timer",
            Self::Distribution(_) => "distribution",
            Self::Ewma(_) => "ewma",
        }
    }
}

/// Anything that can enumerate named metrics.
pub trait MetricSource: Send + Sync {
    /// Calls `f` once per registered metric. No ordering is promised.
    fn each(&self, f: &mut dyn FnMut(&str, &Metric));
}

pub struct Registry {
    metrics: RwLock<BTreeMap<String, Metric>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, name: &str, metric: Metric) -> Result<()> {
        let mut metrics = self.metrics.write().map_err(|_| {
            MetricsError::InternalError("failed to acquire source registry lock".to_string())
        })?;

        if metrics.contains_key(name) {
            return Err(MetricsError::DuplicateMetric(name.to_string()));
        }

        debug!(metric = %name, kind = metric.kind(), "registered source metric");
        metrics.insert(name.to_string(), metric);
        Ok(())
    }

    /// Returns the metric already registered under `name`, or registers the
    /// one built by `build`.
    pub fn get_or_register(&self, name: &str, build: impl FnOnce() -> Metric) -> Result<Metric> {
        let mut metrics = self.metrics.write().map_err(|_| {
            MetricsError::InternalError("failed to acquire source registry lock".to_string())
        })?;

        Ok(metrics
            .entry(name.to_string())
            .or_insert_with(build)
            .clone())
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().ok()?.get(name).cloned()
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        self.metrics
            .write()
            .map_err(|_| {
                MetricsError::InternalError("failed to acquire source registry lock".to_string())
            })?
            .remove(name);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        match self.metrics.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn register_counter(&self, name: &str) -> Result<Arc<Counter>> {
        let metric = Arc::new(Counter::new());
        self.register(name, Metric::Counter(metric.clone()))?;
        Ok(metric)
    }

    pub fn register_gauge(&self, name: &str) -> Result<Arc<Gauge>> {
        let metric = Arc::new(Gauge::new());
        self.register(name, Metric::Gauge(metric.clone()))?;
        Ok(metric)
    }

    pub fn register_float_gauge(&self, name: &str) -> Result<Arc<FloatGauge>> {
        let metric = Arc::new(FloatGauge::new());
        self.register(name, Metric::FloatGauge(metric.clone()))?;
        Ok(metric)
    }

    pub fn register_histogram(&self, name: &str) -> Result<Arc<Histogram>> {
        let metric = Arc::new(Histogram::new());
        self.register(name, Metric::Histogram(metric.clone()))?;
        Ok(metric)
    }

    pub fn register_meter(&self, name: &str) -> Result<Arc<Meter>> {
        let metric = Arc::new(Meter::new());
        self.register(name, Metric::Meter(metric.clone()))?;
        Ok(metric)
    }

    pub fn register_timer(&self, name: &str) -> Result<Arc<Timer>> {
        let metric = Arc::new(Timer::new());
        self.register(name, Metric::Timer(metric.clone()))?;
        Ok(metric)
    }

    pub fn register_distribution(&self, name: &str, bounds: &[f64]) -> Result<Arc<Distribution>> {
        let metric = Arc::new(Distribution::new(bounds)?);
        self.register(name, Metric::Distribution(metric.clone()))?;
        Ok(metric)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for Registry {
    /// Iterates a copy of the entries in name order, so `f` may register or
    /// unregister metrics without deadlocking.
    fn each(&self, f: &mut dyn FnMut(&str, &Metric)) {
        let entries = match self.metrics.read() {
            Ok(guard) => guard
                .iter()
                .map(|(name, metric)| (name.clone(), metric.clone()))
                .collect::<Vec<_>>(),
            Err(_) => return,
        };

        for (name, metric) in &entries {
            f(name, metric);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metricbridge_common::MetricsError;

    use super::{Metric, MetricSource, Registry};
    use crate::{counter::Counter, meter::Ewma};

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = Registry::new();
        registry.register_counter("requests").unwrap();

        let err = registry.register_gauge("requests").unwrap_err();
        assert!(matches!(err, MetricsError::DuplicateMetric(name) if name == "requests"));
    }

    #[test]
    fn get_or_register_keeps_first_metric() {
        let registry = Registry::new();
        let counter = registry.register_counter("requests").unwrap();
        counter.inc(3);

        let metric = registry
            .get_or_register("requests", || Metric::Counter(Arc::new(Counter::new())))
            .unwrap();
        let Metric::Counter(existing) = metric else {
            panic!("expected a counter");
        };
        assert_eq!(existing.count(), 3);
    }

    #[test]
    fn each_visits_every_metric_in_name_order() {
        let registry = Registry::new();
        registry.register_meter("b.meter").unwrap();
        registry.register_counter("a.counter").unwrap();
        registry
            .register("c.ewma", Metric::Ewma(Arc::new(Ewma::one_minute())))
            .unwrap();

        let mut seen = Vec::new();
        registry.each(&mut |name, metric| seen.push((name.to_string(), metric.kind())));

        assert_eq!(
            seen,
            vec![
                ("a.counter".to_string(), "counter"),
                ("b.meter".to_string(), "meter"),
                ("c.ewma".to_string(), "ewma"),
            ]
        );
    }

    #[test]
    fn callback_may_mutate_registry() {
        let registry = Registry::new();
        registry.register_counter("first").unwrap();

        registry.each(&mut |name, _| {
            registry.unregister(name).unwrap();
        });
        assert!(registry.is_empty());
    }
}
