use std::{
    any::Any,
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use metricbridge_common::{
    Labels,
    error::{MetricsError, Result},
};

use crate::{
    registry::Collector,
    types::{Desc, MetricFamily, MetricSample, MetricType, MetricValue, Opts},
};

type LabelValues = Vec<String>;

/// Single gauge value, stored as `f64` bits so reads never lock.
#[derive(Debug)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn add(&self, delta: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

/// Family of gauges sharing a name and label names, one child per distinct
/// set of label values.
#[derive(Debug)]
pub struct GaugeVec {
    desc: Desc,
    series: RwLock<HashMap<LabelValues, Arc<Gauge>>>,
}

impl GaugeVec {
    /// Label names are sorted so the child lookup order never depends on
    /// the caller's ordering.
    pub fn new(opts: Opts, label_names: &[String]) -> Self {
        let mut variable_labels = label_names.to_vec();
        variable_labels.sort();

        Self {
            desc: opts.describe(&variable_labels),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    /// Child for the given label set. The label names must match the
    /// family's variable labels exactly.
    pub fn with(&self, labels: &Labels) -> Result<Arc<Gauge>> {
        let matches = labels.len() == self.desc.variable_labels.len()
            && self
                .desc
                .variable_labels
                .iter()
                .all(|name| labels.contains_key(name));
        if !matches {
            return Err(MetricsError::LabelMismatch {
                name: self.desc.fq_name.clone(),
                expected: self.desc.variable_labels.clone(),
                got: labels.keys().cloned().collect(),
            });
        }

        let values = self
            .desc
            .variable_labels
            .iter()
            .filter_map(|name| labels.get(name).cloned())
            .collect::<Vec<_>>();
        self.get_or_create_series(values)
    }

    /// Child for label values given in sorted label-name order.
    pub fn with_label_values(&self, values: &[&str]) -> Result<Arc<Gauge>> {
        if values.len() != self.desc.variable_labels.len() {
            return Err(MetricsError::LabelMismatch {
                name: self.desc.fq_name.clone(),
                expected: self.desc.variable_labels.clone(),
                got: values.iter().map(|value| (*value).to_string()).collect(),
            });
        }
        self.get_or_create_series(values.iter().map(|value| (*value).to_string()).collect())
    }

    fn get_or_create_series(&self, values: LabelValues) -> Result<Arc<Gauge>> {
        if let Ok(guard) = self.series.read()
            && let Some(existing) = guard.get(&values)
        {
            return Ok(existing.clone());
        }

        let mut guard = self.series.write().map_err(|_| {
            MetricsError::InternalError(format!("gauge family {} lock poisoned", self.desc.fq_name))
        })?;
        Ok(guard
            .entry(values)
            .or_insert_with(|| Arc::new(Gauge::new()))
            .clone())
    }
}

impl Collector for GaugeVec {
    fn describe(&self) -> Vec<Desc> {
        vec![self.desc.clone()]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let series = match self.series.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };

        let samples = series
            .iter()
            .map(|(values, gauge)| MetricSample {
                labels: materialize_labels(&self.desc, values),
                value: MetricValue::Gauge(gauge.get()),
            })
            .collect();

        vec![MetricFamily {
            name: self.desc.fq_name.clone(),
            help: self.desc.help.clone(),
            metric_type: MetricType::Gauge,
            samples,
        }]
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Constant labels followed by variable labels, sorted by name.
pub(crate) fn materialize_labels(desc: &Desc, values: &[String]) -> Vec<(String, String)> {
    let mut labels = desc
        .const_labels
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .chain(
            desc.variable_labels
                .iter()
                .zip(values.iter())
                .map(|(name, value)| (name.clone(), value.clone())),
        )
        .collect::<Vec<_>>();
    labels.sort();
    labels
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metricbridge_common::{Labels, MetricsError};

    use super::{Gauge, GaugeVec};
    use crate::{registry::Collector, types::{MetricValue, Opts}};

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn gauge_set_and_add() {
        let gauge = Gauge::new();
        gauge.set(2.0);
        gauge.add(0.5);
        assert_eq!(gauge.get(), 2.5);
    }

    #[test]
    fn same_labels_return_same_child() {
        let vec = GaugeVec::new(Opts::new("meter", "meter"), &["rate_unit".to_string()]);
        let first = vec.with(&labels(&[("rate_unit", "rate1")])).unwrap();
        let second = vec.with_label_values(&["rate1"]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let vec = GaugeVec::new(Opts::new("meter", "meter"), &["rate_unit".to_string()]);
        let err = vec.with(&labels(&[])).unwrap_err();
        assert!(matches!(err, MetricsError::LabelMismatch { .. }));

        let err = vec.with(&labels(&[("kind", "rate1")])).unwrap_err();
        assert!(matches!(err, MetricsError::LabelMismatch { .. }));
    }

    #[test]
    fn collect_includes_const_labels() {
        let opts = Opts::new("meter", "meter")
            .namespace("test")
            .const_labels(labels(&[("env", "prod")]));
        let vec = GaugeVec::new(opts, &["rate_unit".to_string()]);
        vec.with(&labels(&[("rate_unit", "count")])).unwrap().set(15.0);

        let families = vec.collect();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, "test_meter");
        assert_eq!(
            families[0].samples[0].labels,
            vec![
                ("env".to_string(), "prod".to_string()),
                ("rate_unit".to_string(), "count".to_string()),
            ]
        );
        assert_eq!(families[0].samples[0].value, MetricValue::Gauge(15.0));
    }
}
