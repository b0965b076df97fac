use metricbridge_common::error::{MetricsError, Result};

use crate::{
    gauge::materialize_labels,
    types::{Desc, MetricFamily, MetricSample, MetricType, MetricValue},
};

/// Histogram whose count, sum and cumulative bucket counts were computed
/// elsewhere. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstHistogram {
    desc: Desc,
    label_values: Vec<String>,
    count: u64,
    sum: f64,
    buckets: Vec<(f64, u64)>,
}

impl ConstHistogram {
    /// `buckets` are `(upper bound, cumulative count)` pairs with strictly
    /// increasing bounds. A trailing `+Inf` bound is dropped; the exposition
    /// derives it from `count`.
    pub fn new(
        desc: Desc,
        count: u64,
        sum: f64,
        mut buckets: Vec<(f64, u64)>,
        label_values: Vec<String>,
    ) -> Result<Self> {
        if label_values.len() != desc.variable_labels.len() {
            return Err(MetricsError::LabelMismatch {
                name: desc.fq_name.clone(),
                expected: desc.variable_labels.clone(),
                got: label_values,
            });
        }
        if buckets.iter().any(|(bound, _)| bound.is_nan()) {
            return Err(MetricsError::InvalidArgument(format!(
                "histogram {} has a NaN bucket bound",
                desc.fq_name
            )));
        }
        if buckets.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
            return Err(MetricsError::InvalidArgument(format!(
                "histogram {} bucket bounds must be strictly increasing",
                desc.fq_name
            )));
        }
        if buckets
            .last()
            .is_some_and(|(bound, _)| *bound == f64::INFINITY)
        {
            buckets.pop();
        }

        Ok(Self {
            desc,
            label_values,
            count,
            sum,
            buckets,
        })
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn buckets(&self) -> &[(f64, u64)] {
        &self.buckets
    }

    pub fn to_family(&self) -> MetricFamily {
        MetricFamily {
            name: self.desc.fq_name.clone(),
            help: self.desc.help.clone(),
            metric_type: MetricType::Histogram,
            samples: vec![MetricSample {
                labels: materialize_labels(&self.desc, &self.label_values),
                value: MetricValue::Histogram {
                    buckets: self.buckets.clone(),
                    count: self.count,
                    sum: self.sum,
                },
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use metricbridge_common::{Labels, MetricsError};

    use super::ConstHistogram;
    use crate::types::{Desc, MetricValue};

    fn desc(labels: &[&str]) -> Desc {
        Desc::new(
            "test_subsys_latency_histogram",
            "latency",
            labels.iter().map(|label| label.to_string()).collect(),
            Labels::new(),
        )
    }

    #[test]
    fn builds_family_with_labels() {
        let histogram = ConstHistogram::new(
            desc(&["for_broker"]),
            10,
            55.0,
            vec![(0.5, 5), (0.99, 10)],
            vec!["1".to_string()],
        )
        .unwrap();

        let family = histogram.to_family();
        assert_eq!(family.name, "test_subsys_latency_histogram");
        assert_eq!(
            family.samples[0].labels,
            vec![("for_broker".to_string(), "1".to_string())]
        );
        assert_eq!(
            family.samples[0].value,
            MetricValue::Histogram {
                buckets: vec![(0.5, 5), (0.99, 10)],
                count: 10,
                sum: 55.0,
            }
        );
    }

    #[test]
    fn label_count_must_match() {
        let err = ConstHistogram::new(desc(&["for_broker"]), 0, 0.0, vec![], vec![]).unwrap_err();
        assert!(matches!(err, MetricsError::LabelMismatch { .. }));
    }

    #[test]
    fn bounds_must_increase() {
        let err = ConstHistogram::new(desc(&[]), 0, 0.0, vec![(0.5, 1), (0.5, 2)], vec![])
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidArgument(_)));
    }

    #[test]
    fn trailing_infinity_is_dropped() {
        let histogram = ConstHistogram::new(
            desc(&[]),
            3,
            6.0,
            vec![(1.0, 1), (f64::INFINITY, 3)],
            vec![],
        )
        .unwrap();
        assert_eq!(histogram.buckets(), &[(1.0, 1)]);
    }
}
