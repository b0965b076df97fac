use std::hash::{DefaultHasher, Hash, Hasher};

use metricbridge_common::Labels;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

/// Joins the non-empty parts with `_`. An empty `name` yields an empty
/// string regardless of the prefixes.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Naming options for a metric family.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    pub namespace: String,
    pub subsystem: String,
    pub name: String,
    pub help: String,
    pub const_labels: Labels,
}

impl Opts {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            ..Self::default()
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = subsystem.into();
        self
    }

    pub fn const_labels(mut self, labels: Labels) -> Self {
        self.const_labels = labels;
        self
    }

    pub fn fq_name(&self) -> String {
        build_fq_name(&self.namespace, &self.subsystem, &self.name)
    }

    pub fn describe(&self, variable_labels: &[String]) -> Desc {
        Desc::new(
            self.fq_name(),
            self.help.clone(),
            variable_labels.to_vec(),
            self.const_labels.clone(),
        )
    }
}

/// Static description of one metric family a collector produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desc {
    pub fq_name: String,
    pub help: String,
    pub variable_labels: Vec<String>,
    pub const_labels: Labels,
}

impl Desc {
    pub fn new(
        fq_name: impl Into<String>,
        help: impl Into<String>,
        variable_labels: Vec<String>,
        const_labels: Labels,
    ) -> Self {
        Self {
            fq_name: fq_name.into(),
            help: help.into(),
            variable_labels,
            const_labels,
        }
    }

    /// Identity of the series set: name plus constant label values.
    pub fn id(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.fq_name.hash(&mut hasher);
        for value in self.const_labels.values() {
            value.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Shape of the family: help text plus every label name, sorted.
    pub fn dim_hash(&self) -> u64 {
        let mut names = self
            .const_labels
            .keys()
            .chain(self.variable_labels.iter())
            .collect::<Vec<_>>();
        names.sort();

        let mut hasher = DefaultHasher::new();
        self.help.hash(&mut hasher);
        names.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    /// `buckets` hold cumulative counts per upper bound, without `+Inf`.
    Histogram {
        buckets: Vec<(f64, u64)>,
        count: u64,
        sum: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub labels: Vec<(String, String)>,
    pub value: MetricValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub samples: Vec<MetricSample>,
}

impl MetricFamily {
    /// First sample whose labels contain every `(name, value)` in `labels`.
    pub fn sample_with(&self, labels: &[(&str, &str)]) -> Option<&MetricSample> {
        self.samples.iter().find(|sample| {
            labels.iter().all(|(name, value)| {
                sample
                    .labels
                    .iter()
                    .any(|(key, existing)| key == name && existing == value)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use metricbridge_common::Labels;

    use super::{Desc, Opts, build_fq_name};

    #[test]
    fn fq_name_skips_empty_parts() {
        assert_eq!(build_fq_name("test", "subsys", "counter"), "test_subsys_counter");
        assert_eq!(build_fq_name("", "subsys", "counter"), "subsys_counter");
        assert_eq!(build_fq_name("test", "", "counter"), "test_counter");
        assert_eq!(build_fq_name("test", "subsys", ""), "");
    }

    #[test]
    fn dim_hash_ignores_label_order() {
        let left = Desc::new(
            "m",
            "help",
            vec!["a".to_string(), "b".to_string()],
            Labels::new(),
        );
        let right = Desc::new(
            "m",
            "help",
            vec!["b".to_string(), "a".to_string()],
            Labels::new(),
        );
        assert_eq!(left.id(), right.id());
        assert_eq!(left.dim_hash(), right.dim_hash());

        let other_help = Desc::new("m", "other", vec![], Labels::new());
        assert_ne!(left.dim_hash(), other_help.dim_hash());
    }

    #[test]
    fn opts_describe_uses_fq_name() {
        let desc = Opts::new("requests", "Requests")
            .namespace("app")
            .subsystem("http")
            .describe(&["code".to_string()]);
        assert_eq!(desc.fq_name, "app_http_requests");
        assert_eq!(desc.variable_labels, vec!["code".to_string()]);
    }
}
