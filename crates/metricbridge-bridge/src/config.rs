use std::{path::Path, time::Duration};

use metricbridge_common::{
    Labels,
    error::{MetricsError, Result},
};
use metricbridge_exporter::registry::is_valid_label_name;
use serde::Deserialize;

pub const DEFAULT_HISTOGRAM_BUCKETS: [f64; 8] = [0.05, 0.1, 0.25, 0.50, 0.75, 0.9, 0.95, 0.99];
pub const DEFAULT_TIMER_BUCKETS: [f64; 4] = [0.50, 0.95, 0.99, 0.999];
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1_000;

/// How meters and timers are published. Fixed for the lifetime of a
/// publisher; the two shapes are not compatible with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatePolicy {
    /// One gauge family per metric with a `rate_unit` label per statistic.
    #[default]
    Labeled,
    /// A single unlabeled gauge holding the one-minute rate.
    Rate1Only,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub namespace: String,
    pub subsystem: String,
    pub flush_interval_ms: u64,
    /// Percentile cut-points (0–1) for histogram metrics.
    pub histogram_buckets: Vec<f64>,
    /// Percentile cut-points (0–1) for timer metrics.
    pub timer_buckets: Vec<f64>,
    /// Static labels added to every published series.
    pub labels: Labels,
    pub rate_policy: RatePolicy,
    /// Split `-for-broker-<id>` / `-for-topic-<name>` suffixes into labels.
    pub structured_names: bool,
    /// Also publish a histogram's most recent sample as a gauge.
    pub publish_last_sample: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            subsystem: String::new(),
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS.to_vec(),
            timer_buckets: DEFAULT_TIMER_BUCKETS.to_vec(),
            labels: Labels::new(),
            rate_policy: RatePolicy::default(),
            structured_names: true,
            publish_last_sample: true,
        }
    }
}

impl BridgeConfig {
    pub fn new(namespace: impl Into<String>, subsystem: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            subsystem: subsystem.into(),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_histogram_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.histogram_buckets = buckets;
        self
    }

    pub fn with_timer_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.timer_buckets = buckets;
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_rate_policy(mut self, policy: RatePolicy) -> Self {
        self.rate_policy = policy;
        self
    }

    pub fn with_structured_names(mut self, enabled: bool) -> Self {
        self.structured_names = enabled;
        self
    }

    pub fn with_last_sample(mut self, enabled: bool) -> Self {
        self.publish_last_sample = enabled;
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_interval_ms == 0 {
            return Err(MetricsError::InvalidConfig(
                "flush interval must be positive".to_string(),
            ));
        }
        validate_buckets("histogram_buckets", &self.histogram_buckets)?;
        validate_buckets("timer_buckets", &self.timer_buckets)?;

        if let Some(name) = self.labels.keys().find(|name| !is_valid_label_name(name)) {
            return Err(MetricsError::InvalidConfig(format!(
                "invalid static label name: {name:?}"
            )));
        }
        Ok(())
    }
}

fn validate_buckets(field: &str, buckets: &[f64]) -> Result<()> {
    if buckets.is_empty() {
        return Err(MetricsError::InvalidConfig(format!("{field} must not be empty")));
    }
    if buckets
        .iter()
        .any(|bucket| !(0.0..=1.0).contains(bucket))
    {
        return Err(MetricsError::InvalidConfig(format!(
            "{field} must be percentiles between 0 and 1"
        )));
    }
    if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(MetricsError::InvalidConfig(format!(
            "{field} must be strictly increasing"
        )));
    }
    Ok(())
}
