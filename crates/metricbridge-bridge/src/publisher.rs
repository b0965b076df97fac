use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use metricbridge_common::{
    Labels,
    error::{MetricsError, Result},
    render_label_set,
};
use metricbridge_exporter::{
    gauge::GaugeVec,
    histogram::ConstHistogram,
    registry::{Collector, RegisterError, Registerer, is_valid_metric_name},
    types::{Desc, Opts, build_fq_name},
};
use metricbridge_source::{Metric, MetricSource};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    collector::HistogramCollector,
    config::{BridgeConfig, RatePolicy},
    naming::{StructuredName, extract_structured, flatten, identity_key},
};

const RATE_UNIT_LABEL: &str = "rate_unit";

/// Walks a [`MetricSource`] and mirrors every metric into exporter series.
///
/// Series are registered lazily the first time their identity key is seen
/// and cached for the lifetime of the publisher. Nothing is ever evicted: a
/// metric removed from the source keeps exporting its last value.
pub struct Publisher {
    config: BridgeConfig,
    source: Arc<dyn MetricSource>,
    registerer: Arc<dyn Registerer>,
    gauges: Mutex<HashMap<String, Arc<GaugeVec>>>,
    histograms: Mutex<HashMap<String, Arc<HistogramCollector>>>,
    /// Keys whose registration failed; they are never retried.
    halted: Mutex<HashSet<String>>,
}

impl Publisher {
    pub fn new(
        config: BridgeConfig,
        source: Arc<dyn MetricSource>,
        registerer: Arc<dyn Registerer>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            registerer,
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            halted: Mutex::new(HashSet::new()),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Publishes every metric currently in the source once.
    ///
    /// A failure on one metric never stops the others. The first fatal
    /// registration failure of the cycle is returned after the walk;
    /// everything else is logged and skipped.
    pub fn publish_once(&self) -> Result<()> {
        let mut fatal = None;
        let mut visited = 0_usize;

        self.source.each(&mut |name, metric| {
            visited += 1;
            self.publish_metric(name, metric, &mut fatal);
        });

        debug!(
            metrics = visited,
            failed = fatal.is_some(),
            "publish cycle finished"
        );
        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Publishes immediately, then once per `interval` until the future is
    /// dropped. Ticks missed while a cycle runs long are delayed, not
    /// bursted.
    pub async fn run(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(MetricsError::InvalidArgument(
                "publish interval must be positive".to_string(),
            ));
        }

        info!(
            namespace = %self.config.namespace,
            subsystem = %self.config.subsystem,
            interval_ms = interval.as_millis() as u64,
            "metric publisher started"
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.publish_once() {
                warn!(error = %err, "publish cycle reported a failure");
            }
        }
    }

    /// Runs [`run`](Self::run) on the configured flush interval in a
    /// background task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let interval = self.config.flush_interval();
            self.run(interval).await
        })
    }

    fn publish_metric(&self, raw_name: &str, metric: &Metric, fatal: &mut Option<MetricsError>) {
        let structured = if self.config.structured_names {
            extract_structured(raw_name)
        } else {
            StructuredName::literal(raw_name)
        };
        let mut labels = self.config.labels.clone();
        labels.extend(structured.labels);
        let name = structured.name.as_str();

        match metric {
            Metric::Counter(counter) => {
                record(raw_name, self.publish_gauge(name, &labels, counter.count() as f64), fatal);
            }
            Metric::Gauge(gauge) => {
                record(raw_name, self.publish_gauge(name, &labels, gauge.value() as f64), fatal);
            }
            Metric::FloatGauge(gauge) => {
                record(raw_name, self.publish_gauge(name, &labels, gauge.value()), fatal);
            }
            Metric::Histogram(histogram) => {
                let snapshot = histogram.snapshot();
                if self.config.publish_last_sample
                    && let Some(last) = snapshot.last()
                {
                    record(raw_name, self.publish_gauge(name, &labels, last as f64), fatal);
                }

                let bounds = &self.config.histogram_buckets;
                let result = self.publish_distribution(
                    name,
                    "histogram",
                    &labels,
                    sample_count(snapshot.count()),
                    snapshot.sum() as f64,
                    percentile_buckets(bounds, &snapshot.percentiles(bounds)),
                );
                record(raw_name, result, fatal);
            }
            Metric::Meter(meter) => {
                let snapshot = meter.snapshot();
                let result = match self.config.rate_policy {
                    RatePolicy::Labeled => self.publish_rate_units(
                        name,
                        &labels,
                        &[
                            ("count", snapshot.count() as f64),
                            ("rate1", snapshot.rate1()),
                            ("rate5", snapshot.rate5()),
                            ("rate15", snapshot.rate15()),
                            ("rate_mean", snapshot.rate_mean()),
                        ],
                    ),
                    RatePolicy::Rate1Only => self.publish_gauge(name, &labels, snapshot.rate1()),
                };
                record(raw_name, result, fatal);
            }
            Metric::Timer(timer) => {
                let snapshot = timer.snapshot();
                let result = match self.config.rate_policy {
                    RatePolicy::Labeled => self.publish_rate_units(
                        name,
                        &labels,
                        &[
                            ("count", snapshot.count() as f64),
                            ("rate1", snapshot.rate1()),
                            ("rate5", snapshot.rate5()),
                            ("rate15", snapshot.rate15()),
                            ("rate_mean", snapshot.rate_mean()),
                            ("sum", snapshot.sum() as f64),
                            ("max", snapshot.max() as f64),
                            ("min", snapshot.min() as f64),
                            ("mean", snapshot.mean()),
                            ("variance", snapshot.variance()),
                            ("std_dev", snapshot.std_dev()),
                        ],
                    ),
                    RatePolicy::Rate1Only => self.publish_gauge(name, &labels, snapshot.rate1()),
                };
                record(raw_name, result, fatal);

                let bounds = &self.config.timer_buckets;
                let result = self.publish_distribution(
                    name,
                    "timer",
                    &labels,
                    sample_count(snapshot.count()),
                    snapshot.sum() as f64,
                    percentile_buckets(bounds, &snapshot.percentiles(bounds)),
                );
                record(raw_name, result, fatal);
            }
            Metric::Distribution(distribution) => {
                let snapshot = distribution.snapshot();
                let result = self.publish_distribution(
                    name,
                    "distribution",
                    &labels,
                    snapshot.count(),
                    snapshot.sum(),
                    snapshot.buckets().to_vec(),
                );
                record(raw_name, result, fatal);
            }
            other => {
                debug!(metric = %raw_name, kind = other.kind(), "skipping unsupported metric kind");
            }
        }
    }

    fn publish_gauge(&self, name: &str, labels: &Labels, value: f64) -> Result<()> {
        let Some(family) = self.gauge_vec(name, labels)? else {
            return Ok(());
        };
        family.with(labels)?.set(value);
        Ok(())
    }

    fn publish_rate_units(&self, name: &str, labels: &Labels, values: &[(&str, f64)]) -> Result<()> {
        let mut labels = labels.clone();
        labels.insert(RATE_UNIT_LABEL.to_string(), String::new());
        let Some(family) = self.gauge_vec(name, &labels)? else {
            return Ok(());
        };

        for (unit, value) in values {
            labels.insert(RATE_UNIT_LABEL.to_string(), (*unit).to_string());
            family.with(&labels)?.set(*value);
        }
        Ok(())
    }

    fn publish_distribution(
        &self,
        name: &str,
        suffix: &str,
        labels: &Labels,
        count: u64,
        sum: f64,
        buckets: Vec<(f64, u64)>,
    ) -> Result<()> {
        let series = format!("{}_{suffix}", flatten(name));
        let fq_name = build_fq_name(
            &flatten(&self.config.namespace),
            &flatten(&self.config.subsystem),
            &series,
        );
        let Some(collector) = self.histogram_collector(&series, &fq_name, labels)? else {
            return Ok(());
        };

        let desc = Desc::new(
            fq_name,
            flatten(name),
            labels.keys().cloned().collect(),
            Labels::new(),
        );
        let histogram =
            ConstHistogram::new(desc, count, sum, buckets, labels.values().cloned().collect())?;
        collector.update(histogram);
        Ok(())
    }

    /// Cached gauge family for `name`, registering it on first use. `None`
    /// means the family was halted by an earlier registration failure.
    fn gauge_vec(&self, name: &str, labels: &Labels) -> Result<Option<Arc<GaugeVec>>> {
        let key = identity_key(&self.config.namespace, &self.config.subsystem, name);
        let mut gauges = self.gauges.lock().map_err(|_| {
            MetricsError::InternalError("failed to acquire gauge cache lock".to_string())
        })?;

        if let Some(existing) = gauges.get(&key) {
            return Ok(Some(existing.clone()));
        }
        if self.is_halted(&key)? {
            return Ok(None);
        }

        let flat_name = flatten(name);
        let opts = Opts::new(flat_name.clone(), flat_name)
            .namespace(flatten(&self.config.namespace))
            .subsystem(flatten(&self.config.subsystem));
        let label_names = labels.keys().cloned().collect::<Vec<_>>();
        let family = Arc::new(GaugeVec::new(opts, &label_names));

        match self.register_or_reuse(&key, family) {
            Ok(family) => {
                debug!(series = %key, "registered gauge series");
                gauges.insert(key, family.clone());
                Ok(Some(family))
            }
            Err(err) => {
                self.halt(key)?;
                Err(err)
            }
        }
    }

    /// One collector per distribution series and label set, since each
    /// collector replays exactly one snapshot.
    fn histogram_collector(
        &self,
        series: &str,
        fq_name: &str,
        labels: &Labels,
    ) -> Result<Option<Arc<HistogramCollector>>> {
        let key = format!(
            "{}{}",
            identity_key(&self.config.namespace, &self.config.subsystem, series),
            render_label_set(labels)
        );
        let mut histograms = self.histograms.lock().map_err(|_| {
            MetricsError::InternalError("failed to acquire histogram cache lock".to_string())
        })?;

        if let Some(existing) = histograms.get(&key) {
            return Ok(Some(existing.clone()));
        }
        if self.is_halted(&key)? {
            return Ok(None);
        }

        // Unchecked collectors skip the registry's name validation.
        let registered = if is_valid_metric_name(fq_name) {
            self.register_or_reuse(&key, Arc::new(HistogramCollector::new()))
        } else {
            Err(MetricsError::Registration {
                series: key.clone(),
                reason: format!("invalid metric name: {fq_name:?}"),
            })
        };

        match registered {
            Ok(collector) => {
                debug!(series = %key, "registered histogram series");
                histograms.insert(key, collector.clone());
                Ok(Some(collector))
            }
            Err(err) => {
                self.halt(key)?;
                Err(err)
            }
        }
    }

    /// Registers `collector`, or returns the collector already registered
    /// under the same descriptors when it has the same type.
    fn register_or_reuse<C: Collector>(&self, series: &str, collector: Arc<C>) -> Result<Arc<C>> {
        match self.registerer.register(collector.clone()) {
            Ok(()) => Ok(collector),
            Err(RegisterError::AlreadyRegistered { existing, .. }) => existing
                .into_any()
                .downcast::<C>()
                .map_err(|_| MetricsError::Registration {
                    series: series.to_string(),
                    reason: "already registered with a different collector type".to_string(),
                }),
            Err(err) => Err(MetricsError::Registration {
                series: series.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn is_halted(&self, key: &str) -> Result<bool> {
        let halted = self.halted.lock().map_err(|_| {
            MetricsError::InternalError("failed to acquire halted series lock".to_string())
        })?;
        Ok(halted.contains(key))
    }

    fn halt(&self, key: String) -> Result<()> {
        self.halted
            .lock()
            .map_err(|_| {
                MetricsError::InternalError("failed to acquire halted series lock".to_string())
            })?
            .insert(key);
        Ok(())
    }
}

fn record(metric: &str, result: Result<()>, fatal: &mut Option<MetricsError>) {
    match result {
        Ok(()) => {}
        Err(err) if err.is_fatal() => {
            error!(metric = %metric, error = %err, "series halted after registration failure");
            fatal.get_or_insert(err);
        }
        Err(err) => {
            warn!(metric = %metric, error = %err, "skipping metric for this cycle");
        }
    }
}

/// Pairs each percentile cut-point with the sampled value at that
/// percentile, truncated to an integer.
fn percentile_buckets(bounds: &[f64], values: &[f64]) -> Vec<(f64, u64)> {
    bounds
        .iter()
        .zip(values.iter())
        .map(|(bound, value)| (*bound, *value as u64))
        .collect()
}

fn sample_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}
