use std::{
    any::Any,
    collections::{BTreeMap, HashMap, HashSet, btree_map::Entry},
    fmt,
    sync::{Arc, RwLock},
};

use thiserror::Error;
use tracing::warn;

use crate::types::{Desc, MetricFamily};

/// Source of metric families, polled on every gather.
pub trait Collector: fmt::Debug + Send + Sync + 'static {
    /// Descriptors of every family this collector can produce. A collector
    /// that returns none is registered unchecked: it is never reported as a
    /// duplicate and its output is only validated at gather time.
    fn describe(&self) -> Vec<Desc>;

    fn collect(&self) -> Vec<MetricFamily>;

    /// Type-erased handle, used to recover the concrete collector from
    /// [`RegisterError::AlreadyRegistered`].
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("collector already registered: {name}")]
    AlreadyRegistered {
        name: String,
        existing: Arc<dyn Collector>,
    },
    #[error("invalid metric name: {0:?}")]
    InvalidMetricName(String),
    #[error("invalid label name {label:?} on metric {metric}")]
    InvalidLabelName { metric: String, label: String },
    #[error("descriptor {0} already registered with different help or label names")]
    InconsistentDescriptor(String),
    #[error("descriptor {0} already registered by another collector")]
    DuplicateDescriptor(String),
    #[error("exporter registry lock poisoned")]
    Poisoned,
}

/// Accepts collectors. Split from [`Registry`] so callers can be handed a
/// registration-only view.
pub trait Registerer: Send + Sync {
    fn register(&self, collector: Arc<dyn Collector>) -> Result<(), RegisterError>;
}

#[derive(Default)]
struct RegistryInner {
    collectors: HashMap<u64, Arc<dyn Collector>>,
    desc_ids: HashSet<u64>,
    dim_hashes: HashMap<String, u64>,
    unchecked: Vec<Arc<dyn Collector>>,
}

pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Collects every registered collector and merges families sharing a
    /// name. Families are sorted by name and samples by label set; empty
    /// families are dropped.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let collectors = match self.inner.read() {
            Ok(guard) => guard
                .collectors
                .values()
                .chain(guard.unchecked.iter())
                .cloned()
                .collect::<Vec<_>>(),
            Err(_) => return Vec::new(),
        };

        let mut families: BTreeMap<String, MetricFamily> = BTreeMap::new();
        let mut seen: HashSet<(String, Vec<(String, String)>)> = HashSet::new();

        for collector in collectors {
            for mut family in collector.collect() {
                family.samples.retain(|sample| {
                    let fresh = seen.insert((family.name.clone(), sample.labels.clone()));
                    if !fresh {
                        warn!(
                            metric = %family.name,
                            labels = ?sample.labels,
                            "dropping sample collected twice with the same labels"
                        );
                    }
                    fresh
                });

                match families.entry(family.name.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(family);
                    }
                    Entry::Occupied(mut slot) => {
                        let merged = slot.get_mut();
                        if merged.metric_type != family.metric_type {
                            warn!(
                                metric = %family.name,
                                expected = merged.metric_type.as_prometheus_type(),
                                got = family.metric_type.as_prometheus_type(),
                                "dropping family collected with conflicting types"
                            );
                            continue;
                        }
                        merged.samples.extend(family.samples);
                    }
                }
            }
        }

        families
            .into_values()
            .filter(|family| !family.samples.is_empty())
            .map(|mut family| {
                family
                    .samples
                    .sort_by(|left, right| left.labels.cmp(&right.labels));
                family
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|guard| guard.collectors.len() + guard.unchecked.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registerer for Registry {
    fn register(&self, collector: Arc<dyn Collector>) -> Result<(), RegisterError> {
        let descs = collector.describe();
        let mut inner = self.inner.write().map_err(|_| RegisterError::Poisoned)?;

        if descs.is_empty() {
            inner.unchecked.push(collector);
            return Ok(());
        }

        let mut collector_id = 0_u64;
        let mut new_desc_ids = HashSet::new();
        let mut pending_dims: HashMap<String, u64> = HashMap::new();
        let mut duplicate = None;
        let mut seen_in_collector = HashSet::new();

        for desc in &descs {
            validate_desc(desc)?;

            let desc_id = desc.id();
            if inner.desc_ids.contains(&desc_id) {
                duplicate = Some(desc.fq_name.clone());
            } else {
                new_desc_ids.insert(desc_id);
            }
            if seen_in_collector.insert(desc_id) {
                collector_id ^= desc_id;
            }

            let dim_hash = desc.dim_hash();
            let known = inner
                .dim_hashes
                .get(&desc.fq_name)
                .or_else(|| pending_dims.get(&desc.fq_name))
                .copied();
            match known {
                Some(existing) if existing != dim_hash => {
                    return Err(RegisterError::InconsistentDescriptor(desc.fq_name.clone()));
                }
                Some(_) => {}
                None => {
                    pending_dims.insert(desc.fq_name.clone(), dim_hash);
                }
            }
        }

        if let Some(existing) = inner.collectors.get(&collector_id) {
            return Err(RegisterError::AlreadyRegistered {
                name: descs[0].fq_name.clone(),
                existing: Arc::clone(existing),
            });
        }
        if let Some(name) = duplicate {
            return Err(RegisterError::DuplicateDescriptor(name));
        }

        inner.collectors.insert(collector_id, collector);
        inner.desc_ids.extend(new_desc_ids);
        inner.dim_hashes.extend(pending_dims);
        Ok(())
    }
}

fn validate_desc(desc: &Desc) -> Result<(), RegisterError> {
    if !is_valid_metric_name(&desc.fq_name) {
        return Err(RegisterError::InvalidMetricName(desc.fq_name.clone()));
    }

    let mut names = HashSet::new();
    for label in desc.const_labels.keys().chain(desc.variable_labels.iter()) {
        if !is_valid_label_name(label) || !names.insert(label.as_str()) {
            return Err(RegisterError::InvalidLabelName {
                metric: desc.fq_name.clone(),
                label: label.clone(),
            });
        }
    }
    Ok(())
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, excluding the reserved `__` prefix.
pub fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
