//! Application-side metrics registry.
//!
//! Metrics are registered by name and read back through point-in-time
//! snapshots. Nothing here knows about exposition; the bridge crate walks a
//! [`MetricSource`] and republishes what it finds.

pub mod counter;
pub mod distribution;
pub mod gauge;
pub mod histogram;
pub mod meter;
pub mod registry;
pub mod timer;

pub use counter::Counter;
pub use distribution::{Distribution, DistributionSnapshot};
pub use gauge::{FloatGauge, Gauge};
pub use histogram::{DEFAULT_RESERVOIR_SIZE, Histogram, HistogramSnapshot};
pub use meter::{Ewma, Meter, MeterSnapshot};
pub use registry::{Metric, MetricSource, Registry};
pub use timer::{Timer, TimerSnapshot};
