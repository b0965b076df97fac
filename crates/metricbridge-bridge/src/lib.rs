//! Bridge from an in-process metrics registry to a pull-based exporter.
//!
//! ```text
//! Publisher
//!   ├── publish_once() ← walks the source registry, writes exporter series
//!   └── run(interval)  → publish_once() immediately, then every interval
//!
//! HistogramCollector
//!   └── holds one precomputed ConstHistogram, replayed on every gather
//! ```
//!
//! Counters and gauges become gauge series. Meters and timers become a gauge
//! family with one `rate_unit` label value per statistic (or a single rate1
//! gauge, see [`RatePolicy`]). Histograms and timers also publish a
//! distribution series whose buckets are the sampled values at the configured
//! percentiles.

pub mod collector;
pub mod config;
pub mod naming;
pub mod publisher;

pub use collector::HistogramCollector;
pub use config::{BridgeConfig, RatePolicy};
pub use naming::{StructuredName, extract_structured, flatten, identity_key};
pub use publisher::Publisher;
