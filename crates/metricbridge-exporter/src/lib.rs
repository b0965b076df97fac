pub mod encoding;
pub mod gauge;
pub mod histogram;
pub mod registry;
pub mod types;

pub use encoding::{TEXT_CONTENT_TYPE, render_text};
pub use gauge::{Gauge, GaugeVec};
pub use histogram::ConstHistogram;
pub use registry::{Collector, RegisterError, Registerer, Registry};
pub use types::{Desc, MetricFamily, MetricSample, MetricType, MetricValue, Opts, build_fq_name};
