pub mod error;
pub mod labels;

pub use error::{MetricsError, Result};
pub use labels::{Labels, render_label_set};
