use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric already registered: {0}")]
    DuplicateMetric(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to register series {series}: {reason}")]
    Registration { series: String, reason: String },
    #[error("label mismatch for {name}: expected {expected:?}, got {got:?}")]
    LabelMismatch {
        name: String,
        expected: Vec<String>,
        got: Vec<String>,
    },
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MetricsError {
    /// Registration failures halt the affected series; every other error is
    /// scoped to a single metric in a single publish cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Registration { .. })
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
