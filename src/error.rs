use thiserror::Error;

/// Batch-level failures. Configuration and connectivity errors raised before
/// the record loop abort the whole run; everything else is attributed to a
/// single record by the runner.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("remote store unreachable: {0}")]
    Connectivity(String),

    #[error("document format error: {0}")]
    Format(String),

    #[error("text shaping failed: {0}")]
    Shaping(String),

    #[error("remote store error: {0}")]
    Store(StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BatchError {
    pub fn configuration(message: impl Into<String>) -> Self {
        BatchError::Configuration(message.into())
    }

    pub fn format(message: impl Into<String>) -> Self {
        BatchError::Format(message.into())
    }
}

impl From<StoreError> for BatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unreachable(message) => BatchError::Connectivity(message),
            other => BatchError::Store(other),
        }
    }
}

impl From<lopdf::Error> for BatchError {
    fn from(value: lopdf::Error) -> Self {
        BatchError::Format(format!("pdf error: {value}"))
    }
}

/// Failures reported by a [`crate::RemoteStore`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// The pipeline step a record failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStep {
    Shape,
    Render,
    Compose,
    Deliver,
}

impl RecordStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStep::Shape => "shape",
            RecordStep::Render => "render",
            RecordStep::Compose => "compose",
            RecordStep::Deliver => "deliver",
        }
    }
}

#[derive(Debug, Error)]
#[error("{} failed: {source}", .step.as_str())]
pub struct RecordError {
    pub step: RecordStep,
    #[source]
    pub source: BatchError,
}

impl RecordError {
    pub fn new(step: RecordStep, source: impl Into<BatchError>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}
