use thiserror::Error;

/// Fatal start-up failure. A sensor instance that hits one of these never
/// processes data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("parameter \"{name}\" not provided")]
    MissingParameter { name: &'static str },
    #[error("parameter \"{name}\" incorrect: {value:?} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("unknown model {name:?}")]
    UnknownModel { name: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("sample at {timestamp} has no value")]
    MissingValue { timestamp: i64 },
    #[error("sample at {timestamp} is not finite")]
    NonFinite { timestamp: i64 },
    #[error("malformed sample: {reason}")]
    Malformed { reason: String },
}

/// Contract violation while fitting a window. Distinct from publish errors:
/// this aborts the current window.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("window is empty")]
    EmptyWindow,
    #[error("window columns disagree: {timestamps} timestamps, {values} values")]
    LengthMismatch { timestamps: usize, values: usize },
    #[error("unknown model id {id}")]
    UnknownModel { id: u8 },
    #[error("model produced a non-finite estimate at index {index}")]
    NonFiniteFit { index: usize },
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transport failure for {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("metadata server rejected request with status {status}")]
    Rejected { status: u16 },
    #[error("publish queue is full")]
    QueueFull,
    #[error("publisher worker is gone")]
    WorkerClosed,
}
