//! Streaming data cleaning for scalar sensor readings.
//!
//! Samples are buffered into fixed-size tumbling windows. Each full window is
//! fitted with one of a closed set of models, every point is scored by how
//! far it strays from the fit beyond a configured error bound, and dirty
//! points are handed to a best-effort metadata publisher.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod params;
pub mod pipeline;
pub mod reporter;
pub mod sample;
pub mod stats;
pub mod window;

pub use engine::{CleanedRecord, FittedWindow, FittingEngine};
pub use error::{ConfigError, FitError, PublishError, SampleError};
pub use models::{fit_model, ModelKind};
pub use params::{CleaningParams, MetadataTarget, MetadataTemplate};
pub use pipeline::{CleaningPipeline, RecordSink};
pub use reporter::{
    spawn_publisher, DirtyEvent, DirtySegmentReporter, LogPublisher, MetadataPublisher,
    PublishRequest, PublisherHandle,
};
pub use sample::{Reading, Sample};
pub use stats::{CleaningStats, StatsSnapshot};
pub use window::{Window, WindowBuffer};
