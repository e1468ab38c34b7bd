use crate::engine::CleanedRecord;
use crate::error::PublishError;
use crate::params::{Credentials, MetadataTarget};
use crate::sample::format_iso_millis;
use crate::stats::CleaningStats;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use url::Url;

pub const DEFAULT_PUBLISH_QUEUE: usize = 256;

/// A single dirty point. `from_timestamp` and `to_timestamp` are both the
/// point's own timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirtyEvent {
    pub raw: f64,
    pub processed: f64,
    pub dirtiness: f64,
    pub from_timestamp: i64,
    pub to_timestamp: i64,
}

impl DirtyEvent {
    pub fn from_record(record: &CleanedRecord) -> Self {
        Self {
            raw: record.stream,
            processed: record.processed,
            dirtiness: record.dirtiness,
            from_timestamp: record.timestamp,
            to_timestamp: record.timestamp,
        }
    }
}

/// A fully-built metadata GET: the XML payload travels in the `request`
/// query parameter of `url`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub url: Url,
    pub xml: String,
    pub credentials: Option<Credentials>,
    pub event: DirtyEvent,
}

impl PublishRequest {
    pub fn build(target: &MetadataTarget, event: DirtyEvent) -> Option<Self> {
        let from = format_iso_millis(event.from_timestamp)?;
        let to = format_iso_millis(event.to_timestamp)?;
        let xml = target.template.render(&from, &to, event.dirtiness);

        let mut url = target.server_url.clone();
        url.query_pairs_mut().append_pair("request", &xml);

        Some(Self {
            url,
            xml,
            credentials: target.credentials.clone(),
            event,
        })
    }
}

/// Delivers metadata requests to the outside world. Implementations report
/// failures through the returned error; the worker logs and discards them.
pub trait MetadataPublisher: Send + Sync + 'static {
    fn publish(
        &self,
        request: &PublishRequest,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Logs the request it would have sent.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

impl MetadataPublisher for LogPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        tracing::info!(
            url = %request.url,
            authenticated = request.credentials.is_some(),
            dirtiness = request.event.dirtiness,
            "metadata request"
        );
        Ok(())
    }
}

/// Sending side of the publisher worker's bounded queue.
#[derive(Clone, Debug)]
pub struct PublisherHandle {
    tx: mpsc::Sender<PublishRequest>,
}

impl PublisherHandle {
    /// Never waits: a full or closed queue drops the request.
    pub fn try_enqueue(&self, request: PublishRequest) -> Result<(), PublishError> {
        match self.tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PublishError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(PublishError::WorkerClosed),
        }
    }
}

/// Spawns the publishing worker on the current tokio runtime. The worker
/// exits once every handle is dropped and the queue has drained.
pub fn spawn_publisher<P: MetadataPublisher>(
    publisher: P,
    queue: usize,
    stats: Arc<CleaningStats>,
) -> (PublisherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue.max(1));
    let handle = tokio::spawn(async move {
        run_publisher(publisher, rx, stats).await;
    });
    (PublisherHandle { tx }, handle)
}

async fn run_publisher<P: MetadataPublisher>(
    publisher: P,
    mut rx: mpsc::Receiver<PublishRequest>,
    stats: Arc<CleaningStats>,
) {
    while let Some(request) = rx.recv().await {
        match publisher.publish(&request).await {
            Ok(()) => CleaningStats::bump(&stats.events_published),
            Err(err) => {
                CleaningStats::bump(&stats.publish_failures);
                stats.record_error(err.to_string());
                tracing::warn!(
                    error = %err,
                    url = %request.url,
                    "error while trying to post to metadata server"
                );
            }
        }
    }
    tracing::debug!("metadata publisher stopped");
}

/// Turns dirty records into publish requests. Publication is best-effort:
/// nothing here can fail the caller.
#[derive(Debug)]
pub struct DirtySegmentReporter {
    target: MetadataTarget,
    publisher: PublisherHandle,
    stats: Arc<CleaningStats>,
}

impl DirtySegmentReporter {
    pub fn new(
        target: MetadataTarget,
        publisher: PublisherHandle,
        stats: Arc<CleaningStats>,
    ) -> Self {
        Self {
            target,
            publisher,
            stats,
        }
    }

    pub fn target(&self) -> &MetadataTarget {
        &self.target
    }

    pub fn report(&self, record: &CleanedRecord) {
        if !record.is_dirty() {
            return;
        }
        let event = DirtyEvent::from_record(record);
        let Some(request) = PublishRequest::build(&self.target, event) else {
            CleaningStats::bump(&self.stats.events_dropped);
            tracing::warn!(
                timestamp = record.timestamp,
                "dirty point timestamp out of range; not published"
            );
            return;
        };
        match self.publisher.try_enqueue(request) {
            Ok(()) => CleaningStats::bump(&self.stats.events_queued),
            Err(err) => {
                CleaningStats::bump(&self.stats.events_dropped);
                tracing::warn!(error = %err, timestamp = record.timestamp, "dropping dirty event");
            }
        }
    }
}
