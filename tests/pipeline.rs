use dataclean_sidecar::{
    spawn_publisher, CleanedRecord, CleaningPipeline, CleaningStats, MetadataPublisher,
    PublishError, PublishRequest, Sample,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn linear_with_metadata(extra: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut map = params(&[
        ("model", "linear"),
        ("window_size", "3"),
        ("error_bound", "0.5"),
        ("metadata_server_url", "http://meta.example.com/dataclean.php"),
        ("operator", "ops@example.com"),
        ("deployment", "alps"),
        ("station", "st-1"),
        ("sensor", "air_temp"),
    ]);
    map.extend(params(extra));
    map
}

#[derive(Clone, Default)]
struct Recorder {
    requests: Arc<Mutex<Vec<PublishRequest>>>,
    refuse: bool,
    done: Arc<Notify>,
}

impl MetadataPublisher for Recorder {
    async fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.done.notify_one();
        if self.refuse {
            return Err(PublishError::Transport {
                url: request.url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

fn collect(pipeline: &mut CleaningPipeline, samples: &[(i64, f64)]) -> Vec<CleanedRecord> {
    let mut out = Vec::new();
    let mut sink = |record: CleanedRecord| out.push(record);
    for (ts, value) in samples {
        pipeline
            .append(Sample::new(*ts, *value).expect("finite"), &mut sink)
            .expect("fit");
    }
    out
}

#[test]
fn linear_outlier_scenario_without_publication() {
    let mut pipeline = CleaningPipeline::from_params(
        &params(&[("model", "linear"), ("window_size", "3"), ("error_bound", "0.5")]),
        None,
        Arc::new(CleaningStats::new()),
    )
    .expect("valid");

    let records = collect(&mut pipeline, &[(0, 1.0), (1, 2.0), (2, 10.0)]);
    assert_eq!(records.len(), 3);
    let dirty: Vec<i64> = records
        .iter()
        .filter(|r| r.is_dirty())
        .map(|r| r.timestamp)
        .collect();
    assert_eq!(dirty, vec![2]);
    assert_eq!(records[0].dirtiness, 0.0);
    assert_eq!(records[1].dirtiness, 0.0);
    assert_eq!(records[2].stream, 10.0);
    assert_eq!(pipeline.pending(), 0);
}

#[tokio::test]
async fn dirty_point_is_published_as_single_point_xml() {
    let stats = Arc::new(CleaningStats::new());
    let recorder = Recorder::default();
    let requests = recorder.requests.clone();
    let (handle, worker) = spawn_publisher(recorder, 16, stats.clone());

    let mut pipeline =
        CleaningPipeline::from_params(&linear_with_metadata(&[]), Some(handle), stats.clone())
            .expect("valid");
    assert!(pipeline.publishes_metadata());

    collect(&mut pipeline, &[(0, 1.0), (1, 2.0), (2, 10.0)]);
    drop(pipeline);
    worker.await.expect("worker");

    let requests = requests.lock().expect("lock");
    assert_eq!(requests.len(), 1);
    let xml = &requests[0].xml;
    assert!(xml.starts_with("<metadata>\n\t<deployment>alps</deployment>"));
    assert!(xml.contains("<station>st-1</station>"));
    assert!(xml.contains("<from>1970-01-01T00:00:00.002+00:00</from>"));
    assert!(xml.contains("<to>1970-01-01T00:00:00.002+00:00</to>"));
    assert!(xml.contains("<dirtiness>7</dirtiness>"));
    assert_eq!(stats.snapshot().events_published, 1);
}

#[tokio::test]
async fn missing_station_reaches_ready_without_publishing() {
    let stats = Arc::new(CleaningStats::new());
    let recorder = Recorder::default();
    let requests = recorder.requests.clone();
    let (handle, worker) = spawn_publisher(recorder, 16, stats.clone());

    let mut raw = linear_with_metadata(&[]);
    raw.remove("station");
    let mut pipeline =
        CleaningPipeline::from_params(&raw, Some(handle), stats.clone()).expect("valid");
    assert!(!pipeline.publishes_metadata());

    let records = collect(&mut pipeline, &[(0, 1.0), (1, 2.0), (2, 10.0)]);
    assert_eq!(records.iter().filter(|r| r.is_dirty()).count(), 1);
    drop(pipeline);
    worker.await.expect("worker");

    assert!(requests.lock().expect("lock").is_empty());
    assert_eq!(stats.snapshot().events_queued, 0);
}

#[tokio::test]
async fn refused_publish_does_not_stall_the_next_window() {
    let stats = Arc::new(CleaningStats::new());
    let recorder = Recorder {
        refuse: true,
        ..Recorder::default()
    };
    let done = recorder.done.clone();
    let (handle, worker) = spawn_publisher(recorder, 16, stats.clone());

    let mut pipeline = CleaningPipeline::from_params(
        &linear_with_metadata(&[("user", "alice"), ("password", "secret")]),
        Some(handle),
        stats.clone(),
    )
    .expect("valid");

    let first = collect(&mut pipeline, &[(0, 1.0), (1, 2.0), (2, 10.0)]);
    done.notified().await;
    let second = collect(&mut pipeline, &[(3, 1.0), (4, 2.0), (5, 3.0)]);
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    assert!(second.iter().all(|r| !r.is_dirty()));

    drop(pipeline);
    worker.await.expect("worker");
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.windows_fitted, 2);
    assert_eq!(snapshot.publish_failures, 1);
    assert_eq!(snapshot.events_published, 0);
}

#[test]
fn every_window_size_appends_emit_one_window_in_order() {
    for window_size in [1usize, 2, 5, 17] {
        let size = window_size.to_string();
        let mut pipeline = CleaningPipeline::from_params(
            &params(&[
                ("model", "quadratic"),
                ("window_size", size.as_str()),
                ("error_bound", "0.1"),
            ]),
            None,
            Arc::new(CleaningStats::new()),
        )
        .expect("valid");

        let samples: Vec<(i64, f64)> = (0..window_size as i64 * 3)
            .map(|i| (1_700_000_000_000 + i * 500, (i % 4) as f64))
            .collect();
        let records = collect(&mut pipeline, &samples);
        assert_eq!(records.len(), samples.len());
        for (record, (ts, value)) in records.iter().zip(&samples) {
            assert_eq!(record.timestamp, *ts);
            assert_eq!(record.stream, *value);
            assert!(record.dirtiness >= 0.0);
        }
        assert_eq!(pipeline.stats().snapshot().windows_fitted, 3);
    }
}

#[test]
fn zero_bound_flags_any_residual() {
    let mut pipeline = CleaningPipeline::from_params(
        &params(&[("model", "constant"), ("window_size", "3"), ("error_bound", "0")]),
        None,
        Arc::new(CleaningStats::new()),
    )
    .expect("valid");
    let records = collect(&mut pipeline, &[(0, 1.0), (1, 1.0), (2, 1.25)]);
    let dirtiness: Vec<f64> = records.iter().map(|r| r.dirtiness).collect();
    assert_eq!(dirtiness, vec![0.0, 0.0, 0.25]);
}
