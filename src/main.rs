use anyhow::{Context, Result};
use dataclean_sidecar::config::Config;
use dataclean_sidecar::sample::parse_reading_line;
use dataclean_sidecar::{
    spawn_publisher, CleanedRecord, CleaningParams, CleaningPipeline, CleaningStats, LogPublisher,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const PUBLISHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Logs go to stderr; stdout carries the cleaned stream. Spans are exported
/// over OTLP/HTTP only when an endpoint is configured.
fn init_tracing(config: &Config) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,dataclean_sidecar=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let otel_layer = match config.otlp_endpoint.as_deref().and_then(otlp_traces_endpoint) {
        Some(endpoint) => {
            let tracer = otlp_tracer(endpoint).context("failed to start OTLP exporter")?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;
    Ok(())
}

fn otlp_tracer(endpoint: String) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{runtime::Tokio, trace::Config as TraceConfig, Resource};

    let resource = Resource::new(vec![
        KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().http().with_endpoint(endpoint))
        .with_trace_config(TraceConfig::default().with_resource(resource))
        .install_batch(Tokio)?;
    Ok(tracer)
}

/// Appends the traces path unless the endpoint already names it. A blank
/// endpoint disables export.
fn otlp_traces_endpoint(endpoint: &str) -> Option<String> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.ends_with("/v1/traces") {
        return Some(trimmed.to_string());
    }
    Some(format!("{}/v1/traces", trimmed.trim_end_matches('/')))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let params = match CleaningParams::from_params(&config.params) {
        Ok(params) => params,
        Err(err) => {
            tracing::error!(error = %err, "invalid data cleaning configuration");
            return Err(err).context("invalid data cleaning configuration");
        }
    };

    let stats = Arc::new(CleaningStats::new());
    let (publisher, publisher_task) = if params.publishes_metadata() {
        let (handle, task) = spawn_publisher(LogPublisher, config.publish_queue, stats.clone());
        (Some(handle), Some(task))
    } else {
        (None, None)
    };
    let mut pipeline = CleaningPipeline::new(params, publisher, stats.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut records: Vec<CleanedRecord> = Vec::with_capacity(pipeline.params().window_size);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        };
        let Some(line) = line else {
            tracing::info!("input closed");
            break;
        };

        let reading = match parse_reading_line(&line) {
            Ok(Some(reading)) => reading,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unparseable input line");
                continue;
            }
        };

        records.clear();
        let mut sink = |record: CleanedRecord| records.push(record);
        if pipeline.ingest(reading, &mut sink).is_err() {
            // Already logged and counted; the window is discarded.
            continue;
        }

        for record in &records {
            let mut encoded = serde_json::to_vec(record)?;
            encoded.push(b'\n');
            stdout.write_all(&encoded).await?;
        }
        if !records.is_empty() {
            stdout.flush().await?;
        }
    }

    drop(pipeline);
    if let Some(task) = publisher_task {
        if tokio::time::timeout(PUBLISHER_DRAIN_TIMEOUT, task).await.is_err() {
            tracing::warn!("metadata publisher did not drain before shutdown");
        }
    }
    tracing::info!(stats = ?stats.snapshot(), "data cleaning stopped");

    Ok(())
}
