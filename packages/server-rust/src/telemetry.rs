//! Metrics sink and tracing subscriber setup.
//!
//! [`Metrics`] owns a Prometheus recorder that is never installed as the
//! process-wide recorder. It is created once at startup, shared by `Arc`
//! with every instrumented layer, and rendered by the `/metrics` route.

use std::sync::Arc;
use std::time::Duration;

use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Metric names
// ---------------------------------------------------------------------------

pub const SVC_REQUESTS: &str = "allsrv_svc_requests";
pub const SVC_ERRORS: &str = "allsrv_svc_errors";
pub const SVC_DURATION: &str = "allsrv_svc_duration_seconds";

pub const DB_REQUESTS: &str = "allsrv_db_requests";
pub const DB_ERRORS: &str = "allsrv_db_errors";
pub const DB_DURATION: &str = "allsrv_db_duration_seconds";

pub const HTTP_REQUESTS: &str = "allsrv_http_requests";
pub const HTTP_ERRORS: &str = "allsrv_http_errors";
pub const HTTP_DURATION: &str = "allsrv_http_duration_seconds";
pub const HTTP_UNAUTHORIZED: &str = "allsrv_http_unauthorized";

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Explicit metrics sink backed by a private [`PrometheusRecorder`].
pub struct Metrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

/// Shared handle passed to instrumented layers.
pub type SharedMetrics = Arc<Metrics>;

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self { recorder, handle }
    }

    /// Convenience constructor for the shared form.
    #[must_use]
    pub fn shared() -> SharedMetrics {
        Arc::new(Self::new())
    }

    /// Adds one to the counter `name` with the given labels.
    pub fn increment(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        let key = key(name, labels);
        self.recorder.register_counter(&key, &metadata()).increment(1);
    }

    /// Records `elapsed` in seconds on the histogram `name`.
    pub fn record_duration(
        &self,
        name: &'static str,
        labels: &[(&'static str, &str)],
        elapsed: Duration,
    ) {
        let key = key(name, labels);
        self.recorder
            .register_histogram(&key, &metadata())
            .record(elapsed.as_secs_f64());
    }

    /// Renders every recorded metric in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

fn key(name: &'static str, labels: &[(&'static str, &str)]) -> Key {
    let labels: Vec<Label> = labels
        .iter()
        .map(|(k, v)| Label::new(*k, (*v).to_string()))
        .collect();
    Key::from_parts(name, labels)
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

/// Records one request/error/duration triple.
///
/// Shared by the service, store, and HTTP instrumentation so the three
/// agree on what a request and an error are.
pub(crate) fn record_call(
    metrics: &Metrics,
    names: [&'static str; 3],
    labels: &[(&'static str, &str)],
    failed: bool,
    elapsed: Duration,
) {
    let [requests, errors, duration] = names;
    metrics.increment(requests, labels);
    if failed {
        metrics.increment(errors, labels);
    }
    metrics.record_duration(duration, labels, elapsed);
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Output format of the process-wide log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?,
    }
    Ok(())
}
