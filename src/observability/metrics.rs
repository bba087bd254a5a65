//! # Request Metrics
//!
//! This module records per-request counters and latency histograms and renders
//! them in the Prometheus text exposition format.
//!
//! ## Series
//! - `http_requests_total{method, endpoint, status}` (counter)
//! - `http_request_latency_seconds{endpoint}` (histogram)
//! - `process_*` resource series (CPU seconds, resident memory, open file
//!   descriptors, start time), sampled on every scrape
//!
//! ## Usage Example
//! ```rust,no_run
//! use std::time::Duration;
//! use obs_demo::observability::metrics::MetricsCollector;
//! use obs_demo::observability::config::MetricsConfig;
//!
//! let collector = MetricsCollector::new(&MetricsConfig::default())?;
//! collector.observe_latency("/", Duration::from_millis(50));
//! collector.record_request("GET", "/", 200);
//! println!("{}", collector.snapshot());
//! # Ok::<(), obs_demo::ServiceError>(())
//! ```
//!
//! The collector owns its recorder instead of installing one globally, so each
//! application state (and each test) gets an isolated registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::core::error::ServiceResult;
use crate::observability::config::MetricsConfig;

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_LATENCY_SECONDS: &str = "http_request_latency_seconds";

/// Content type of the exposition format
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Request metrics collector
///
/// Counter and histogram storage is atomic inside the recorder, so the
/// collector is shared across concurrent requests behind an `Arc`.
#[derive(Clone)]
pub struct MetricsCollector {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    process: Option<Arc<metrics_process::Collector>>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector").finish_non_exhaustive()
    }
}

impl MetricsCollector {
    /// Create a collector with its own Prometheus registry
    pub fn new(config: &MetricsConfig) -> ServiceResult<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_LATENCY_SECONDS.to_string()),
                &config.latency_buckets,
            )?
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            metrics::describe_counter!(REQUESTS_TOTAL, "Total HTTP Requests");
            metrics::describe_histogram!(
                REQUEST_LATENCY_SECONDS,
                metrics::Unit::Seconds,
                "HTTP Request latency"
            );
        });

        let process = config.process_metrics.then(|| {
            let process = metrics_process::Collector::default();
            metrics::with_local_recorder(&recorder, || process.describe());
            Arc::new(process)
        });

        Ok(Self {
            recorder: Arc::new(recorder),
            handle,
            process,
        })
    }

    /// Increment the request counter for one handled request
    pub fn record_request(&self, method: &str, endpoint: &str, status: u16) {
        let labels = [
            ("method", method.to_string()),
            ("endpoint", endpoint.to_string()),
            ("status", status.to_string()),
        ];

        metrics::with_local_recorder(self.recorder.as_ref(), || {
            metrics::counter!(REQUESTS_TOTAL, &labels).increment(1);
        });
    }

    /// Add one latency sample for an endpoint
    pub fn observe_latency(&self, endpoint: &str, latency: Duration) {
        let labels = [("endpoint", endpoint.to_string())];

        metrics::with_local_recorder(self.recorder.as_ref(), || {
            metrics::histogram!(REQUEST_LATENCY_SECONDS, &labels).record(latency.as_secs_f64());
        });
    }

    /// Render every registered series in the exposition format
    ///
    /// Process series are refreshed first. Families are ordered by name and
    /// series by label set, so two snapshots of the same state are
    /// byte-identical.
    pub fn snapshot(&self) -> String {
        if let Some(process) = &self.process {
            metrics::with_local_recorder(self.recorder.as_ref(), || process.collect());
        }
        stable_order(&self.handle.render())
    }
}

/// Reorder rendered exposition text deterministically
///
/// Lines are grouped into families by the name in their `# HELP`/`# TYPE`
/// header. Families are emitted in name order with the header first; sample
/// lines are stably sorted by their label set with `le` and `quantile`
/// removed, which keeps bucket order intact.
fn stable_order(rendered: &str) -> String {
    let mut families: BTreeMap<String, (Vec<&str>, Vec<&str>)> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in rendered.lines().filter(|line| !line.trim().is_empty()) {
        if line.starts_with('#') {
            let name = line.split_whitespace().nth(2).map(str::to_string);
            if let Some(name) = name.or_else(|| current.clone()) {
                families.entry(name.clone()).or_default().0.push(line);
                current = Some(name);
            }
            continue;
        }

        let sample = sample_name(line);
        let family = match &current {
            Some(family) if sample.starts_with(family.as_str()) => family.clone(),
            _ => sample.to_string(),
        };
        families.entry(family).or_default().1.push(line);
    }

    let mut output = String::with_capacity(rendered.len());
    for (_, (header, mut samples)) in families {
        samples.sort_by_key(|line| series_key(line));
        for line in header.into_iter().chain(samples) {
            output.push_str(line);
            output.push('\n');
        }
        output.push('\n');
    }
    output
}

fn sample_name(line: &str) -> &str {
    line.split(|c: char| c == '{' || c.is_whitespace())
        .next()
        .unwrap_or(line)
}

fn series_key(line: &str) -> String {
    let labels = match (line.find('{'), line.rfind('}')) {
        (Some(start), Some(end)) if start < end => &line[start + 1..end],
        _ => "",
    };
    labels
        .split(',')
        .filter(|pair| !pair.starts_with("le=") && !pair.starts_with("quantile="))
        .collect::<Vec<_>>()
        .join(",")
}
