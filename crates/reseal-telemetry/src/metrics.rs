//! Prometheus-backed counters for encryption runs.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Output is the text exposition format so a node exporter textfile collector can pick it up.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus registry shared by the pipeline and the CLI.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    steps_total: IntCounterVec,
    volumes_total: IntCounterVec,
    cleanup_failures: IntGauge,
    last_run_success: IntGauge,
}

/// Snapshot of the gauges used in run summaries.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Snapshot deletions that failed during the last run.
    pub cleanup_failures: i64,
    /// `1` when the last run completed, `0` otherwise.
    pub last_run_success: i64,
}

impl Metrics {
    /// Construct a registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let steps_total = IntCounterVec::new(
            Opts::new("reseal_steps_total", "Orchestration steps executed by status"),
            &["step", "status"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "reseal_steps_total",
            source,
        })?;
        let volumes_total = IntCounterVec::new(
            Opts::new("reseal_volumes_total", "Volumes processed by outcome"),
            &["outcome"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "reseal_volumes_total",
            source,
        })?;
        let cleanup_failures = IntGauge::with_opts(Opts::new(
            "reseal_cleanup_failures",
            "Snapshot deletions that failed in the last run",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "reseal_cleanup_failures",
            source,
        })?;
        let last_run_success = IntGauge::with_opts(Opts::new(
            "reseal_last_run_success",
            "Whether the last run completed without a fatal error",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "reseal_last_run_success",
            source,
        })?;

        register(&registry, "reseal_steps_total", Box::new(steps_total.clone()))?;
        register(
            &registry,
            "reseal_volumes_total",
            Box::new(volumes_total.clone()),
        )?;
        register(
            &registry,
            "reseal_cleanup_failures",
            Box::new(cleanup_failures.clone()),
        )?;
        register(
            &registry,
            "reseal_last_run_success",
            Box::new(last_run_success.clone()),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                steps_total,
                volumes_total,
                cleanup_failures,
                last_run_success,
            }),
        })
    }

    /// Increment the step counter for a step/status pair.
    pub fn inc_step(&self, step: &str, status: &str) {
        self.inner
            .steps_total
            .with_label_values(&[step, status])
            .inc();
    }

    /// Increment the per-volume outcome counter (`skipped`, `encrypted`, ...).
    pub fn inc_volume(&self, outcome: &str) {
        self.inner
            .volumes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record how many snapshot deletions failed.
    pub fn set_cleanup_failures(&self, count: usize) {
        self.inner
            .cleanup_failures
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record whether the run finished without a fatal error.
    pub fn set_run_success(&self, success: bool) {
        self.inner.last_run_success.set(i64::from(success));
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or are not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Render and write the registry to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the file cannot be written.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        fs::write(path, rendered).map_err(|source| TelemetryError::MetricsWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Take a point-in-time snapshot of the run gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cleanup_failures: self.inner.cleanup_failures.get(),
            last_run_success: self.inner.last_run_success.get(),
        }
    }
}

fn register(
    registry: &Registry,
    name: &'static str,
    collector: Box<dyn prometheus::core::Collector>,
) -> Result<()> {
    registry
        .register(collector)
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
