#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Telemetry primitives shared across the Reseal workspace.
//!
//! Layout: `init.rs` (subscriber installation), `context.rs` (run spans),
//! `metrics.rs` (Prometheus counters), `error.rs` (telemetry errors).

pub mod context;
pub mod error;
pub mod init;
pub mod metrics;

pub use context::{record_run_outcome, run_span};
pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
