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

//! Run settings for the encryption workflow.
//!
//! Layout: `model.rs` (typed settings and overrides), `loader.rs` (environment
//! lookup), `validate.rs` (field validation), `defaults.rs` (default values).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    ENV_MAX_POLL_ATTEMPTS, ENV_POLL_INTERVAL_SECS, ENV_PROVENANCE_TAG, ENV_REMEDIATION_TAG,
};
pub use model::{RunSettings, SettingsOverrides};
