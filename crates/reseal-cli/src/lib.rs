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
#![allow(clippy::redundant_pub_crate)]

//! Command-line front end that encrypts an instance's EBS volumes in place.
//!
//! Layout:
//! - `cli.rs`: argument parsing and dispatch
//! - `commands/`: run and dry-run handlers
//! - `client.rs`: errors, handler context, and telemetry helpers
//! - `prompt.rs`: interactive collection of missing arguments
//! - `output.rs`: renderers and formatting helpers
//! - `main.rs`: thin entrypoint delegating to `run()`

pub(crate) mod cli;
pub(crate) mod client;
pub(crate) mod commands;
pub(crate) mod output;
pub(crate) mod prompt;

pub use cli::run;
