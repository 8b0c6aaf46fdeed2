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

//! EC2 adapter implementing the [`reseal_core::CloudProvider`] seam.

/// Region-bound EC2 client wrapper.
pub mod adapter;
mod convert;
mod error;

pub use adapter::Ec2Provider;
