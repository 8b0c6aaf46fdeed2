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
#![allow(clippy::module_name_repetitions)]

//! Orchestration engine for in-place volume encryption.
//!
//! A run walks one instance through a fixed pipeline: locate attached volumes,
//! classify them, clone each unencrypted volume through a snapshot into an
//! encrypted volume, swap the attachments while the instance is stopped, then
//! delete the intermediate snapshots. Cloud calls go through [`CloudProvider`].

pub mod classify;
pub mod cleanup;
pub mod clone;
pub mod error;
pub mod journal;
pub mod locator;
pub mod model;
pub mod provider;
pub mod service;
pub mod swap;
pub mod wait;

pub use classify::{Classification, classify, partition};
pub use error::{ProviderError, ProviderResult, RunAborted, RunError, RunResult};
pub use journal::{StepJournal, StepKind, StepOutcome, StepRecord, StepStatus};
pub use model::{
    AttachedVolume, CleanupFailure, EncryptionTask, InstanceState, Partition, RunContext,
    RunPlan, RunReport, RunRequest, SkippedVolume, SnapshotState, Tag, TaskPhase, VolumeRecord,
    VolumeSpec, VolumeState,
};
pub use provider::CloudProvider;
pub use service::EncryptionService;
pub use wait::{PollStatus, RetryPolicy, wait_until};
