//! # Seqflow
//!
//! A declarative stage orchestrator for multi-level genomics workflows.
//!
//! Users declare independent **stages**, each producing outputs for a
//! **target**: a [`Sample`](targets::Sample), a [`Dataset`](targets::Dataset)
//! of samples, or the whole [`Cohort`](targets::Cohort). The orchestrator:
//!
//! - resolves inter-stage dependencies, pulling in transitively required
//!   stages that were never explicitly requested;
//! - decides per target whether to execute, reuse, or skip each stage, from
//!   force flags, configured skip lists, and expected-output existence;
//! - wires execution-handle dependencies so downstream work only waits on
//!   the upstream work it actually needs.
//!
//! The actual execution engine, object store, and metadata service are
//! external collaborators behind the [`jobs::JobBackend`],
//! [`storage::ObjectStore`], and [`status::StatusReporter`] traits.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seqflow::prelude::*;
//!
//! let mut registry = StageRegistry::new();
//! registry.register(StageSpec::sample("Align", Arc::new(Align)))?;
//! registry.register(
//!     StageSpec::sample("Genotype", Arc::new(Genotype)).requires(["Align"]),
//! )?;
//!
//! let workflow = Workflow::new(config, cohort, backend, store);
//! let report = workflow.run(&registry, &["Genotype"], false)?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod jobs;
pub mod stages;
pub mod status;
pub mod storage;
pub mod targets;
pub mod utils;
pub mod workflow;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::WorkflowConfig;
    pub use crate::errors::{FailureGroup, StageFailures, WorkflowError};
    pub use crate::jobs::{JobAttrs, JobBackend, JobBackendExt, JobHandle, LocalBackend, Resource};
    pub use crate::stages::{
        Action, CohortStage, DatasetStage, Decider, ExpectedOutput, ExpectedOutputs, OutputData,
        SampleStage, Stage, StageContext, StageInput, StageOutput, StageRunner,
    };
    pub use crate::status::{LoggingStatusReporter, StatusReporter};
    pub use crate::storage::{ExistenceCache, LocalStore, ObjectStore};
    pub use crate::targets::{Cohort, Dataset, Sample, TargetRef};
    pub use crate::workflow::{RunReport, StageRegistry, StageReport, StageSpec, Workflow};
}
