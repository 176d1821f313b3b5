//! Error types for the seqflow orchestrator.
//!
//! Every error here is fatal to the run: the orchestrator never retries
//! internally. Retries for actual compute failures belong to the external
//! job engine.

use thiserror::Error;

/// The main error type for workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A stage name was declared or requested more than once.
    #[error("stage '{name}' is already defined; check the stage list for duplicates")]
    DuplicateStage {
        /// The duplicated stage name.
        name: String,
    },

    /// A stage name could not be resolved against the registry or graph.
    #[error("stage '{name}' is not known{}", required_by.as_ref().map(|s| format!(" (required by '{s}')")).unwrap_or_default())]
    UnknownStage {
        /// The unresolved stage name.
        name: String,
        /// The stage whose `required_stages` referenced it, if any.
        required_by: Option<String>,
    },

    /// A dependency cycle, or a requested stage ordered before one of its
    /// dependencies.
    #[error("stage '{stage}' requires '{dependency}', which is not ordered before it; reorder the requested stages or break the dependency cycle")]
    CycleDetected {
        /// The dependent stage.
        stage: String,
        /// The dependency that is not ordered before it.
        dependency: String,
    },

    /// The resolved graph contains no runnable stages.
    #[error("no stages to run")]
    NoStagesToRun,

    /// A stage queried an upstream stage it never declared.
    #[error("{stage}: getting inputs from stage '{queried}', but '{queried}' is not listed in required_stages; add it to the stage declaration")]
    UndeclaredInput {
        /// The consuming stage.
        stage: String,
        /// The stage that was queried.
        queried: String,
    },

    /// A declared upstream stage produced no usable outputs.
    #[error("no inputs from '{upstream}' for stage '{stage}' found{}{}", target.as_ref().map(|t| format!(" (target '{t}')")).unwrap_or_default(), if *skipped_targets_hint { "; check whether all samples were missing inputs from previous stages, and consider changing workflow.first_stage" } else { "" })]
    InputNotFound {
        /// The consuming stage.
        stage: String,
        /// The upstream stage that has no recorded outputs.
        upstream: String,
        /// The specific target queried, if any.
        target: Option<String>,
        /// Whether `skip_samples_with_missing_input` may have dropped targets.
        skipped_targets_hint: bool,
    },

    /// A required-but-skipped stage is missing expected outputs and no
    /// override applies.
    #[error("stage '{stage}' is required, but is skipped, and expected outputs for target '{target}' do not exist{}", first_missing.as_ref().map(|p| format!(": {p}")).unwrap_or_default())]
    MissingOutputs {
        /// The skipped stage.
        stage: String,
        /// The affected target id.
        target: String,
        /// The first expected output path that failed the existence check.
        first_missing: Option<String>,
    },

    /// A stage output was accessed with the wrong data shape.
    #[error("{stage}: expected {wanted} output, found {found}")]
    DataShape {
        /// The producing stage, or "<unset>" before the driver stamps it.
        stage: String,
        /// The shape the caller asked for.
        wanted: String,
        /// The shape actually stored.
        found: String,
    },

    /// A stage was handed a target of the wrong granularity.
    #[error("stage '{stage}' acts on {expected} targets, got '{found}'")]
    TargetKind {
        /// The stage name.
        stage: String,
        /// The granularity the stage declares.
        expected: &'static str,
        /// The granularity it received.
        found: &'static str,
    },

    /// One or more targets of a stage failed while queueing jobs.
    #[error(transparent)]
    StageFailed(#[from] StageFailures),

    /// An existence check against the object store failed.
    #[error("storage check failed for '{path}'")]
    Storage {
        /// The path being checked.
        path: String,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Per-target execution failures of one stage, grouped by distinct message.
///
/// A stage is allowed to fail for some targets and succeed for others, but
/// the run never proceeds past a stage with any failed target.
#[derive(Debug, Error)]
#[error("stage '{stage}' failed to queue jobs with errors:\n{}", render_groups(failures))]
pub struct StageFailures {
    /// The failing stage.
    pub stage: String,
    /// Failure groups, in first-seen order.
    pub failures: Vec<FailureGroup>,
}

/// One distinct error message and the targets it affected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureGroup {
    /// The error message shared by the group.
    pub message: String,
    /// Ids of the affected targets, in processing order.
    pub targets: Vec<String>,
}

impl StageFailures {
    /// Groups `(target id, error message)` pairs by distinct message,
    /// preserving first-seen order.
    #[must_use]
    pub fn group(stage: impl Into<String>, errors: Vec<(String, String)>) -> Self {
        let mut failures: Vec<FailureGroup> = Vec::new();
        for (target, message) in errors {
            if let Some(group) = failures.iter_mut().find(|g| g.message == message) {
                group.targets.push(target);
            } else {
                failures.push(FailureGroup {
                    message,
                    targets: vec![target],
                });
            }
        }
        Self {
            stage: stage.into(),
            failures,
        }
    }
}

fn render_groups(failures: &[FailureGroup]) -> String {
    failures
        .iter()
        .map(|g| format!("{}: {}", g.message, g.targets.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}
