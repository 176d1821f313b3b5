//! The read-only configuration surface consumed by the orchestrator.
//!
//! Loading and merging of configuration files is the caller's concern; any
//! serde front-end (TOML, YAML, JSON) can produce a [`WorkflowConfig`].

use serde::Deserialize;
use std::collections::HashMap;

/// Workflow-level settings, corresponding to the `[workflow]` section of a
/// deployment configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Workflow display name; slugified for job descriptions.
    pub name: Option<String>,

    /// Free-text description, used as a fallback display name.
    pub description: Option<String>,

    /// The analysis dataset the run is billed and attributed to.
    pub dataset: Option<String>,

    /// Sequencing type tag (e.g. "genome", "exome") attached to job
    /// attributes.
    pub sequencing_type: Option<String>,

    /// Explicit run id; a timestamp-based id is generated when unset.
    pub run_id: Option<String>,

    /// When set, expected output paths are checked against the object store
    /// before reusing results. When unset, only skipped stages are trusted
    /// to have produced prior outputs.
    pub check_expected_outputs: bool,

    /// When a required-but-skipped stage has missing outputs for a target,
    /// deactivate the target for the rest of the run instead of failing.
    pub skip_samples_with_missing_input: bool,

    /// Skipped stages allowed to have missing expected outputs; their results
    /// are optimistically reused.
    pub allow_missing_outputs_for_stages: Vec<String>,

    /// Stages whose outputs are trusted to exist without checking.
    pub assume_outputs_exist_for_stages: Vec<String>,

    /// Stages to mark skipped when pulled in as implicit dependencies.
    pub skip_stages: Vec<String>,

    /// Per-stage lists of target ids that must be skipped outright.
    pub skip_samples_stages: HashMap<String, Vec<String>>,

    /// First stage to run; everything ordered before it is skipped
    /// (case-insensitive).
    pub first_stage: Option<String>,

    /// Last stage to run; everything ordered after it is skipped and the
    /// driver stops once it completes (case-insensitive).
    pub last_stage: Option<String>,
}

impl WorkflowConfig {
    /// Target ids to skip for `stage`, per `skip_samples_stages`.
    #[must_use]
    pub fn skip_targets_for(&self, stage: &str) -> Option<&Vec<String>> {
        self.skip_samples_stages.get(stage)
    }

    /// Whether `stage` may reuse results despite missing expected outputs.
    #[must_use]
    pub fn allows_missing_outputs(&self, stage: &str) -> bool {
        self.allow_missing_outputs_for_stages
            .iter()
            .any(|s| s == stage)
    }

    /// Whether `stage` outputs are trusted to exist without checking.
    #[must_use]
    pub fn assumes_outputs_exist(&self, stage: &str) -> bool {
        self.assume_outputs_exist_for_stages
            .iter()
            .any(|s| s == stage)
    }

    /// Whether `stage` is in the global skip list.
    #[must_use]
    pub fn skips_stage(&self, stage: &str) -> bool {
        self.skip_stages.iter().any(|s| s == stage)
    }
}
