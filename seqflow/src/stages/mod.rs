//! Stage traits and the resolved per-run stage instance.
//!
//! A stage is a declared unit of work producing outputs for targets of one
//! granularity. User code implements one of [`SampleStage`],
//! [`DatasetStage`] or [`CohortStage`]; the orchestrator wraps the
//! implementation in a [`Stage`] instance carrying the resolved dependency
//! list, control flags, and the outputs recorded during the run.

pub mod decision;
pub mod input;
pub mod output;

pub use decision::{Action, Decider};
pub use input::StageInput;
pub use output::{ExpectedOutput, ExpectedOutputs, OutputData, StageOutput};

use crate::config::WorkflowConfig;
use crate::errors::WorkflowError;
use crate::jobs::{JobAttrs, JobBackend, JobBackendExt, JobHandle};
use crate::targets::{Cohort, Dataset, Sample, TargetRef};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A stage acting on individual samples.
pub trait SampleStage: Send + Sync {
    /// Paths (or other outputs) the stage is expected to produce for
    /// `sample`. Used for reuse checks and reuse synthesis; must be pure.
    fn expected_outputs(&self, sample: &Sample) -> ExpectedOutputs;

    /// Emits jobs processing `sample` to the execution engine.
    ///
    /// Upstream results are available through `inputs`; missing-input and
    /// reuse bookkeeping is already done by the driver.
    ///
    /// # Errors
    ///
    /// A returned error aborts the run immediately. Per-target failures that
    /// should be aggregated are reported via [`StageOutput::error`] instead.
    fn queue_jobs(
        &self,
        sample: &Arc<Sample>,
        inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError>;
}

/// A stage acting on whole datasets.
pub trait DatasetStage: Send + Sync {
    /// Expected outputs for `dataset`; must be pure.
    fn expected_outputs(&self, dataset: &Dataset) -> ExpectedOutputs;

    /// Emits jobs processing `dataset` to the execution engine.
    ///
    /// # Errors
    ///
    /// A returned error aborts the run immediately.
    fn queue_jobs(
        &self,
        dataset: &Arc<Dataset>,
        inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError>;
}

/// A stage acting on the cohort as a whole.
pub trait CohortStage: Send + Sync {
    /// Expected outputs for `cohort`; must be pure.
    fn expected_outputs(&self, cohort: &Cohort) -> ExpectedOutputs;

    /// Emits jobs processing `cohort` to the execution engine.
    ///
    /// # Errors
    ///
    /// A returned error aborts the run immediately.
    fn queue_jobs(
        &self,
        cohort: &Arc<Cohort>,
        inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError>;
}

/// The user-supplied behavior of a stage, tagged by target granularity.
#[derive(Clone)]
pub enum StageRunner {
    /// Acts per sample.
    Sample(Arc<dyn SampleStage>),
    /// Acts per dataset.
    Dataset(Arc<dyn DatasetStage>),
    /// Acts on the whole cohort.
    Cohort(Arc<dyn CohortStage>),
}

impl StageRunner {
    /// The granularity name.
    #[must_use]
    pub fn level(&self) -> &'static str {
        match self {
            Self::Sample(_) => "sample",
            Self::Dataset(_) => "dataset",
            Self::Cohort(_) => "cohort",
        }
    }

    pub(crate) fn expected_outputs(
        &self,
        stage_name: &str,
        target: &TargetRef,
    ) -> Result<ExpectedOutputs, WorkflowError> {
        match (self, target) {
            (Self::Sample(s), TargetRef::Sample(t)) => Ok(s.expected_outputs(t)),
            (Self::Dataset(s), TargetRef::Dataset(t)) => Ok(s.expected_outputs(t)),
            (Self::Cohort(s), TargetRef::Cohort(t)) => Ok(s.expected_outputs(t)),
            _ => Err(WorkflowError::TargetKind {
                stage: stage_name.to_string(),
                expected: self.level(),
                found: target.kind(),
            }),
        }
    }

    pub(crate) fn queue_jobs(
        &self,
        stage_name: &str,
        target: &TargetRef,
        inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        match (self, target) {
            (Self::Sample(s), TargetRef::Sample(t)) => s.queue_jobs(t, inputs, ctx),
            (Self::Dataset(s), TargetRef::Dataset(t)) => s.queue_jobs(t, inputs, ctx),
            (Self::Cohort(s), TargetRef::Cohort(t)) => s.queue_jobs(t, inputs, ctx),
            _ => Err(WorkflowError::TargetKind {
                stage: stage_name.to_string(),
                expected: self.level(),
                found: target.kind(),
            }),
        }
    }
}

impl fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StageRunner").field(&self.level()).finish()
    }
}

/// A resolved stage instance, alive for one run.
///
/// Control flags start from the declaration and may be adjusted once by the
/// resolver (implicit discovery, skip lists, first/last-stage window); they
/// are never revisited after resolution.
#[derive(Debug)]
pub struct Stage {
    pub(crate) name: String,
    pub(crate) runner: StageRunner,
    pub(crate) required_names: Vec<String>,
    /// Bound dependency names; a subset of `required_names` for skip-listed
    /// stages, identical otherwise. Populated by the resolver.
    pub(crate) required: Vec<String>,
    pub(crate) analysis_type: Option<String>,
    pub(crate) skipped: bool,
    pub(crate) forced: bool,
    pub(crate) assume_outputs_exist: bool,
    /// Outputs recorded by the driver, keyed by target id; written exactly
    /// once per target, never mutated afterwards.
    pub(crate) outputs: BTreeMap<String, Arc<StageOutput>>,
}

impl Stage {
    pub(crate) fn new(
        name: impl Into<String>,
        runner: StageRunner,
        required_names: Vec<String>,
        analysis_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            runner,
            required_names,
            required: Vec::new(),
            analysis_type,
            skipped: false,
            forced: false,
            assume_outputs_exist: false,
            outputs: BTreeMap::new(),
        }
    }

    /// Unique stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The user-supplied behavior.
    #[must_use]
    pub fn runner(&self) -> &StageRunner {
        &self.runner
    }

    /// Declared upstream stage names.
    #[must_use]
    pub fn required_names(&self) -> &[String] {
        &self.required_names
    }

    /// Whether the stage is marked skipped (required but not requested, or
    /// truncated by the first/last-stage window).
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Whether re-execution is forced regardless of reuse eligibility.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Whether outputs are trusted to exist without checking.
    #[must_use]
    pub fn assumes_outputs_exist(&self) -> bool {
        self.assume_outputs_exist
    }

    /// Analysis type reported to the status reporter, if any.
    #[must_use]
    pub fn analysis_type(&self) -> Option<&str> {
        self.analysis_type.as_deref()
    }

    /// Outputs recorded so far, keyed by target id.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, Arc<StageOutput>> {
        &self.outputs
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.skipped {
            write!(f, " [skipped]")?;
        }
        if self.forced {
            write!(f, " [forced]")?;
        }
        if self.assume_outputs_exist {
            write!(f, " [assume_outputs_exist]")?;
        }
        if !self.required.is_empty() {
            write!(f, " <- [{}]", self.required.join(", "))?;
        }
        Ok(())
    }
}

/// What a stage's `queue_jobs` can reach: the job backend, run identity, and
/// attribute conventions.
pub struct StageContext<'a> {
    stage_name: &'a str,
    backend: &'a Arc<dyn JobBackend>,
    config: &'a WorkflowConfig,
    run_id: &'a str,
    tmp_prefix: String,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(
        stage_name: &'a str,
        backend: &'a Arc<dyn JobBackend>,
        config: &'a WorkflowConfig,
        run_id: &'a str,
        workflow_tmp_prefix: &str,
    ) -> Self {
        Self {
            stage_name,
            backend,
            config,
            run_id,
            tmp_prefix: format!("{workflow_tmp_prefix}/{stage_name}"),
        }
    }

    /// The owning stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        self.stage_name
    }

    /// Submits a job description to the execution engine.
    #[must_use]
    pub fn new_job(&self, name: &str, attrs: &JobAttrs) -> JobHandle {
        self.backend.new_job(name, attrs)
    }

    /// The standard attribute tags for a job of this stage on `target`.
    #[must_use]
    pub fn job_attrs(&self, target: &TargetRef) -> JobAttrs {
        let mut attrs = JobAttrs::new();
        attrs.insert("stage".to_string(), self.stage_name.to_string());
        if let Some(seq_type) = &self.config.sequencing_type {
            attrs.insert("sequencing_type".to_string(), seq_type.clone());
        }
        attrs.extend(target.job_attrs());
        attrs
    }

    /// Scratch-space prefix reserved for this stage.
    #[must_use]
    pub fn tmp_prefix(&self) -> &str {
        &self.tmp_prefix
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.run_id
    }
}
