//! Explicit stage declaration and registration.
//!
//! A stage is declared by registering a [`StageSpec`]: its unique name, the
//! user-supplied runner, the names of its required upstream stages, and
//! declaration-time control flags. The registry is an explicit, injected
//! object with deterministic construction and a reset hook, so tests never
//! leak declarations into each other.

use crate::errors::WorkflowError;
use crate::stages::{CohortStage, DatasetStage, SampleStage, StageRunner};
use std::collections::HashMap;
use std::sync::Arc;

/// Declaration of a single stage.
#[derive(Clone)]
pub struct StageSpec {
    pub(crate) name: String,
    pub(crate) runner: StageRunner,
    pub(crate) required_stages: Vec<String>,
    pub(crate) analysis_type: Option<String>,
    pub(crate) skipped: bool,
    pub(crate) forced: bool,
    pub(crate) assume_outputs_exist: bool,
}

impl StageSpec {
    fn new(name: impl Into<String>, runner: StageRunner) -> Self {
        Self {
            name: name.into(),
            runner,
            required_stages: Vec::new(),
            analysis_type: None,
            skipped: false,
            forced: false,
            assume_outputs_exist: false,
        }
    }

    /// Declares a sample-level stage.
    #[must_use]
    pub fn sample(name: impl Into<String>, runner: Arc<dyn SampleStage>) -> Self {
        Self::new(name, StageRunner::Sample(runner))
    }

    /// Declares a dataset-level stage.
    #[must_use]
    pub fn dataset(name: impl Into<String>, runner: Arc<dyn DatasetStage>) -> Self {
        Self::new(name, StageRunner::Dataset(runner))
    }

    /// Declares a cohort-level stage.
    #[must_use]
    pub fn cohort(name: impl Into<String>, runner: Arc<dyn CohortStage>) -> Self {
        Self::new(name, StageRunner::Cohort(runner))
    }

    /// Declares upstream dependencies by stage name.
    #[must_use]
    pub fn requires<S: Into<String>>(mut self, stages: impl IntoIterator<Item = S>) -> Self {
        self.required_stages
            .extend(stages.into_iter().map(Into::into));
        self
    }

    /// Sets the analysis type reported to the status reporter.
    #[must_use]
    pub fn with_analysis_type(mut self, analysis_type: impl Into<String>) -> Self {
        self.analysis_type = Some(analysis_type.into());
        self
    }

    /// Declares the stage skipped: its outputs are expected to exist from a
    /// prior run and are checked unless `assume_outputs_exist` is also set.
    #[must_use]
    pub fn skipped(mut self) -> Self {
        self.skipped = true;
        self
    }

    /// Forces re-execution regardless of reuse eligibility.
    #[must_use]
    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    /// Trusts the stage's outputs to exist without checking.
    #[must_use]
    pub fn assume_outputs_exist(mut self) -> Self {
        self.assume_outputs_exist = true;
        self
    }

    /// The declared stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared upstream stage names.
    #[must_use]
    pub fn required_stages(&self) -> &[String] {
        &self.required_stages
    }
}

impl std::fmt::Debug for StageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSpec")
            .field("name", &self.name)
            .field("level", &self.runner.level())
            .field("required_stages", &self.required_stages)
            .field("skipped", &self.skipped)
            .field("forced", &self.forced)
            .field("assume_outputs_exist", &self.assume_outputs_exist)
            .finish()
    }
}

/// All declared stages, in declaration order.
#[derive(Default)]
pub struct StageRegistry {
    specs: Vec<StageSpec>,
    index: HashMap<String, usize>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage declaration.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::DuplicateStage`] when the name is already taken.
    pub fn register(&mut self, spec: StageSpec) -> Result<(), WorkflowError> {
        if self.index.contains_key(&spec.name) {
            return Err(WorkflowError::DuplicateStage {
                name: spec.name.clone(),
            });
        }
        self.index.insert(spec.name.clone(), self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Looks up a declaration by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StageSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    /// Declared stage names, in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Removes all declarations (test isolation hook).
    pub fn clear(&mut self) {
        self.specs.clear();
        self.index.clear();
    }
}
