//! The read-side view a stage receives over its upstream results.

use crate::errors::WorkflowError;
use crate::jobs::{JobHandle, Resource};
use crate::stages::output::StageOutput;
use crate::targets::TargetRef;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Aggregates the [`StageOutput`]s of all declared upstream stages, indexed
/// by `(upstream stage name, target id)`.
///
/// Built fresh for every stage invocation by the driver. Querying an
/// upstream stage the consuming stage never declared is a fatal
/// configuration error rather than an empty result.
#[derive(Debug)]
pub struct StageInput {
    stage_name: String,
    required: Vec<String>,
    skipped_targets_hint: bool,
    outputs: HashMap<String, BTreeMap<String, Arc<StageOutput>>>,
}

impl StageInput {
    pub(crate) fn new(
        stage_name: impl Into<String>,
        required: Vec<String>,
        skipped_targets_hint: bool,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            required,
            skipped_targets_hint,
            outputs: HashMap::new(),
        }
    }

    /// Adds an upstream output. Entries are recorded only for targets that
    /// are active, cover at least one sample, and carry data or jobs.
    pub(crate) fn add(&mut self, output: &Arc<StageOutput>) {
        debug_assert!(output.stage_name().is_some(), "unstamped output: {output}");
        let Some(stage_name) = output.stage_name() else {
            return;
        };
        if !output.target().is_active() {
            return;
        }
        if output.target().sample_ids(true).is_empty() {
            return;
        }
        if output.data().is_none() && output.jobs().is_empty() {
            return;
        }
        self.outputs
            .entry(stage_name.to_string())
            .or_default()
            .insert(output.target().target_id(), Arc::clone(output));
    }

    /// The consuming stage's name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    fn entries(
        &self,
        upstream: &str,
    ) -> Result<&BTreeMap<String, Arc<StageOutput>>, WorkflowError> {
        if !self.required.iter().any(|s| s == upstream) {
            return Err(WorkflowError::UndeclaredInput {
                stage: self.stage_name.clone(),
                queried: upstream.to_string(),
            });
        }
        self.outputs
            .get(upstream)
            .ok_or_else(|| WorkflowError::InputNotFound {
                stage: self.stage_name.clone(),
                upstream: upstream.to_string(),
                target: None,
                skipped_targets_hint: self.skipped_targets_hint,
            })
    }

    /// The output recorded by `upstream` for `target`.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::UndeclaredInput`] when `upstream` is not declared;
    /// [`WorkflowError::InputNotFound`] when nothing was recorded.
    pub fn output_for(
        &self,
        target: &TargetRef,
        upstream: &str,
    ) -> Result<Arc<StageOutput>, WorkflowError> {
        let entries = self.entries(upstream)?;
        entries
            .get(&target.target_id())
            .cloned()
            .ok_or_else(|| WorkflowError::InputNotFound {
                stage: self.stage_name.clone(),
                upstream: upstream.to_string(),
                target: Some(target.target_id()),
                skipped_targets_hint: self.skipped_targets_hint,
            })
    }

    /// Single path results of `upstream`, indexed by target id.
    ///
    /// # Errors
    ///
    /// Propagates declaration, lookup, and shape errors.
    pub fn path_by_target(
        &self,
        upstream: &str,
    ) -> Result<BTreeMap<String, String>, WorkflowError> {
        self.entries(upstream)?
            .iter()
            .map(|(t, out)| Ok((t.clone(), out.as_path()?.to_string())))
            .collect()
    }

    /// Path maps of `upstream`, indexed by target id.
    ///
    /// # Errors
    ///
    /// Propagates declaration, lookup, and shape errors.
    pub fn path_map_by_target(
        &self,
        upstream: &str,
    ) -> Result<BTreeMap<String, BTreeMap<String, String>>, WorkflowError> {
        self.entries(upstream)?
            .iter()
            .map(|(t, out)| Ok((t.clone(), out.as_path_map()?.clone())))
            .collect()
    }

    /// Single resource results of `upstream`, indexed by target id.
    ///
    /// # Errors
    ///
    /// Propagates declaration, lookup, and shape errors.
    pub fn resource_by_target(
        &self,
        upstream: &str,
    ) -> Result<BTreeMap<String, Resource>, WorkflowError> {
        self.entries(upstream)?
            .iter()
            .map(|(t, out)| Ok((t.clone(), out.as_resource()?.clone())))
            .collect()
    }

    /// Single path result of `upstream` for one target.
    ///
    /// # Errors
    ///
    /// Propagates declaration, lookup, and shape errors.
    pub fn path_for(&self, target: &TargetRef, upstream: &str) -> Result<String, WorkflowError> {
        Ok(self.output_for(target, upstream)?.as_path()?.to_string())
    }

    /// Keyed path result of `upstream` for one target.
    ///
    /// # Errors
    ///
    /// Propagates declaration, lookup, and shape errors.
    pub fn path_keyed_for(
        &self,
        target: &TargetRef,
        upstream: &str,
        key: &str,
    ) -> Result<String, WorkflowError> {
        Ok(self
            .output_for(target, upstream)?
            .as_path_keyed(key)?
            .to_string())
    }

    /// Single resource result of `upstream` for one target.
    ///
    /// # Errors
    ///
    /// Propagates declaration, lookup, and shape errors.
    pub fn resource_for(
        &self,
        target: &TargetRef,
        upstream: &str,
    ) -> Result<Resource, WorkflowError> {
        Ok(self.output_for(target, upstream)?.as_resource()?.clone())
    }

    /// All upstream execution handles that `target` must wait for: handles
    /// from every recorded output whose producing target shares at least one
    /// sample id with `target`.
    #[must_use]
    pub fn jobs_for(&self, target: &TargetRef) -> Vec<JobHandle> {
        let these: HashSet<String> = target.sample_ids(true).into_iter().collect();
        let mut all = Vec::new();
        for outputs_by_target in self.outputs.values() {
            for output in outputs_by_target.values() {
                let overlaps = output
                    .target()
                    .sample_ids(true)
                    .iter()
                    .any(|id| these.contains(id));
                if overlaps {
                    all.extend(output.jobs().iter().cloned());
                }
            }
        }
        all
    }
}
