//! The workflow driver.
//!
//! Resolves the requested stages into an ordered graph, walks it in
//! dependency order, and for every applicable target asks the decision
//! engine whether to queue, reuse, or skip. Queued work is emitted to the
//! external job engine with dependency edges wired to the upstream handles
//! the target actually needs; reused work is synthesized from declared
//! expected outputs; per-target failures are aggregated and abort the run
//! before any dependent stage is processed.

pub mod registry;
mod resolver;

#[cfg(test)]
mod integration_tests;

pub use registry::{StageRegistry, StageSpec};

use crate::config::WorkflowConfig;
use crate::errors::{StageFailures, WorkflowError};
use crate::jobs::JobBackend;
use crate::stages::{
    Action, Decider, OutputData, Stage, StageContext, StageInput, StageOutput, StageRunner,
};
use crate::status::StatusReporter;
use crate::storage::{ExistenceCache, ObjectStore};
use crate::targets::{Cohort, TargetRef};
use crate::utils;
use resolver::{resolve, ResolvedStages};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-stage accounting of what the driver did.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    /// The stage name.
    pub name: String,
    /// Targets for which fresh jobs were queued.
    pub queued: usize,
    /// Targets whose results were reused.
    pub reused: usize,
    /// Targets skipped outright.
    pub skipped: usize,
    /// New execution handles emitted.
    pub new_jobs: usize,
}

impl StageReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// The outcome of a completed run: work submitted to the execution engine,
/// per processed stage.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Reports for the stages that were processed, in execution order.
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// The report for `stage`, if it was processed.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Total new execution handles across all stages.
    #[must_use]
    pub fn total_new_jobs(&self) -> usize {
        self.stages.iter().map(|s| s.new_jobs).sum()
    }
}

/// Orchestrates stages over a cohort for a single run.
pub struct Workflow {
    name: String,
    run_id: String,
    tmp_prefix: String,
    config: WorkflowConfig,
    cohort: Arc<Cohort>,
    backend: Arc<dyn JobBackend>,
    exists: ExistenceCache,
    status_reporter: Option<Arc<dyn StatusReporter>>,
}

impl Workflow {
    /// Creates a workflow over a pre-built cohort and the external
    /// collaborators: the job engine and the object store.
    #[must_use]
    pub fn new(
        config: WorkflowConfig,
        cohort: Arc<Cohort>,
        backend: Arc<dyn JobBackend>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let run_id = config
            .run_id
            .clone()
            .unwrap_or_else(|| utils::timestamp(5));
        let display = config
            .name
            .clone()
            .or_else(|| config.description.clone())
            .or_else(|| config.dataset.clone())
            .unwrap_or_else(|| cohort.name().to_string());
        let name = utils::slugify(&display);
        let tmp_prefix = format!("tmp/{name}/{run_id}");

        Self {
            name,
            run_id,
            tmp_prefix,
            config,
            cohort,
            backend,
            exists: ExistenceCache::new(store),
            status_reporter: None,
        }
    }

    /// Attaches a status reporter.
    #[must_use]
    pub fn with_status_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.status_reporter = Some(reporter);
        self
    }

    /// The slugified workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The run id.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The cohort the run acts on.
    #[must_use]
    pub fn cohort(&self) -> &Arc<Cohort> {
        &self.cohort
    }

    /// Resolves `requested` stages against `registry` and processes the
    /// graph in dependency order. An empty request means all registered
    /// stages. When `force_all_implicit` is set, implicitly discovered
    /// stages run normally instead of being marked skipped.
    ///
    /// # Errors
    ///
    /// Configuration errors abort before any work is emitted; per-target
    /// failures are grouped into [`WorkflowError::StageFailed`] and abort
    /// the run before dependent stages.
    pub fn run(
        &self,
        registry: &StageRegistry,
        requested: &[&str],
        force_all_implicit: bool,
    ) -> Result<RunReport, WorkflowError> {
        let requested_names: Vec<&str> = if requested.is_empty() {
            registry.names()
        } else {
            requested.to_vec()
        };

        let ResolvedStages {
            mut stages,
            last_stage_index,
        } = resolve(registry, &requested_names, &self.config, force_all_implicit)?;

        let mut report = RunReport::default();
        for i in 0..stages.len() {
            let (before, rest) = stages.split_at_mut(i);
            let stage = &mut rest[0];
            info!(stage = %stage, "processing stage");

            let mut stage_report = StageReport::new(stage.name());
            stage.outputs = self.queue_for_cohort(stage, before, &mut stage_report)?;

            let errors: Vec<(String, String)> = stage
                .outputs
                .iter()
                .filter_map(|(target, out)| {
                    out.error_msg().map(|msg| (target.clone(), msg.to_string()))
                })
                .collect();
            if !errors.is_empty() {
                return Err(StageFailures::group(stage.name(), errors).into());
            }

            report.stages.push(stage_report);

            if last_stage_index.map_or(false, |last| i >= last) {
                info!(stage = %stage.name(), "last stage reached, stopping");
                break;
            }
        }

        Ok(report)
    }

    /// Processes one stage for every applicable target, returning the
    /// outputs to record.
    fn queue_for_cohort(
        &self,
        stage: &Stage,
        before: &[Stage],
        report: &mut StageReport,
    ) -> Result<BTreeMap<String, Arc<StageOutput>>, WorkflowError> {
        let decider = Decider::new(&self.config, &self.exists);
        let mut outputs = BTreeMap::new();

        match &stage.runner {
            StageRunner::Sample(_) => {
                let datasets = self.cohort.datasets(true);
                if datasets.is_empty() {
                    warn!(
                        total = self.cohort.datasets(false).len(),
                        "no usable (active) datasets found in the cohort"
                    );
                    return Ok(outputs);
                }
                if self.cohort.samples(true).is_empty() {
                    warn!(
                        total = self.cohort.samples(false).len(),
                        "no usable (active) samples found; check whether all samples \
                         were skipped for missing inputs"
                    );
                    return Ok(outputs);
                }

                for dataset in datasets {
                    let samples = dataset.samples(true);
                    if samples.is_empty() {
                        warn!(
                            dataset = %dataset,
                            total = dataset.samples(false).len(),
                            "no usable (active) samples in dataset"
                        );
                        continue;
                    }

                    let mut decisions = Vec::with_capacity(samples.len());
                    for (n, sample) in samples.iter().enumerate() {
                        debug!(stage = %stage.name(), sample = %sample, n = n + 1, "deciding");
                        let target = TargetRef::Sample(Arc::clone(sample));
                        let action = decider.decide(stage, &target)?;
                        if action == Action::Reuse {
                            self.report_completed(stage, &target);
                        }
                        decisions.push((Arc::clone(sample), action));
                    }

                    // If every sample independently resolved to reuse, hoist
                    // the decision to the dataset and synthesize outputs
                    // without per-sample re-checks.
                    let distinct: HashSet<Action> =
                        decisions.iter().map(|(_, action)| *action).collect();
                    if distinct.len() == 1 && distinct.contains(&Action::Reuse) {
                        for (sample, _) in &decisions {
                            let target = TargetRef::Sample(Arc::clone(sample));
                            let expected = stage.runner.expected_outputs(&stage.name, &target)?;
                            let mut out =
                                StageOutput::reused(target, OutputData::from(&expected));
                            out.set_stage_name(&stage.name);
                            outputs.insert(out.target().target_id(), Arc::new(out));
                            report.reused += 1;
                        }
                        continue;
                    }

                    for (sample, action) in decisions {
                        let target = TargetRef::Sample(sample);
                        if let Some(out) =
                            self.queue_with_checks(stage, before, &target, action, report)?
                        {
                            outputs.insert(target.target_id(), Arc::new(out));
                        }
                    }
                }
            }

            StageRunner::Dataset(_) => {
                let datasets = self.cohort.datasets(true);
                if datasets.is_empty() {
                    warn!(
                        total = self.cohort.datasets(false).len(),
                        "no usable (active) datasets found in the cohort"
                    );
                    return Ok(outputs);
                }
                for dataset in datasets {
                    let target = TargetRef::Dataset(dataset);
                    let action = decider.decide(stage, &target)?;
                    if action == Action::Reuse {
                        self.report_completed(stage, &target);
                    }
                    if let Some(out) =
                        self.queue_with_checks(stage, before, &target, action, report)?
                    {
                        outputs.insert(target.target_id(), Arc::new(out));
                    }
                }
            }

            StageRunner::Cohort(_) => {
                let target = TargetRef::Cohort(Arc::clone(&self.cohort));
                let action = decider.decide(stage, &target)?;
                if action == Action::Reuse {
                    self.report_completed(stage, &target);
                }
                if let Some(out) = self.queue_with_checks(stage, before, &target, action, report)?
                {
                    outputs.insert(target.target_id(), Arc::new(out));
                }
            }
        }

        Ok(outputs)
    }

    /// Applies one decided action to one target: runs the stage's
    /// `queue_jobs`, synthesizes a reuse output, or skips; then stamps the
    /// output, wires dependency edges, and notifies the status reporter.
    fn queue_with_checks(
        &self,
        stage: &Stage,
        before: &[Stage],
        target: &TargetRef,
        action: Action,
        report: &mut StageReport,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        match action {
            Action::Queue => report.queued += 1,
            Action::Reuse => report.reused += 1,
            Action::Skip => report.skipped += 1,
        }

        let inputs = self.make_inputs(stage, before);
        let expected = stage.runner.expected_outputs(&stage.name, target)?;
        let ctx = StageContext::new(
            &stage.name,
            &self.backend,
            &self.config,
            &self.run_id,
            &self.tmp_prefix,
        );

        let produced = match action {
            Action::Queue => stage.runner.queue_jobs(&stage.name, target, &inputs, &ctx)?,
            Action::Reuse => Some(StageOutput::reused(
                target.clone(),
                OutputData::from(&expected),
            )),
            Action::Skip => None,
        };
        let Some(mut out) = produced else {
            return Ok(None);
        };

        out.set_stage_name(&stage.name);
        out.merge_attrs(&ctx.job_attrs(target));

        // Downstream work only waits on the upstream work it actually
        // needs: handles from outputs sharing at least one sample id.
        let upstream_jobs = inputs.jobs_for(target);
        for job in out.jobs() {
            for dep in &upstream_jobs {
                job.depends_on(dep);
            }
        }
        report.new_jobs += out.jobs().len();

        if out.error_msg().is_some() {
            return Ok(Some(out));
        }

        if let (Some(analysis_type), Some(reporter)) =
            (stage.analysis_type(), self.status_reporter.as_ref())
        {
            if let Err(e) = reporter.queue_updaters(
                &stage.name,
                analysis_type,
                target,
                out.data(),
                out.jobs(),
                &upstream_jobs,
                out.meta(),
            ) {
                warn!(stage = %stage.name, error = %e, "status reporter failed; continuing");
            }
        }

        Ok(Some(out))
    }

    /// Builds the input view for one stage invocation from the outputs of
    /// its bound upstream stages.
    fn make_inputs(&self, stage: &Stage, before: &[Stage]) -> StageInput {
        let mut inputs = StageInput::new(
            &stage.name,
            stage.required.clone(),
            self.config.skip_samples_with_missing_input,
        );
        for req in &stage.required {
            if let Some(prev) = before.iter().find(|s| s.name() == *req) {
                for output in prev.outputs().values() {
                    inputs.add(output);
                }
            }
        }
        inputs
    }

    /// Records a completed analysis for a reused result. Reporter failures
    /// are logged and never abort the run.
    fn report_completed(&self, stage: &Stage, target: &TargetRef) {
        let (Some(analysis_type), Some(reporter)) =
            (stage.analysis_type(), self.status_reporter.as_ref())
        else {
            return;
        };
        if let Ok(expected) = stage.runner.expected_outputs(&stage.name, target) {
            let data = OutputData::from(&expected);
            let meta: HashMap<String, serde_json::Value> = target
                .job_attrs()
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect();
            if let Err(e) =
                reporter.record_completed(&stage.name, analysis_type, target, &data, &meta)
            {
                warn!(stage = %stage.name, error = %e, "status reporter failed; continuing");
            }
        }
    }
}
