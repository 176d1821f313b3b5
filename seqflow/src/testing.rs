//! Mock collaborators and stub stages shared by unit and integration tests.

use crate::errors::WorkflowError;
use crate::jobs::JobHandle;
use crate::stages::{
    CohortStage, DatasetStage, ExpectedOutputs, OutputData, SampleStage, StageContext, StageInput,
    StageOutput,
};
use crate::status::{StatusError, StatusReporter};
use crate::storage::ObjectStore;
use crate::targets::{Cohort, Dataset, Sample, TargetRef};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Object store answering from a fixed set of paths.
pub struct StaticStore {
    present: HashSet<String>,
}

impl ObjectStore for StaticStore {
    fn exists(&self, path: &str) -> Result<bool, std::io::Error> {
        Ok(self.present.contains(path))
    }
}

/// A [`StaticStore`] with the given paths present.
pub fn store_with(paths: &[&str]) -> Arc<dyn ObjectStore> {
    Arc::new(StaticStore {
        present: paths.iter().map(|p| (*p).to_string()).collect(),
    })
}

/// Builds a cohort with one dataset and the given sample ids.
pub fn cohort_with(dataset: &str, sample_ids: &[&str]) -> Arc<Cohort> {
    let cohort = Arc::new(Cohort::new("test-cohort"));
    let ds = cohort.create_dataset(dataset);
    for id in sample_ids {
        ds.add_sample(*id, None);
    }
    cohort
}

/// Sample-level stage producing `{prefix}/{sample id}.cram` with one job.
pub struct StubSampleStage {
    prefix: String,
}

impl StubSampleStage {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn path_for(&self, sample: &Sample) -> String {
        format!("{}/{}.cram", self.prefix, sample.id())
    }
}

impl SampleStage for StubSampleStage {
    fn expected_outputs(&self, sample: &Sample) -> ExpectedOutputs {
        ExpectedOutputs::path(self.path_for(sample))
    }

    fn queue_jobs(
        &self,
        sample: &Arc<Sample>,
        _inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        let target = TargetRef::Sample(Arc::clone(sample));
        let job = ctx.new_job(
            &format!("{} {}", ctx.stage_name(), sample.id()),
            &ctx.job_attrs(&target),
        );
        Ok(Some(
            StageOutput::new(target, OutputData::Path(self.path_for(sample))).with_job(job),
        ))
    }
}

/// Sample-level stage failing every target with the same message.
pub struct FailingSampleStage {
    message: String,
}

impl FailingSampleStage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl SampleStage for FailingSampleStage {
    fn expected_outputs(&self, sample: &Sample) -> ExpectedOutputs {
        ExpectedOutputs::path(format!("out/failing/{}.cram", sample.id()))
    }

    fn queue_jobs(
        &self,
        sample: &Arc<Sample>,
        _inputs: &StageInput,
        _ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        Ok(Some(StageOutput::error(
            TargetRef::Sample(Arc::clone(sample)),
            self.message.clone(),
        )))
    }
}

/// Dataset-level stage producing `{prefix}/{dataset}.tsv`, pulling single
/// path results from `pull_from` when set.
pub struct StubDatasetStage {
    prefix: String,
    pull_from: Option<String>,
}

impl StubDatasetStage {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pull_from: None,
        }
    }

    pub fn pulling_from(mut self, upstream: impl Into<String>) -> Self {
        self.pull_from = Some(upstream.into());
        self
    }
}

impl DatasetStage for StubDatasetStage {
    fn expected_outputs(&self, dataset: &Dataset) -> ExpectedOutputs {
        ExpectedOutputs::path(format!("{}/{}.tsv", self.prefix, dataset.name()))
    }

    fn queue_jobs(
        &self,
        dataset: &Arc<Dataset>,
        inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        if let Some(upstream) = &self.pull_from {
            let _by_target = inputs.path_by_target(upstream)?;
        }
        let target = TargetRef::Dataset(Arc::clone(dataset));
        let job = ctx.new_job(
            &format!("{} {}", ctx.stage_name(), dataset.name()),
            &ctx.job_attrs(&target),
        );
        Ok(Some(
            StageOutput::new(
                target,
                OutputData::Path(format!("{}/{}.tsv", self.prefix, dataset.name())),
            )
            .with_job(job),
        ))
    }
}

/// Cohort-level stage producing `{prefix}/cohort.vcf.gz`, pulling single
/// path results from `pull_from` when set.
pub struct StubCohortStage {
    prefix: String,
    pull_from: Option<String>,
}

impl StubCohortStage {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pull_from: None,
        }
    }

    pub fn pulling_from(mut self, upstream: impl Into<String>) -> Self {
        self.pull_from = Some(upstream.into());
        self
    }
}

/// A [`StubCohortStage`] variant that records the upstream target ids it saw.
pub struct ObservingCohortStage {
    prefix: String,
    pull_from: String,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl ObservingCohortStage {
    pub fn new(prefix: impl Into<String>, pull_from: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            pull_from: pull_from.into(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl CohortStage for ObservingCohortStage {
    fn expected_outputs(&self, _cohort: &Cohort) -> ExpectedOutputs {
        ExpectedOutputs::path(format!("{}/cohort.vcf.gz", self.prefix))
    }

    fn queue_jobs(
        &self,
        cohort: &Arc<Cohort>,
        inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        let by_target = inputs.path_by_target(&self.pull_from)?;
        self.seen.lock().extend(by_target.keys().cloned());

        let target = TargetRef::Cohort(Arc::clone(cohort));
        let job = ctx.new_job(ctx.stage_name(), &ctx.job_attrs(&target));
        Ok(Some(
            StageOutput::new(
                target,
                OutputData::Path(format!("{}/cohort.vcf.gz", self.prefix)),
            )
            .with_job(job),
        ))
    }
}

impl CohortStage for StubCohortStage {
    fn expected_outputs(&self, _cohort: &Cohort) -> ExpectedOutputs {
        ExpectedOutputs::path(format!("{}/cohort.vcf.gz", self.prefix))
    }

    fn queue_jobs(
        &self,
        cohort: &Arc<Cohort>,
        inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        if let Some(upstream) = &self.pull_from {
            let _by_target = inputs.path_by_target(upstream)?;
        }
        let target = TargetRef::Cohort(Arc::clone(cohort));
        let job = ctx.new_job(ctx.stage_name(), &ctx.job_attrs(&target));
        Ok(Some(
            StageOutput::new(
                target,
                OutputData::Path(format!("{}/cohort.vcf.gz", self.prefix)),
            )
            .with_job(job),
        ))
    }
}

/// Status reporter recording every call.
#[derive(Default)]
pub struct RecordingReporter {
    pub completed: Mutex<Vec<(String, String)>>,
    pub queued: Mutex<Vec<(String, String)>>,
}

impl StatusReporter for RecordingReporter {
    fn record_completed(
        &self,
        stage: &str,
        _analysis_type: &str,
        target: &TargetRef,
        _output: &OutputData,
        _meta: &HashMap<String, serde_json::Value>,
    ) -> Result<(), StatusError> {
        self.completed
            .lock()
            .push((stage.to_string(), target.target_id()));
        Ok(())
    }

    fn queue_updaters(
        &self,
        stage: &str,
        _analysis_type: &str,
        target: &TargetRef,
        _output: &OutputData,
        _jobs: &[JobHandle],
        _prev_jobs: &[JobHandle],
        _meta: &HashMap<String, serde_json::Value>,
    ) -> Result<(), StatusError> {
        self.queued
            .lock()
            .push((stage.to_string(), target.target_id()));
        Ok(())
    }
}
