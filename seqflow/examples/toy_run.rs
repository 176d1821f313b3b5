//! A toy two-stage workflow against the in-memory backend.
//!
//! Run with `cargo run --example toy_run`.

use seqflow::prelude::*;
use std::sync::Arc;

struct Align;

impl SampleStage for Align {
    fn expected_outputs(&self, sample: &Sample) -> ExpectedOutputs {
        ExpectedOutputs::path(format!("out/align/{}.cram", sample.id()))
    }

    fn queue_jobs(
        &self,
        sample: &Arc<Sample>,
        _inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        let target = TargetRef::Sample(Arc::clone(sample));
        let job = ctx.new_job(&format!("align {}", sample.id()), &ctx.job_attrs(&target));
        Ok(Some(
            StageOutput::new(
                target,
                OutputData::Path(format!("out/align/{}.cram", sample.id())),
            )
            .with_job(job),
        ))
    }
}

struct JointCalling;

impl CohortStage for JointCalling {
    fn expected_outputs(&self, _cohort: &Cohort) -> ExpectedOutputs {
        ExpectedOutputs::path("out/joint-calling/cohort.vcf.gz")
    }

    fn queue_jobs(
        &self,
        cohort: &Arc<Cohort>,
        inputs: &StageInput,
        ctx: &StageContext<'_>,
    ) -> Result<Option<StageOutput>, WorkflowError> {
        let cram_by_sample = inputs.path_by_target("Align")?;
        println!("joint-calling over {} aligned samples", cram_by_sample.len());

        let target = TargetRef::Cohort(Arc::clone(cohort));
        let job = ctx.new_job("joint-calling", &ctx.job_attrs(&target));
        Ok(Some(
            StageOutput::new(
                target,
                OutputData::Path("out/joint-calling/cohort.vcf.gz".to_string()),
            )
            .with_job(job),
        ))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut registry = StageRegistry::new();
    registry.register(StageSpec::sample("Align", Arc::new(Align)))?;
    registry.register(StageSpec::cohort("JointCalling", Arc::new(JointCalling)).requires(["Align"]))?;

    let cohort = Arc::new(Cohort::new("fewgenomes"));
    let dataset = cohort.create_dataset("my_dataset");
    dataset.add_sample("CPG01", Some("SAMPLE1".to_string()));
    dataset.add_sample("CPG02", Some("SAMPLE2".to_string()));

    let backend = Arc::new(LocalBackend::new());
    let workflow = Workflow::new(
        WorkflowConfig {
            dataset: Some("fewgenomes".to_string()),
            sequencing_type: Some("genome".to_string()),
            ..WorkflowConfig::default()
        },
        cohort,
        backend.clone(),
        Arc::new(LocalStore),
    );

    let report = workflow.run(&registry, &["Align", "JointCalling"], false)?;
    for stage in &report.stages {
        println!(
            "{}: queued={} reused={} skipped={} jobs={}",
            stage.name, stage.queued, stage.reused, stage.skipped, stage.new_jobs
        );
    }
    println!("submitted {} jobs", backend.job_count());
    Ok(())
}
