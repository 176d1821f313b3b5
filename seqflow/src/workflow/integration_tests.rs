//! End-to-end scenarios across resolution, decisions, and the driver.

#[cfg(test)]
mod tests {
    use crate::config::WorkflowConfig;
    use crate::errors::WorkflowError;
    use crate::jobs::LocalBackend;
    use crate::stages::Action;
    use crate::testing::{
        cohort_with, store_with, FailingSampleStage, ObservingCohortStage, RecordingReporter,
        StubCohortStage, StubSampleStage,
    };
    use crate::workflow::{StageRegistry, StageSpec, Workflow};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn align_and_call_registry() -> StageRegistry {
        let mut registry = StageRegistry::new();
        registry
            .register(StageSpec::sample(
                "Align",
                Arc::new(StubSampleStage::new("out/align")),
            ))
            .unwrap();
        registry
            .register(
                StageSpec::cohort(
                    "Call",
                    Arc::new(StubCohortStage::new("out/call").pulling_from("Align")),
                )
                .requires(["Align"]),
            )
            .unwrap();
        registry
    }

    fn workflow(config: WorkflowConfig, backend: Arc<LocalBackend>, present: &[&str]) -> Workflow {
        Workflow::new(
            config,
            cohort_with("my_dataset", &["CPG01", "CPG02"]),
            backend,
            store_with(present),
        )
    }

    #[test]
    fn test_two_stage_run_wires_dependencies() {
        let backend = Arc::new(LocalBackend::new());
        let registry = align_and_call_registry();
        let wf = workflow(WorkflowConfig::default(), backend.clone(), &[]);

        let report = wf.run(&registry, &["Align", "Call"], false).unwrap();

        // Two sample jobs plus one cohort job.
        assert_eq!(backend.job_count(), 3);
        assert_eq!(report.stage("Align").unwrap().queued, 2);
        assert_eq!(report.stage("Call").unwrap().queued, 1);
        assert_eq!(report.total_new_jobs(), 3);

        let call_job = backend.job_named("Call").unwrap();
        let align_jobs: Vec<_> = backend
            .jobs()
            .into_iter()
            .filter(|j| j.name.starts_with("Align"))
            .collect();
        assert_eq!(align_jobs.len(), 2);
        let deps = backend.dependencies_of(call_job.id);
        assert_eq!(deps.len(), 2);
        for job in align_jobs {
            assert!(deps.contains(&job.id));
        }
    }

    #[test]
    fn test_implicit_stage_is_reused_without_new_jobs() {
        let backend = Arc::new(LocalBackend::new());
        let registry = align_and_call_registry();
        let wf = workflow(WorkflowConfig::default(), backend.clone(), &[]);

        // Only Call is requested; Align is pulled in as skipped. Without
        // existence checking, a skipped stage is trusted to have produced
        // its outputs, so Align resolves to reuse for every sample.
        let report = wf.run(&registry, &["Call"], false).unwrap();

        assert_eq!(backend.job_count(), 1);
        assert_eq!(report.stage("Align").unwrap().reused, 2);
        assert_eq!(report.stage("Align").unwrap().new_jobs, 0);
        assert_eq!(report.stage("Call").unwrap().queued, 1);

        // No upstream handles exist, so the cohort job has no dependencies.
        let call_job = backend.job_named("Call").unwrap();
        assert!(backend.dependencies_of(call_job.id).is_empty());
    }

    #[test]
    fn test_missing_input_deactivates_sample() {
        let backend = Arc::new(LocalBackend::new());
        let observing = Arc::new(ObservingCohortStage::new("out/call", "Align"));
        let seen = observing.seen.clone();

        let mut registry = StageRegistry::new();
        registry
            .register(StageSpec::sample(
                "Align",
                Arc::new(StubSampleStage::new("out/align")),
            ))
            .unwrap();
        registry
            .register(StageSpec::cohort("Call", observing).requires(["Align"]))
            .unwrap();

        let config = WorkflowConfig {
            check_expected_outputs: true,
            skip_samples_with_missing_input: true,
            ..WorkflowConfig::default()
        };
        let cohort = cohort_with("my_dataset", &["S1", "S2", "S3"]);
        let wf = Workflow::new(
            config,
            cohort.clone(),
            backend,
            // S3's expected align output is missing.
            store_with(&["out/align/S1.cram", "out/align/S2.cram"]),
        );

        wf.run(&registry, &["Call"], false).unwrap();

        let samples = cohort.datasets(false)[0].samples(false);
        assert!(samples[0].is_active());
        assert!(samples[1].is_active());
        assert!(!samples[2].is_active());

        // The downstream stage never sees the deactivated sample.
        assert_eq!(*seen.lock(), vec!["S1".to_string(), "S2".to_string()]);
    }

    #[test]
    fn test_per_target_failures_abort_before_downstream() {
        let backend = Arc::new(LocalBackend::new());
        let mut registry = StageRegistry::new();
        registry
            .register(StageSpec::sample(
                "Align",
                Arc::new(FailingSampleStage::new("no reads found")),
            ))
            .unwrap();
        registry
            .register(
                StageSpec::cohort("Call", Arc::new(StubCohortStage::new("out/call")))
                    .requires(["Align"]),
            )
            .unwrap();

        let wf = workflow(WorkflowConfig::default(), backend.clone(), &[]);
        let err = wf.run(&registry, &["Align", "Call"], false).unwrap_err();

        let WorkflowError::StageFailed(failures) = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(failures.stage, "Align");
        assert_eq!(failures.failures.len(), 1);
        assert_eq!(failures.failures[0].message, "no reads found");
        assert_eq!(failures.failures[0].targets, vec!["CPG01", "CPG02"]);

        // The run stopped before the cohort stage.
        assert!(backend.job_named("Call").is_none());
    }

    #[test]
    fn test_last_stage_stops_processing() {
        let backend = Arc::new(LocalBackend::new());
        let registry = align_and_call_registry();
        let config = WorkflowConfig {
            last_stage: Some("Align".to_string()),
            ..WorkflowConfig::default()
        };
        let wf = workflow(config, backend.clone(), &[]);

        let report = wf.run(&registry, &["Align", "Call"], false).unwrap();

        assert_eq!(report.stages.len(), 1);
        assert_eq!(report.stages[0].name, "Align");
        assert!(backend.job_named("Call").is_none());
    }

    #[test]
    fn test_first_stage_skips_earlier_stages() {
        let backend = Arc::new(LocalBackend::new());
        let registry = align_and_call_registry();
        let config = WorkflowConfig {
            first_stage: Some("Call".to_string()),
            ..WorkflowConfig::default()
        };
        let wf = workflow(config, backend.clone(), &[]);

        let report = wf.run(&registry, &["Align", "Call"], false).unwrap();

        // Align is before the window: skipped, trusted, reused.
        assert_eq!(report.stage("Align").unwrap().queued, 0);
        assert_eq!(report.stage("Align").unwrap().reused, 2);
        assert_eq!(backend.job_count(), 1);
    }

    #[test]
    fn test_hoisted_reuse_reports_completed_analyses() {
        let backend = Arc::new(LocalBackend::new());
        let reporter = Arc::new(RecordingReporter::default());

        let mut registry = StageRegistry::new();
        registry
            .register(
                StageSpec::sample("Align", Arc::new(StubSampleStage::new("out/align")))
                    .with_analysis_type("cram"),
            )
            .unwrap();

        let config = WorkflowConfig {
            check_expected_outputs: true,
            ..WorkflowConfig::default()
        };
        let wf = workflow(
            config,
            backend.clone(),
            &["out/align/CPG01.cram", "out/align/CPG02.cram"],
        )
        .with_status_reporter(reporter.clone());

        let report = wf.run(&registry, &["Align"], false).unwrap();

        assert_eq!(report.stage("Align").unwrap().reused, 2);
        assert_eq!(backend.job_count(), 0);

        // Every reuse decision records a completed analysis; the hoisted
        // path queues no updater jobs.
        assert_eq!(reporter.completed.lock().len(), 2);
        assert!(reporter.queued.lock().is_empty());
    }

    #[test]
    fn test_skip_hoist_reports_nothing() {
        let backend = Arc::new(LocalBackend::new());
        let reporter = Arc::new(RecordingReporter::default());

        let mut registry = StageRegistry::new();
        registry
            .register(
                StageSpec::sample("Align", Arc::new(StubSampleStage::new("out/align")))
                    .with_analysis_type("cram"),
            )
            .unwrap();

        let config = WorkflowConfig {
            skip_samples_stages: [(
                "Align".to_string(),
                vec!["CPG01".to_string(), "CPG02".to_string()],
            )]
            .into(),
            ..WorkflowConfig::default()
        };
        let wf = workflow(config, backend.clone(), &[]).with_status_reporter(reporter.clone());

        let report = wf.run(&registry, &["Align"], false).unwrap();

        assert_eq!(report.stage("Align").unwrap().skipped, 2);
        assert_eq!(backend.job_count(), 0);
        assert!(reporter.completed.lock().is_empty());
        assert!(reporter.queued.lock().is_empty());
    }

    #[test]
    fn test_undeclared_input_query_fails_fast() {
        let backend = Arc::new(LocalBackend::new());
        let mut registry = StageRegistry::new();
        registry
            .register(StageSpec::sample(
                "Align",
                Arc::new(StubSampleStage::new("out/align")),
            ))
            .unwrap();
        // Pulls from Align without declaring it.
        registry
            .register(StageSpec::cohort(
                "Call",
                Arc::new(ObservingCohortStage::new("out/call", "Align")),
            ))
            .unwrap();

        let wf = workflow(WorkflowConfig::default(), backend, &[]);
        let err = wf.run(&registry, &["Align", "Call"], false).unwrap_err();
        assert!(matches!(err, WorkflowError::UndeclaredInput { .. }));
    }

    #[test]
    fn test_forced_sample_queues_despite_existing_outputs() {
        let backend = Arc::new(LocalBackend::new());
        let registry = align_and_call_registry();
        let config = WorkflowConfig {
            check_expected_outputs: true,
            ..WorkflowConfig::default()
        };
        let cohort = cohort_with("my_dataset", &["CPG01", "CPG02"]);
        cohort.datasets(false)[0].samples(false)[0].set_forced(true);

        let wf = Workflow::new(
            config,
            cohort,
            backend.clone(),
            store_with(&["out/align/CPG01.cram", "out/align/CPG02.cram"]),
        );
        let report = wf.run(&registry, &["Align"], false).unwrap();

        // Mixed decisions: the forced sample re-runs, the other reuses.
        assert_eq!(report.stage("Align").unwrap().queued, 1);
        assert_eq!(report.stage("Align").unwrap().reused, 1);
        assert!(backend.job_named("Align CPG01").is_some());
        assert!(backend.job_named("Align CPG02").is_none());
    }

    #[test]
    fn test_dataset_stage_pulls_sample_outputs() {
        let backend = Arc::new(LocalBackend::new());
        let mut registry = StageRegistry::new();
        registry
            .register(StageSpec::sample(
                "Align",
                Arc::new(StubSampleStage::new("out/align")),
            ))
            .unwrap();
        registry
            .register(
                StageSpec::dataset(
                    "Coverage",
                    Arc::new(crate::testing::StubDatasetStage::new("out/coverage").pulling_from("Align")),
                )
                .requires(["Align"]),
            )
            .unwrap();

        let wf = workflow(WorkflowConfig::default(), backend.clone(), &[]);
        let report = wf.run(&registry, &["Align", "Coverage"], false).unwrap();

        assert_eq!(report.stage("Coverage").unwrap().queued, 1);
        let coverage_job = backend.job_named("Coverage my_dataset").unwrap();
        assert_eq!(backend.dependencies_of(coverage_job.id).len(), 2);
        assert_eq!(
            coverage_job.attrs.get("dataset").map(String::as_str),
            Some("my_dataset")
        );
    }

    #[test]
    fn test_actions_are_terminal_per_invocation() {
        // Reusing the same registry and config across two runs produces the
        // same decisions; nothing is persisted between runs.
        let registry = align_and_call_registry();
        for _ in 0..2 {
            let backend = Arc::new(LocalBackend::new());
            let wf = workflow(WorkflowConfig::default(), backend.clone(), &[]);
            let report = wf.run(&registry, &["Align", "Call"], false).unwrap();
            assert_eq!(report.total_new_jobs(), 3);
            assert_eq!(backend.job_count(), 3);
        }
        // Action values stay comparable for hoisting decisions.
        assert_eq!(Action::Reuse, Action::Reuse);
    }
}
