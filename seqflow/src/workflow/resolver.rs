//! Stage graph resolution.
//!
//! Takes the explicitly requested stage names and produces the full ordered
//! stage list: transitively required stages are discovered and instantiated
//! as skipped-but-required, global skip/assume lists are applied, and the
//! first/last-stage window truncates the ends of the graph. Resolution is
//! synchronous, deterministic, and idempotent; it either returns a complete
//! ordered set or fails the run.

use crate::config::WorkflowConfig;
use crate::errors::WorkflowError;
use crate::stages::Stage;
use crate::workflow::registry::{StageRegistry, StageSpec};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// The outcome of resolution: stages in execution order, plus the position
/// of the configured last stage, if any.
#[derive(Debug)]
pub(crate) struct ResolvedStages {
    pub stages: Vec<Stage>,
    pub last_stage_index: Option<usize>,
}

fn instantiate(spec: &StageSpec) -> Stage {
    let mut stage = Stage::new(
        spec.name.clone(),
        spec.runner.clone(),
        spec.required_stages.clone(),
        spec.analysis_type.clone(),
    );
    stage.skipped = spec.skipped;
    stage.forced = spec.forced;
    stage.assume_outputs_exist = spec.assume_outputs_exist;
    stage
}

pub(crate) fn resolve(
    registry: &StageRegistry,
    requested: &[&str],
    config: &WorkflowConfig,
    force_all_implicit: bool,
) -> Result<ResolvedStages, WorkflowError> {
    // Round one: instantiate the explicitly requested stages.
    let mut stages: Vec<Stage> = Vec::new();
    let mut present: HashSet<String> = HashSet::new();
    for name in requested {
        let spec = registry.get(name).ok_or_else(|| WorkflowError::UnknownStage {
            name: (*name).to_string(),
            required_by: None,
        })?;
        if !present.insert(spec.name().to_string()) {
            return Err(WorkflowError::DuplicateStage {
                name: spec.name().to_string(),
            });
        }
        stages.push(instantiate(spec));
    }

    // Round two: pull in required stages that were not requested explicitly.
    // Skip-listed stages are a trust boundary: their own upstream
    // requirements are never expanded.
    let mut no_expand: HashSet<String> = HashSet::new();
    let mut round = 0;
    loop {
        round += 1;
        debug_assert!(round <= registry.len() + 1, "resolution did not converge");

        let mut added: Vec<Stage> = Vec::new();
        for stage in &stages {
            if no_expand.contains(&stage.name) {
                continue;
            }
            for req in stage.required_names() {
                if present.contains(req) {
                    continue;
                }
                let spec = registry.get(req).ok_or_else(|| WorkflowError::UnknownStage {
                    name: req.clone(),
                    required_by: Some(stage.name.clone()),
                })?;
                let mut implicit = instantiate(spec);
                if config.assumes_outputs_exist(req) {
                    implicit.assume_outputs_exist = true;
                }
                if config.skips_stage(req) {
                    implicit.skipped = true;
                    no_expand.insert(req.clone());
                } else if !force_all_implicit {
                    implicit.skipped = true;
                    if round > 1 {
                        // Only outputs of immediately required stages are
                        // checked; anything further upstream is trusted.
                        implicit.assume_outputs_exist = true;
                        info!(stage = %req, "implicit stage is skipped");
                    } else {
                        info!(
                            stage = %req,
                            required_by = %stage.name,
                            "implicit stage is skipped, but its output is required"
                        );
                    }
                }
                present.insert(req.clone());
                added.push(implicit);
            }
        }

        if added.is_empty() {
            break;
        }
        info!(
            stages = ?added.iter().map(Stage::name).collect::<Vec<_>>(),
            "additional implicit stages"
        );
        // Prepend this round's discoveries so dependencies are visited
        // before their dependents.
        added.extend(stages);
        stages = added;
    }

    // Bind the declared dependency names against the complete graph.
    // Skip-listed stages bind leniently: their missing upstreams were never
    // expanded and are not an error.
    for i in 0..stages.len() {
        let lenient = no_expand.contains(&stages[i].name);
        let mut bound = Vec::new();
        for req in stages[i].required_names().to_vec() {
            if present.contains(&req) {
                bound.push(req);
            } else if !lenient {
                return Err(WorkflowError::UnknownStage {
                    name: req,
                    required_by: Some(stages[i].name.clone()),
                });
            }
        }
        stages[i].required = bound;
    }

    // Apply the first/last stage window.
    let index_by_name: HashMap<String, usize> = stages
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.to_lowercase(), i))
        .collect();
    let position_of = |name: &str| -> Result<usize, WorkflowError> {
        index_by_name
            .get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| WorkflowError::UnknownStage {
                name: name.to_string(),
                required_by: None,
            })
    };

    if let Some(first) = &config.first_stage {
        let first_idx = position_of(first)?;
        for (i, stage) in stages.iter_mut().enumerate().take(first_idx) {
            stage.skipped = true;
            if i + 1 < first_idx {
                // Only the stage immediately before the window has its
                // outputs checked; everything earlier is trusted.
                stage.assume_outputs_exist = true;
            }
            info!(stage = %stage.name, "skipping stage before first_stage");
        }
    }

    let mut last_stage_index = None;
    if let Some(last) = &config.last_stage {
        let last_idx = position_of(last)?;
        last_stage_index = Some(last_idx);
        for stage in stages.iter_mut().skip(last_idx + 1) {
            stage.skipped = true;
            stage.assume_outputs_exist = true;
        }
    }

    // Reject cycles and mis-ordered requests: every dependency of a
    // runnable stage must be ordered before it.
    for (i, stage) in stages.iter().enumerate() {
        if stage.skipped {
            continue;
        }
        for req in &stage.required {
            let req_idx = index_by_name.get(&req.to_lowercase()).copied();
            if req_idx.map_or(true, |j| j >= i) {
                return Err(WorkflowError::CycleDetected {
                    stage: stage.name.clone(),
                    dependency: req.clone(),
                });
            }
        }
    }

    let final_set: Vec<&str> = stages
        .iter()
        .filter(|s| !s.skipped)
        .map(Stage::name)
        .collect();
    if final_set.is_empty() {
        return Err(WorkflowError::NoStagesToRun);
    }
    info!(stages = ?final_set, "resolved stages");

    let skipped_set: Vec<&str> = stages
        .iter()
        .filter(|s| s.skipped)
        .map(Stage::name)
        .collect();
    if !skipped_set.is_empty() {
        info!(stages = ?skipped_set, "skipped stages");
    }

    Ok(ResolvedStages {
        stages,
        last_stage_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubCohortStage, StubSampleStage};
    use crate::workflow::registry::StageSpec;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn chain_registry() -> StageRegistry {
        // Prepare <- Align <- Genotype <- JointCalling
        let mut registry = StageRegistry::new();
        registry
            .register(StageSpec::sample(
                "Prepare",
                Arc::new(StubSampleStage::new("out/prepare")),
            ))
            .unwrap();
        registry
            .register(
                StageSpec::sample("Align", Arc::new(StubSampleStage::new("out/align")))
                    .requires(["Prepare"]),
            )
            .unwrap();
        registry
            .register(
                StageSpec::sample("Genotype", Arc::new(StubSampleStage::new("out/gt")))
                    .requires(["Align"]),
            )
            .unwrap();
        registry
            .register(
                StageSpec::cohort(
                    "JointCalling",
                    Arc::new(StubCohortStage::new("out/jc").pulling_from("Genotype")),
                )
                .requires(["Genotype"]),
            )
            .unwrap();
        registry
    }

    fn names(resolved: &ResolvedStages) -> Vec<&str> {
        resolved.stages.iter().map(Stage::name).collect()
    }

    #[test]
    fn test_implicit_discovery_orders_dependencies_first() {
        let registry = chain_registry();
        let config = WorkflowConfig::default();
        let resolved = resolve(&registry, &["JointCalling"], &config, false).unwrap();

        assert_eq!(
            names(&resolved),
            vec!["Prepare", "Align", "Genotype", "JointCalling"]
        );

        let genotype = &resolved.stages[2];
        assert!(genotype.is_skipped());
        assert!(!genotype.assumes_outputs_exist());

        // Discovered one round further upstream: trusted outright.
        let align = &resolved.stages[1];
        assert!(align.is_skipped());
        assert!(align.assumes_outputs_exist());

        let jc = &resolved.stages[3];
        assert!(!jc.is_skipped());
    }

    #[test]
    fn test_requested_pair_keeps_both_active() {
        let registry = chain_registry();
        let config = WorkflowConfig::default();
        let resolved = resolve(&registry, &["Genotype", "JointCalling"], &config, false).unwrap();

        let genotype = resolved
            .stages
            .iter()
            .find(|s| s.name() == "Genotype")
            .unwrap();
        assert!(!genotype.is_skipped());
    }

    #[test]
    fn test_force_all_implicit() {
        let registry = chain_registry();
        let config = WorkflowConfig::default();
        let resolved = resolve(&registry, &["JointCalling"], &config, true).unwrap();

        assert!(resolved.stages.iter().all(|s| !s.is_skipped()));
    }

    #[test]
    fn test_skip_listed_stage_is_a_trust_boundary() {
        let registry = chain_registry();
        let config = WorkflowConfig {
            skip_stages: vec!["Align".to_string()],
            ..WorkflowConfig::default()
        };
        let resolved = resolve(&registry, &["Genotype"], &config, false).unwrap();

        // Align is skip-listed, so Prepare is never pulled in.
        assert_eq!(names(&resolved), vec!["Align", "Genotype"]);
        let align = &resolved.stages[0];
        assert!(align.is_skipped());
        // Its unexpanded dependency is bound leniently.
        assert!(align.required.is_empty());
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let registry = chain_registry();
        let config = WorkflowConfig::default();
        let err = resolve(&registry, &["Align", "Align"], &config, false).unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateStage { .. }));
    }

    #[test]
    fn test_unknown_request_rejected() {
        let registry = chain_registry();
        let config = WorkflowConfig::default();
        let err = resolve(&registry, &["Sweep"], &config, false).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStage { .. }));
    }

    #[test]
    fn test_unknown_required_stage_rejected() {
        let mut registry = StageRegistry::new();
        registry
            .register(
                StageSpec::sample("Align", Arc::new(StubSampleStage::new("out/align")))
                    .requires(["Fetch"]),
            )
            .unwrap();
        let config = WorkflowConfig::default();
        let err = resolve(&registry, &["Align"], &config, false).unwrap_err();
        match err {
            WorkflowError::UnknownStage { name, required_by } => {
                assert_eq!(name, "Fetch");
                assert_eq!(required_by.as_deref(), Some("Align"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_stage_window() {
        let registry = chain_registry();
        let config = WorkflowConfig {
            first_stage: Some("genotype".to_string()),
            ..WorkflowConfig::default()
        };
        let resolved = resolve(
            &registry,
            &["Prepare", "Align", "Genotype", "JointCalling"],
            &config,
            false,
        )
        .unwrap();

        let prepare = &resolved.stages[0];
        assert!(prepare.is_skipped());
        assert!(prepare.assumes_outputs_exist());

        // Immediately before the window: skipped, but outputs still checked.
        let align = &resolved.stages[1];
        assert!(align.is_skipped());
        assert!(!align.assumes_outputs_exist());

        assert!(!resolved.stages[2].is_skipped());
        assert!(!resolved.stages[3].is_skipped());
    }

    #[test]
    fn test_last_stage_window() {
        let registry = chain_registry();
        let config = WorkflowConfig {
            last_stage: Some("Align".to_string()),
            ..WorkflowConfig::default()
        };
        let resolved = resolve(
            &registry,
            &["Prepare", "Align", "Genotype", "JointCalling"],
            &config,
            false,
        )
        .unwrap();

        assert_eq!(resolved.last_stage_index, Some(1));
        let genotype = &resolved.stages[2];
        assert!(genotype.is_skipped());
        assert!(genotype.assumes_outputs_exist());
        let jc = &resolved.stages[3];
        assert!(jc.is_skipped());
        assert!(jc.assumes_outputs_exist());
    }

    #[test]
    fn test_unknown_first_stage_rejected() {
        let registry = chain_registry();
        let config = WorkflowConfig {
            first_stage: Some("Sweep".to_string()),
            ..WorkflowConfig::default()
        };
        let err = resolve(&registry, &["Align"], &config, false).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStage { .. }));
    }

    #[test]
    fn test_all_skipped_is_fatal() {
        let mut registry = StageRegistry::new();
        registry
            .register(
                StageSpec::sample("Align", Arc::new(StubSampleStage::new("out/align"))).skipped(),
            )
            .unwrap();
        let config = WorkflowConfig::default();
        let err = resolve(&registry, &["Align"], &config, false).unwrap_err();
        assert!(matches!(err, WorkflowError::NoStagesToRun));
    }

    #[test]
    fn test_misordered_request_rejected() {
        let registry = chain_registry();
        let config = WorkflowConfig::default();
        let err = resolve(&registry, &["Genotype", "Align"], &config, false).unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected { .. }));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let registry = chain_registry();
        let config = WorkflowConfig::default();
        let first = resolve(&registry, &["JointCalling"], &config, false).unwrap();
        let second = resolve(&registry, &["JointCalling"], &config, false).unwrap();
        assert_eq!(names(&first), names(&second));
    }
}
