//! The per-(stage, target) execution decision.

use crate::config::WorkflowConfig;
use crate::errors::WorkflowError;
use crate::stages::output::ExpectedOutputs;
use crate::stages::Stage;
use crate::storage::ExistenceCache;
use crate::targets::TargetRef;
use tracing::{debug, info, warn};

/// What a stage should do with a specific target. Terminal per invocation,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Emit fresh jobs for the target.
    Queue,
    /// Produce nothing for the target.
    Skip,
    /// Trust the existing outputs; no new work.
    Reuse,
}

/// Decides, for a given (stage, target) pair, whether to queue, skip, or
/// reuse, from the stage/target flags, the configured skip and override
/// lists, and cached expected-output existence checks.
pub struct Decider<'a> {
    config: &'a WorkflowConfig,
    exists: &'a ExistenceCache,
}

impl<'a> Decider<'a> {
    /// Creates a decider over the run's configuration and existence cache.
    #[must_use]
    pub fn new(config: &'a WorkflowConfig, exists: &'a ExistenceCache) -> Self {
        Self { config, exists }
    }

    /// Determines the [`Action`] for `target`, in strict priority order:
    /// explicit force first, per-target skip lists second, verified (or
    /// trusted) reuse after that, queueing as the default.
    ///
    /// A required-but-skipped stage with missing outputs either deactivates
    /// the target (`skip_samples_with_missing_input`), reuses optimistically
    /// (`allow_missing_outputs_for_stages`), or fails the run.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::MissingOutputs`] for the unrecoverable skipped-stage
    /// case; [`WorkflowError::Storage`] when an existence check fails.
    pub fn decide(&self, stage: &Stage, target: &TargetRef) -> Result<Action, WorkflowError> {
        if target.is_forced() && !stage.skipped {
            return Ok(Action::Queue);
        }

        if let Some(skip_targets) = self.config.skip_targets_for(&stage.name) {
            if skip_targets.contains(&target.target_id()) {
                info!(stage = %stage.name, target = %target, "requested to skip target");
                return Ok(Action::Skip);
            }
        }

        let expected = stage.runner.expected_outputs(&stage.name, target)?;
        let (reusable, first_missing) = self.reusable(stage, &expected)?;

        if stage.skipped {
            if reusable && first_missing.is_none() {
                return Ok(Action::Reuse);
            }
            if self.config.skip_samples_with_missing_input {
                warn!(
                    stage = %stage.name,
                    target = %target,
                    missing = first_missing.as_deref().unwrap_or(""),
                    "stage is required but skipped and expected outputs are missing; \
                     deactivating target for the rest of the run"
                );
                target.set_active(false);
                return Ok(Action::Skip);
            }
            if self.config.allows_missing_outputs(&stage.name) {
                return Ok(Action::Reuse);
            }
            return Err(WorkflowError::MissingOutputs {
                stage: stage.name.clone(),
                target: target.target_id(),
                first_missing,
            });
        }

        if reusable && first_missing.is_none() {
            if target.is_forced() {
                info!(
                    stage = %stage.name,
                    target = %target,
                    "can reuse, but target is forced to rerun"
                );
                return Ok(Action::Queue);
            }
            if stage.forced {
                info!(
                    stage = %stage.name,
                    target = %target,
                    "can reuse, but stage is forced to rerun"
                );
                return Ok(Action::Queue);
            }
            info!(stage = %stage.name, target = %target, "reusing existing results");
            return Ok(Action::Reuse);
        }

        debug!(stage = %stage.name, target = %target, "queueing jobs");
        Ok(Action::Queue)
    }

    /// Whether the expected outputs qualify for reuse, and the first path
    /// that failed the existence check if not.
    ///
    /// With `assume_outputs_exist` the outputs are trusted outright. With
    /// `check_expected_outputs` every path leaf is checked (an empty path
    /// set is never reusable). Without checking, only skipped stages are
    /// trusted to have produced prior outputs.
    fn reusable(
        &self,
        stage: &Stage,
        expected: &ExpectedOutputs,
    ) -> Result<(bool, Option<String>), WorkflowError> {
        if stage.assume_outputs_exist {
            return Ok((true, None));
        }

        if self.config.check_expected_outputs {
            let paths = expected.paths();
            if paths.is_empty() {
                return Ok((false, None));
            }
            for path in paths {
                if !self.exists.exists(path)? {
                    return Ok((false, Some(path.to_string())));
                }
            }
            return Ok((true, None));
        }

        Ok((stage.skipped, None))
    }
}
