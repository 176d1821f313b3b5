//! Reporting stage results to an external metadata service.
//!
//! Reporting is fire-and-forget: a reporter failure is logged by the driver
//! and never aborts a successful stage. The orchestrator calls the reporter
//! in two situations: when a stage's results are reused (the analysis is
//! already complete), and when fresh jobs are queued (the service should
//! track them).

use crate::jobs::JobHandle;
use crate::stages::OutputData;
use crate::targets::TargetRef;
use std::collections::HashMap;
use thiserror::Error;

/// Failure inside a status reporter.
#[derive(Debug, Error)]
#[error("status reporter error: {0}")]
pub struct StatusError(pub String);

/// External collaborator that tracks per-target analysis entries.
pub trait StatusReporter: Send + Sync {
    /// Records an already-complete analysis for a reused result.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] on reporting failure; the driver logs it and
    /// carries on.
    fn record_completed(
        &self,
        stage: &str,
        analysis_type: &str,
        target: &TargetRef,
        output: &OutputData,
        meta: &HashMap<String, serde_json::Value>,
    ) -> Result<(), StatusError>;

    /// Registers freshly queued work and its upstream dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] on reporting failure; the driver logs it and
    /// carries on.
    #[allow(clippy::too_many_arguments)]
    fn queue_updaters(
        &self,
        stage: &str,
        analysis_type: &str,
        target: &TargetRef,
        output: &OutputData,
        jobs: &[JobHandle],
        prev_jobs: &[JobHandle],
        meta: &HashMap<String, serde_json::Value>,
    ) -> Result<(), StatusError>;
}

/// Reporter that only logs, for runs without a metadata service.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStatusReporter;

impl StatusReporter for LoggingStatusReporter {
    fn record_completed(
        &self,
        stage: &str,
        analysis_type: &str,
        target: &TargetRef,
        output: &OutputData,
        _meta: &HashMap<String, serde_json::Value>,
    ) -> Result<(), StatusError> {
        tracing::info!(
            stage,
            analysis_type,
            target = %target,
            output = ?output,
            "analysis completed (reused)"
        );
        Ok(())
    }

    fn queue_updaters(
        &self,
        stage: &str,
        analysis_type: &str,
        target: &TargetRef,
        _output: &OutputData,
        jobs: &[JobHandle],
        prev_jobs: &[JobHandle],
        _meta: &HashMap<String, serde_json::Value>,
    ) -> Result<(), StatusError> {
        tracing::info!(
            stage,
            analysis_type,
            target = %target,
            jobs = jobs.len(),
            prev_jobs = prev_jobs.len(),
            "analysis queued"
        );
        Ok(())
    }
}
