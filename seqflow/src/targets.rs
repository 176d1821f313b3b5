//! The target hierarchy a stage acts on: a [`Sample`], a [`Dataset`]
//! (a container of samples), or the whole [`Cohort`].
//!
//! Targets are built once per run, before any stage executes. The `active`
//! flag may be cleared by the decision engine mid-resolution (a target with
//! missing upstream results can be dropped from the rest of the run); it is
//! never set back.

use crate::jobs::JobAttrs;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single sequenced sample.
#[derive(Debug)]
pub struct Sample {
    id: String,
    external_id: Option<String>,
    dataset_name: String,
    active: AtomicBool,
    forced: AtomicBool,
}

impl Sample {
    fn new(id: impl Into<String>, external_id: Option<String>, dataset_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external_id,
            dataset_name: dataset_name.into(),
            active: AtomicBool::new(true),
            forced: AtomicBool::new(false),
        }
    }

    /// Stable sample id, unique within the cohort.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// External (submitter-side) id, if known.
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// Name of the dataset the sample belongs to.
    #[must_use]
    pub fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    /// Whether the sample participates in stage processing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Sets the `active` flag.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Whether re-execution is forced for this sample.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::Relaxed)
    }

    /// Sets the `forced` flag.
    pub fn set_forced(&self, forced: bool) {
        self.forced.store(forced, Ordering::Relaxed);
    }

    /// Job-attribute tags for execution handles processing this sample.
    #[must_use]
    pub fn job_attrs(&self) -> JobAttrs {
        let mut attrs = JobAttrs::new();
        attrs.insert("dataset".to_string(), self.dataset_name.clone());
        attrs.insert("sample".to_string(), self.id.clone());
        attrs
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.external_id {
            Some(ext) => write!(f, "{}|{ext}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// A named collection of samples.
#[derive(Debug)]
pub struct Dataset {
    name: String,
    samples: RwLock<Vec<Arc<Sample>>>,
    active: AtomicBool,
    forced: AtomicBool,
}

impl Dataset {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: RwLock::new(Vec::new()),
            active: AtomicBool::new(true),
            forced: AtomicBool::new(false),
        }
    }

    /// Dataset name, unique within the cohort.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a sample and returns a shared handle to it.
    pub fn add_sample(
        &self,
        id: impl Into<String>,
        external_id: Option<String>,
    ) -> Arc<Sample> {
        let sample = Arc::new(Sample::new(id, external_id, self.name.clone()));
        self.samples.write().push(Arc::clone(&sample));
        sample
    }

    /// Samples in insertion order.
    #[must_use]
    pub fn samples(&self, only_active: bool) -> Vec<Arc<Sample>> {
        self.samples
            .read()
            .iter()
            .filter(|s| !only_active || s.is_active())
            .cloned()
            .collect()
    }

    /// Sample ids in insertion order.
    #[must_use]
    pub fn sample_ids(&self, only_active: bool) -> Vec<String> {
        self.samples(only_active)
            .iter()
            .map(|s| s.id().to_string())
            .collect()
    }

    /// Whether the dataset participates in stage processing.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Sets the `active` flag.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Whether re-execution is forced for this dataset.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::Relaxed)
    }

    /// Sets the `forced` flag.
    pub fn set_forced(&self, forced: bool) {
        self.forced.store(forced, Ordering::Relaxed);
    }

    /// Job-attribute tags for execution handles processing this dataset.
    #[must_use]
    pub fn job_attrs(&self) -> JobAttrs {
        let mut attrs = JobAttrs::new();
        attrs.insert("dataset".to_string(), self.name.clone());
        attrs
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// All input datasets of a single workflow run.
#[derive(Debug)]
pub struct Cohort {
    name: String,
    datasets: RwLock<Vec<Arc<Dataset>>>,
    forced: AtomicBool,
}

impl Cohort {
    /// Creates an empty cohort named after the analysis dataset.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datasets: RwLock::new(Vec::new()),
            forced: AtomicBool::new(false),
        }
    }

    /// Cohort name (the analysis dataset).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a dataset and returns a shared handle to it.
    pub fn create_dataset(&self, name: impl Into<String>) -> Arc<Dataset> {
        let dataset = Arc::new(Dataset::new(name));
        self.datasets.write().push(Arc::clone(&dataset));
        dataset
    }

    /// Datasets in insertion order.
    #[must_use]
    pub fn datasets(&self, only_active: bool) -> Vec<Arc<Dataset>> {
        self.datasets
            .read()
            .iter()
            .filter(|d| !only_active || d.is_active())
            .cloned()
            .collect()
    }

    /// All samples across datasets, in dataset then insertion order.
    #[must_use]
    pub fn samples(&self, only_active: bool) -> Vec<Arc<Sample>> {
        self.datasets(only_active)
            .iter()
            .flat_map(|d| d.samples(only_active))
            .collect()
    }

    /// All sample ids across datasets.
    #[must_use]
    pub fn sample_ids(&self, only_active: bool) -> Vec<String> {
        self.samples(only_active)
            .iter()
            .map(|s| s.id().to_string())
            .collect()
    }

    /// Whether re-execution is forced for the whole cohort.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::Relaxed)
    }

    /// Sets the `forced` flag.
    pub fn set_forced(&self, forced: bool) {
        self.forced.store(forced, Ordering::Relaxed);
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cohort {}", self.name)
    }
}

/// A shared reference to a target of any granularity.
#[derive(Debug, Clone)]
pub enum TargetRef {
    /// A single sample.
    Sample(Arc<Sample>),
    /// A dataset of samples.
    Dataset(Arc<Dataset>),
    /// The whole cohort.
    Cohort(Arc<Cohort>),
}

impl TargetRef {
    /// Stable id, unique within the target's granularity.
    #[must_use]
    pub fn target_id(&self) -> String {
        match self {
            Self::Sample(s) => s.id().to_string(),
            Self::Dataset(d) => d.name().to_string(),
            Self::Cohort(c) => c.name().to_string(),
        }
    }

    /// The granularity name, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sample(_) => "sample",
            Self::Dataset(_) => "dataset",
            Self::Cohort(_) => "cohort",
        }
    }

    /// Whether the target participates in stage processing.
    ///
    /// The cohort as a whole is always active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        match self {
            Self::Sample(s) => s.is_active(),
            Self::Dataset(d) => d.is_active(),
            Self::Cohort(_) => true,
        }
    }

    /// Clears or sets the `active` flag (no-op for the cohort).
    pub fn set_active(&self, active: bool) {
        match self {
            Self::Sample(s) => s.set_active(active),
            Self::Dataset(d) => d.set_active(active),
            Self::Cohort(_) => {}
        }
    }

    /// Whether re-execution is forced for this target.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        match self {
            Self::Sample(s) => s.is_forced(),
            Self::Dataset(d) => d.is_forced(),
            Self::Cohort(c) => c.is_forced(),
        }
    }

    /// The flattened set of sample ids the target covers, used for
    /// dependency-handle intersection.
    #[must_use]
    pub fn sample_ids(&self, only_active: bool) -> Vec<String> {
        match self {
            Self::Sample(s) => {
                if !only_active || s.is_active() {
                    vec![s.id().to_string()]
                } else {
                    Vec::new()
                }
            }
            Self::Dataset(d) => d.sample_ids(only_active),
            Self::Cohort(c) => c.sample_ids(only_active),
        }
    }

    /// Job-attribute tags for execution handles processing this target.
    #[must_use]
    pub fn job_attrs(&self) -> JobAttrs {
        match self {
            Self::Sample(s) => s.job_attrs(),
            Self::Dataset(d) => d.job_attrs(),
            Self::Cohort(_) => JobAttrs::new(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sample(s) => write!(f, "sample {s}"),
            Self::Dataset(d) => write!(f, "dataset {d}"),
            Self::Cohort(c) => write!(f, "{c}"),
        }
    }
}
