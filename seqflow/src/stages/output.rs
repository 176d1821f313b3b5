//! Stage result types: declared expected outputs, produced data, and the
//! recorded per-target [`StageOutput`].

use crate::errors::WorkflowError;
use crate::jobs::{JobAttrs, JobHandle, Resource};
use crate::targets::TargetRef;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One declared output of a stage for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutput {
    /// A path in the object store, subject to existence checks.
    Path(String),
    /// A non-path output (e.g. a metadata-service entry), never
    /// existence-checked.
    Label(String),
}

/// Everything a stage declares it will produce for a target.
///
/// Returned by the stage-supplied `expected_outputs` function; consumed by
/// the decision engine (existence checks) and by reuse synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExpectedOutputs {
    /// The stage produces nothing checkable for this target.
    #[default]
    None,
    /// A single output.
    Single(ExpectedOutput),
    /// Named outputs, in name order.
    Named(BTreeMap<String, ExpectedOutput>),
}

impl ExpectedOutputs {
    /// No declared outputs.
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// A single path output.
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self::Single(ExpectedOutput::Path(path.into()))
    }

    /// A single non-path output.
    #[must_use]
    pub fn label(label: impl Into<String>) -> Self {
        Self::Single(ExpectedOutput::Label(label.into()))
    }

    /// Named outputs.
    #[must_use]
    pub fn named<K: Into<String>>(entries: impl IntoIterator<Item = (K, ExpectedOutput)>) -> Self {
        Self::Named(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The path-valued leaves, in deterministic order. Labels are excluded.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Self::None => Vec::new(),
            Self::Single(ExpectedOutput::Path(p)) => vec![p.as_str()],
            Self::Single(ExpectedOutput::Label(_)) => Vec::new(),
            Self::Named(entries) => entries
                .values()
                .filter_map(|v| match v {
                    ExpectedOutput::Path(p) => Some(p.as_str()),
                    ExpectedOutput::Label(_) => None,
                })
                .collect(),
        }
    }

    /// Whether nothing was declared.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// What a stage actually produced for a target.
///
/// A tagged union rather than a dynamically-shaped value: accessors fail
/// loudly on a shape mismatch instead of coercing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputData {
    /// Nothing recorded.
    #[default]
    None,
    /// A single object-store path.
    Path(String),
    /// A single execution-produced resource.
    Resource(Resource),
    /// Named object-store paths, in name order.
    PathMap(BTreeMap<String, String>),
    /// Named execution-produced resources, in name order.
    ResourceMap(BTreeMap<String, Resource>),
}

impl OutputData {
    /// Short shape name for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Path(_) => "path",
            Self::Resource(_) => "resource",
            Self::PathMap(_) => "path map",
            Self::ResourceMap(_) => "resource map",
        }
    }

    /// Whether any data is recorded.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<&ExpectedOutputs> for OutputData {
    /// Conversion used when synthesizing a reuse output directly from the
    /// declared expected outputs. Labels become plain path strings, matching
    /// what a completed prior run would have recorded.
    fn from(expected: &ExpectedOutputs) -> Self {
        fn as_string(output: &ExpectedOutput) -> String {
            match output {
                ExpectedOutput::Path(s) | ExpectedOutput::Label(s) => s.clone(),
            }
        }
        match expected {
            ExpectedOutputs::None => Self::None,
            ExpectedOutputs::Single(v) => Self::Path(as_string(v)),
            ExpectedOutputs::Named(entries) => Self::PathMap(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), as_string(v)))
                    .collect(),
            ),
        }
    }
}

/// The recorded result of running, reusing, or failing a stage for one
/// target.
///
/// Immutable once recorded: the driver stamps the producing stage's name and
/// merges job attributes into `meta` exactly once, then the output is only
/// ever read (through [`StageInput`](crate::stages::StageInput)) by
/// downstream stages.
#[derive(Debug, Clone)]
pub struct StageOutput {
    stage_name: Option<String>,
    target: TargetRef,
    data: OutputData,
    jobs: Vec<JobHandle>,
    meta: HashMap<String, serde_json::Value>,
    reusable: bool,
    skipped: bool,
    error_msg: Option<String>,
}

impl StageOutput {
    /// A freshly produced output.
    #[must_use]
    pub fn new(target: TargetRef, data: OutputData) -> Self {
        Self {
            stage_name: None,
            target,
            data,
            jobs: Vec::new(),
            meta: HashMap::new(),
            reusable: false,
            skipped: false,
            error_msg: None,
        }
    }

    /// An output synthesized from existing results; no new work.
    #[must_use]
    pub fn reused(target: TargetRef, data: OutputData) -> Self {
        let mut out = Self::new(target, data);
        out.reusable = true;
        out
    }

    /// A placeholder output for a skipped stage.
    #[must_use]
    pub fn skipped(target: TargetRef) -> Self {
        let mut out = Self::new(target, OutputData::None);
        out.skipped = true;
        out
    }

    /// A per-target failure; collected and reported by the driver.
    #[must_use]
    pub fn error(target: TargetRef, message: impl Into<String>) -> Self {
        let mut out = Self::new(target, OutputData::None);
        out.error_msg = Some(message.into());
        out
    }

    /// Attaches execution handles.
    #[must_use]
    pub fn with_jobs(mut self, jobs: Vec<JobHandle>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Attaches a single execution handle.
    #[must_use]
    pub fn with_job(mut self, job: JobHandle) -> Self {
        self.jobs.push(job);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// The producing stage's name; set by the driver when recording.
    #[must_use]
    pub fn stage_name(&self) -> Option<&str> {
        self.stage_name.as_deref()
    }

    /// The target this output belongs to.
    #[must_use]
    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    /// The produced data.
    #[must_use]
    pub fn data(&self) -> &OutputData {
        &self.data
    }

    /// Execution handles produced for this target.
    #[must_use]
    pub fn jobs(&self) -> &[JobHandle] {
        &self.jobs
    }

    /// Output metadata.
    #[must_use]
    pub fn meta(&self) -> &HashMap<String, serde_json::Value> {
        &self.meta
    }

    /// Whether the output was reused rather than produced.
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    /// Whether the stage was skipped for this target.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// The failure message, if the stage failed for this target.
    #[must_use]
    pub fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }

    pub(crate) fn set_stage_name(&mut self, name: &str) {
        self.stage_name = Some(name.to_string());
    }

    pub(crate) fn merge_attrs(&mut self, attrs: &JobAttrs) {
        for (k, v) in attrs {
            self.meta
                .insert(k.clone(), serde_json::Value::String(v.clone()));
        }
    }

    fn shape_error(&self, wanted: impl Into<String>) -> WorkflowError {
        WorkflowError::DataShape {
            stage: self
                .stage_name
                .clone()
                .unwrap_or_else(|| "<unset>".to_string()),
            wanted: wanted.into(),
            found: self.data.kind().to_string(),
        }
    }

    /// The single path result.
    ///
    /// A single-entry path map is accepted; a larger map requires
    /// [`Self::as_path_keyed`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DataShape`] when the stored data is not a
    /// single path.
    pub fn as_path(&self) -> Result<&str, WorkflowError> {
        match &self.data {
            OutputData::Path(p) => Ok(p),
            OutputData::PathMap(m) if m.len() == 1 => {
                Ok(m.values().next().map_or("", String::as_str))
            }
            OutputData::PathMap(_) => {
                Err(self.shape_error("single path (map has more than one entry; pass a key)"))
            }
            _ => Err(self.shape_error("path")),
        }
    }

    /// The path stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DataShape`] when the data is not a path map
    /// or the key is absent.
    pub fn as_path_keyed(&self, key: &str) -> Result<&str, WorkflowError> {
        match &self.data {
            OutputData::PathMap(m) => m
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| self.shape_error(format!("path under key '{key}'"))),
            _ => Err(self.shape_error(format!("path map with key '{key}'"))),
        }
    }

    /// The single resource result.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DataShape`] when the stored data is not a
    /// single resource.
    pub fn as_resource(&self) -> Result<&Resource, WorkflowError> {
        match &self.data {
            OutputData::Resource(r) => Ok(r),
            OutputData::ResourceMap(m) if m.len() == 1 => m
                .values()
                .next()
                .ok_or_else(|| self.shape_error("resource")),
            OutputData::ResourceMap(_) => {
                Err(self.shape_error("single resource (map has more than one entry; pass a key)"))
            }
            _ => Err(self.shape_error("resource")),
        }
    }

    /// The resource stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DataShape`] when the data is not a resource
    /// map or the key is absent.
    pub fn as_resource_keyed(&self, key: &str) -> Result<&Resource, WorkflowError> {
        match &self.data {
            OutputData::ResourceMap(m) => m
                .get(key)
                .ok_or_else(|| self.shape_error(format!("resource under key '{key}'"))),
            _ => Err(self.shape_error(format!("resource map with key '{key}'"))),
        }
    }

    /// The full path map.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DataShape`] when the data is not a path map.
    pub fn as_path_map(&self) -> Result<&BTreeMap<String, String>, WorkflowError> {
        match &self.data {
            OutputData::PathMap(m) => Ok(m),
            _ => Err(self.shape_error("path map")),
        }
    }

    /// The full resource map.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DataShape`] when the data is not a resource
    /// map.
    pub fn as_resource_map(&self) -> Result<&BTreeMap<String, Resource>, WorkflowError> {
        match &self.data {
            OutputData::ResourceMap(m) => Ok(m),
            _ => Err(self.shape_error("resource map")),
        }
    }
}

impl fmt::Display for StageOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StageOutput({:?} target={} stage={}",
            self.data,
            self.target,
            self.stage_name.as_deref().unwrap_or("<unset>"),
        )?;
        if self.reusable {
            write!(f, " [reusable]")?;
        }
        if self.skipped {
            write!(f, " [skipped]")?;
        }
        if let Some(err) = &self.error_msg {
            write!(f, " [error: {err}]")?;
        }
        write!(f, ")")
    }
}
