//! Abstraction over the external job execution engine.
//!
//! The orchestrator never runs work itself; it emits job descriptions to a
//! [`JobBackend`] and records ordering constraints between the returned
//! handles. Handles are opaque: the core compares them by identity and calls
//! [`JobHandle::depends_on`], nothing else. The engine is free to execute
//! with arbitrary internal parallelism, and the core never blocks waiting
//! for a handle to complete.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// String tags attached to jobs for bookkeeping in the execution engine.
pub type JobAttrs = BTreeMap<String, String>;

/// The contract the external execution engine implements.
pub trait JobBackend: Send + Sync {
    /// Registers a new unit of work and returns its identity.
    fn create_job(&self, name: &str, attrs: &JobAttrs) -> Uuid;

    /// Records that `job` must not start before `depends_on` completes.
    ///
    /// Idempotent and order-independent.
    fn add_dependency(&self, job: Uuid, depends_on: Uuid);
}

/// Handle-returning convenience layer over a shared [`JobBackend`].
pub trait JobBackendExt {
    /// Creates a job and wraps its identity in a [`JobHandle`].
    fn new_job(&self, name: &str, attrs: &JobAttrs) -> JobHandle;
}

impl JobBackendExt for Arc<dyn JobBackend> {
    fn new_job(&self, name: &str, attrs: &JobAttrs) -> JobHandle {
        let id = self.create_job(name, attrs);
        JobHandle {
            id,
            backend: Arc::clone(self),
        }
    }
}

/// Opaque reference to a unit of externally-scheduled work.
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    backend: Arc<dyn JobBackend>,
}

impl JobHandle {
    /// The handle's identity within the execution engine.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Records that this job must wait for `other` to complete.
    pub fn depends_on(&self, other: &JobHandle) {
        self.backend.add_dependency(self.id, other.id);
    }
}

impl PartialEq for JobHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for JobHandle {}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}

/// An execution-produced value (e.g. an intermediate file living inside the
/// engine), passed between stages without ever touching the object store.
///
/// The core never inspects resource internals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    id: Uuid,
    label: String,
}

impl Resource {
    /// Creates a resource with a fresh identity.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
        }
    }

    /// The resource's identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A recorded job inside [`LocalBackend`].
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Job identity.
    pub id: Uuid,
    /// Job name as submitted.
    pub name: String,
    /// Attribute tags as submitted.
    pub attrs: JobAttrs,
}

/// In-memory backend recording jobs and dependency edges.
///
/// Useful for tests and dry runs; nothing is ever executed.
#[derive(Default)]
pub struct LocalBackend {
    jobs: RwLock<Vec<JobRecord>>,
    deps: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl LocalBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs submitted so far.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }

    /// Snapshot of all submitted jobs, in submission order.
    #[must_use]
    pub fn jobs(&self) -> Vec<JobRecord> {
        self.jobs.read().clone()
    }

    /// The first job whose name matches, if any.
    #[must_use]
    pub fn job_named(&self, name: &str) -> Option<JobRecord> {
        self.jobs.read().iter().find(|j| j.name == name).cloned()
    }

    /// Identities the given job depends on.
    #[must_use]
    pub fn dependencies_of(&self, job: Uuid) -> Vec<Uuid> {
        self.deps
            .read()
            .get(&job)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl JobBackend for LocalBackend {
    fn create_job(&self, name: &str, attrs: &JobAttrs) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.write().push(JobRecord {
            id,
            name: name.to_string(),
            attrs: attrs.clone(),
        });
        id
    }

    fn add_dependency(&self, job: Uuid, depends_on: Uuid) {
        self.deps.write().entry(job).or_default().insert(depends_on);
    }
}
