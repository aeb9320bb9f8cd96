//! Kind-aware readiness interpretation
//!
//! A [`StatusReader`] translates one observed object into a coarse state.
//! Resolution walks an ordered registry: caller-supplied readers first,
//! then the built-ins for the wait mode in play. Jobs deliberately get
//! different readers per mode, since a plain wait accepts a running Job
//! while hook execution needs it to finish.

use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::batch::v1::JobStatus;
use k8s_openapi::api::core::v1::PodStatus;
use kube::api::DynamicObject;
use serde_json::Value;

/// Coarse lifecycle state of an observed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// No observation yet
    Unknown,
    /// Observed but not in its desired terminal state
    InProgress,
    /// Ready / desired state reached
    Current,
    /// Terminal failure (kinds with an explicit failure condition)
    Failed,
    /// Deleted from the cluster
    Gone,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::Unknown => "Unknown",
            ResourceState::InProgress => "InProgress",
            ResourceState::Current => "Current",
            ResourceState::Failed => "Failed",
            ResourceState::Gone => "Gone",
        };
        write!(f, "{s}")
    }
}

/// Result of reading one object's status
#[derive(Debug, Clone)]
pub struct Status {
    pub state: ResourceState,
    /// Human-readable detail for progress display and errors
    pub message: Option<String>,
}

impl Status {
    pub fn current() -> Self {
        Self {
            state: ResourceState::Current,
            message: None,
        }
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Self {
            state: ResourceState::InProgress,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: ResourceState::Failed,
            message: Some(message.into()),
        }
    }

    pub fn is_current(&self) -> bool {
        self.state == ResourceState::Current
    }

    pub fn is_failed(&self) -> bool {
        self.state == ResourceState::Failed
    }
}

/// Interprets observed objects of the kinds it supports.
pub trait StatusReader: Send + Sync {
    /// Whether this reader handles the given group/kind.
    fn supports(&self, group: &str, kind: &str) -> bool;

    /// Translate the observed object into a state.
    fn read_status(&self, obj: &DynamicObject) -> Status;
}

/// Deserialize the status subtree into a typed k8s struct.
///
/// Missing or malformed status yields the type's default, which reads
/// as "nothing reported yet".
fn typed_status<T>(obj: &DynamicObject) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    obj.data
        .get("status")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Structural fallback for kinds without a dedicated reader.
///
/// Inspects the conventional status shape: observedGeneration,
/// Ready/Available conditions, and replica counts. Kinds that expose
/// none of these (ConfigMap, Service, ...) are ready as soon as they
/// exist.
pub struct GenericReader;

impl StatusReader for GenericReader {
    fn supports(&self, _group: &str, _kind: &str) -> bool {
        true
    }

    fn read_status(&self, obj: &DynamicObject) -> Status {
        if obj.metadata.deletion_timestamp.is_some() {
            return Status::in_progress("terminating");
        }

        // A controller that has not seen the latest spec cannot have
        // reported a meaningful status yet.
        let observed = obj
            .data
            .pointer("/status/observedGeneration")
            .and_then(Value::as_i64);
        if let (Some(generation), Some(observed)) = (obj.metadata.generation, observed) {
            if observed < generation {
                return Status::in_progress(format!(
                    "observed generation {observed} behind {generation}"
                ));
            }
        }

        if let Some(conditions) = obj
            .data
            .pointer("/status/conditions")
            .and_then(Value::as_array)
        {
            for condition in conditions {
                let type_ = condition.get("type").and_then(Value::as_str).unwrap_or("");
                let status = condition
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if (type_ == "Ready" || type_ == "Available") && status != "True" {
                    let message = condition
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("condition not met");
                    return Status::in_progress(format!("{type_}: {message}"));
                }
            }
        }

        // Replica-shaped workloads: every reported count must match spec.
        if let Some(desired) = obj.data.pointer("/spec/replicas").and_then(Value::as_i64) {
            for field in ["readyReplicas", "updatedReplicas", "availableReplicas"] {
                let actual = obj
                    .data
                    .pointer(&format!("/status/{field}"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                if actual != desired {
                    return Status::in_progress(format!("{actual}/{desired} {field}"));
                }
            }
        }

        Status::current()
    }
}

/// Job reader for plain waits: a running Job with ready pods counts.
pub struct JobReadyReader;

impl StatusReader for JobReadyReader {
    fn supports(&self, group: &str, kind: &str) -> bool {
        group == "batch" && kind == "Job"
    }

    fn read_status(&self, obj: &DynamicObject) -> Status {
        let status: JobStatus = typed_status(obj);

        if job_condition(&status, "Failed") {
            return Status::failed(job_failure_reason(&status));
        }

        let succeeded = status.succeeded.unwrap_or(0);
        let active = status.active.unwrap_or(0);
        let ready = status.ready.unwrap_or(0);

        if succeeded > 0 || (active > 0 && ready > 0) {
            return Status::current();
        }

        Status::in_progress(format!("{active} active, {succeeded} succeeded"))
    }
}

/// Job reader that requires a terminal Complete condition.
pub struct JobCompleteReader;

impl StatusReader for JobCompleteReader {
    fn supports(&self, group: &str, kind: &str) -> bool {
        group == "batch" && kind == "Job"
    }

    fn read_status(&self, obj: &DynamicObject) -> Status {
        let status: JobStatus = typed_status(obj);

        if job_condition(&status, "Complete") {
            return Status::current();
        }

        let failed = status.failed.unwrap_or(0);
        let active = status.active.unwrap_or(0);
        if job_condition(&status, "Failed") || (failed > 0 && active == 0) {
            return Status::failed(job_failure_reason(&status));
        }

        Status::in_progress(format!(
            "{active} active, {} succeeded",
            status.succeeded.unwrap_or(0)
        ))
    }
}

/// Pod reader for hook watching: only terminal phases resolve.
pub struct PodReader;

impl StatusReader for PodReader {
    fn supports(&self, group: &str, kind: &str) -> bool {
        group.is_empty() && kind == "Pod"
    }

    fn read_status(&self, obj: &DynamicObject) -> Status {
        let status: PodStatus = typed_status(obj);
        match status.phase.as_deref() {
            Some("Succeeded") => Status::current(),
            Some("Failed") => {
                let message = status
                    .message
                    .clone()
                    .unwrap_or_else(|| "pod failed".to_string());
                Status::failed(message)
            }
            Some(phase) => Status::in_progress(phase),
            None => Status::in_progress("Pending"),
        }
    }
}

/// Claims every kind as immediately ready once observed.
///
/// Terminal fallback for hook watching, where non-workload readiness is
/// not actionable.
pub struct AlwaysReadyReader;

impl StatusReader for AlwaysReadyReader {
    fn supports(&self, _group: &str, _kind: &str) -> bool {
        true
    }

    fn read_status(&self, _obj: &DynamicObject) -> Status {
        Status::current()
    }
}

fn job_condition(status: &JobStatus, type_: &str) -> bool {
    status
        .conditions
        .as_ref()
        .map(|conditions| {
            conditions
                .iter()
                .any(|cond| cond.type_ == type_ && cond.status == "True")
        })
        .unwrap_or(false)
}

fn job_failure_reason(status: &JobStatus) -> String {
    status
        .conditions
        .as_ref()
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|cond| cond.type_ == "Failed")
                .and_then(|cond| cond.message.clone())
        })
        .unwrap_or_else(|| format!("job failed with {} failures", status.failed.unwrap_or(0)))
}

/// Ordered reader list resolved first-match.
pub struct ReaderRegistry {
    readers: Vec<Arc<dyn StatusReader>>,
}

impl ReaderRegistry {
    /// Readers for a plain readiness wait.
    pub fn for_wait(custom: &[Arc<dyn StatusReader>]) -> Self {
        Self::with_builtins(custom, vec![Arc::new(JobReadyReader), Arc::new(GenericReader)])
    }

    /// Readers for a wait that requires Job completion.
    pub fn for_wait_with_jobs(custom: &[Arc<dyn StatusReader>]) -> Self {
        Self::with_builtins(
            custom,
            vec![Arc::new(JobCompleteReader), Arc::new(GenericReader)],
        )
    }

    /// Readers for hook watching: only terminal workload states matter.
    pub fn for_watch_until_ready(custom: &[Arc<dyn StatusReader>]) -> Self {
        Self::with_builtins(
            custom,
            vec![
                Arc::new(JobCompleteReader),
                Arc::new(PodReader),
                Arc::new(AlwaysReadyReader),
            ],
        )
    }

    fn with_builtins(
        custom: &[Arc<dyn StatusReader>],
        builtins: Vec<Arc<dyn StatusReader>>,
    ) -> Self {
        let mut readers: Vec<Arc<dyn StatusReader>> = custom.to_vec();
        readers.extend(builtins);
        Self { readers }
    }

    /// Read the object's status through the first matching reader.
    pub fn read(&self, group: &str, kind: &str, obj: &DynamicObject) -> Status {
        for reader in &self.readers {
            if reader.supports(group, kind) {
                return reader.read_status(obj);
            }
        }

        Status {
            state: ResourceState::Unknown,
            message: None,
        }
    }
}
