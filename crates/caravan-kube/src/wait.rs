//! Readiness and deletion waiting
//!
//! Polls the cluster until every tracked resource settles, with one
//! deadline covering the whole call. Resources are grouped by namespace
//! and each group is polled by its own concurrent worker, so one slow
//! namespace does not starve the others and an authorization failure
//! stays scoped to the group that hit it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use caravan_core::{Resource, ResourceKey};
use chrono::Duration;
use futures::future;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;

use crate::cluster::ClusterBackend;
use crate::convert::gvk_of;
use crate::error::{KubeError, Result};
use crate::readers::{ReaderRegistry, ResourceState, Status, StatusReader};

/// How observed objects resolve and when a resource counts as settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitMode {
    /// Readiness; running Jobs with ready pods count
    Ready,
    /// Readiness; Jobs must reach a terminal Complete condition
    ReadyWithJobs,
    /// Hook watching; only terminal workload states matter
    Watch,
    /// Absence; settled once the object is gone
    Delete,
}

/// Waits for sets of resources to become ready or disappear.
pub struct StatusWaiter<B: ClusterBackend> {
    backend: Arc<B>,
    custom_readers: Vec<Arc<dyn StatusReader>>,
    poll_interval: Duration,
}

impl<B: ClusterBackend> StatusWaiter<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            custom_readers: Vec::new(),
            poll_interval: Duration::seconds(2),
        }
    }

    /// Register a custom reader, checked before the built-ins.
    pub fn with_reader(mut self, reader: Arc<dyn StatusReader>) -> Self {
        self.custom_readers.push(reader);
        self
    }

    /// Change how often the cluster is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Block until every resource is ready or the timeout elapses.
    ///
    /// A Job that is merely running with ready pods satisfies this wait.
    pub async fn wait(&self, resources: &[Resource], timeout: Duration) -> Result<()> {
        self.run(WaitMode::Ready, resources, timeout).await
    }

    /// As [`wait`](StatusWaiter::wait), but Jobs must complete.
    ///
    /// A Job reaching its Failed condition resolves as an error
    /// immediately.
    pub async fn wait_with_jobs(&self, resources: &[Resource], timeout: Duration) -> Result<()> {
        self.run(WaitMode::ReadyWithJobs, resources, timeout).await
    }

    /// Wait for hook resources: Pods and Jobs must reach a terminal
    /// state, everything else is satisfied once observed.
    pub async fn watch_until_ready(&self, resources: &[Resource], timeout: Duration) -> Result<()> {
        self.run(WaitMode::Watch, resources, timeout).await
    }

    /// Block until every resource is absent. Resources already absent
    /// at call time trivially succeed.
    pub async fn wait_for_delete(&self, resources: &[Resource], timeout: Duration) -> Result<()> {
        self.run(WaitMode::Delete, resources, timeout).await
    }

    async fn run(&self, mode: WaitMode, resources: &[Resource], timeout: Duration) -> Result<()> {
        if resources.is_empty() {
            return Ok(());
        }

        let registry = match mode {
            WaitMode::Ready => ReaderRegistry::for_wait(&self.custom_readers),
            WaitMode::ReadyWithJobs => ReaderRegistry::for_wait_with_jobs(&self.custom_readers),
            // Delete never consults readers; any registry works.
            WaitMode::Watch | WaitMode::Delete => {
                ReaderRegistry::for_watch_until_ready(&self.custom_readers)
            }
        };

        let tracker: Mutex<HashMap<ResourceKey, Status>> = Mutex::new(
            resources
                .iter()
                .map(|r| {
                    (
                        r.key(),
                        Status {
                            state: ResourceState::Unknown,
                            message: None,
                        },
                    )
                })
                .collect(),
        );

        // Cluster-scoped resources carry no namespace and form their
        // own group.
        let mut groups: HashMap<Option<String>, Vec<&Resource>> = HashMap::new();
        for resource in resources {
            groups
                .entry(resource.namespace.clone())
                .or_default()
                .push(resource);
        }

        let workers = groups
            .into_iter()
            .map(|(namespace, group)| self.poll_group(mode, &registry, namespace, group, &tracker));

        let deadline = timeout.to_std().unwrap_or_default();
        match tokio::time::timeout(deadline, future::try_join_all(workers)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(deadline_error(mode, resources, &tracker)),
        }
    }

    /// Poll one namespace group until every member settles.
    ///
    /// Each iteration issues one list per distinct kind in the group; a
    /// list failure (notably authorization) aborts immediately without a
    /// retry.
    async fn poll_group(
        &self,
        mode: WaitMode,
        registry: &ReaderRegistry,
        namespace: Option<String>,
        group: Vec<&Resource>,
        tracker: &Mutex<HashMap<ResourceKey, Status>>,
    ) -> Result<()> {
        let poll_interval = self.poll_interval.to_std().unwrap_or_default();

        let mut gvks: Vec<GroupVersionKind> = Vec::new();
        for resource in &group {
            let gvk = gvk_of(resource);
            let seen = gvks
                .iter()
                .any(|g| g.group == gvk.group && g.version == gvk.version && g.kind == gvk.kind);
            if !seen {
                gvks.push(gvk);
            }
        }

        loop {
            let mut observed: HashMap<ResourceKey, DynamicObject> = HashMap::new();
            for gvk in &gvks {
                let items = self.backend.list(gvk, namespace.as_deref()).await?;
                for obj in items {
                    let Some(name) = obj.metadata.name.clone() else {
                        continue;
                    };
                    let key = ResourceKey {
                        namespace: obj.metadata.namespace.clone(),
                        kind: gvk.kind.clone(),
                        name,
                    };
                    observed.insert(key, obj);
                }
            }

            let mut all_settled = true;
            let mut failed: Option<KubeError> = None;

            {
                let mut states = tracker.lock().unwrap();
                for resource in &group {
                    let status =
                        read_status(mode, registry, resource, observed.get(&resource.key()));

                    if status.is_failed() && failed.is_none() {
                        failed = Some(KubeError::ResourceFailed {
                            name: resource.name.clone(),
                            kind: resource.kind.clone(),
                            message: status
                                .message
                                .clone()
                                .unwrap_or_else(|| "resource failed".to_string()),
                        });
                    }
                    if !is_settled(mode, &status) {
                        all_settled = false;
                    }

                    states.insert(resource.key(), status);
                }
            }

            if let Some(err) = failed {
                return Err(err);
            }
            if all_settled {
                return Ok(());
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

fn read_status(
    mode: WaitMode,
    registry: &ReaderRegistry,
    resource: &Resource,
    observed: Option<&DynamicObject>,
) -> Status {
    match mode {
        WaitMode::Delete => match observed {
            Some(_) => Status::in_progress("awaiting deletion"),
            None => Status {
                state: ResourceState::Gone,
                message: None,
            },
        },
        _ => match observed {
            Some(obj) => registry.read(&resource.group, &resource.kind, obj),
            None => Status {
                state: ResourceState::Unknown,
                message: Some("not found".to_string()),
            },
        },
    }
}

fn is_settled(mode: WaitMode, status: &Status) -> bool {
    match mode {
        WaitMode::Delete => status.state == ResourceState::Gone,
        _ => status.state == ResourceState::Current,
    }
}

/// Aggregate error for an elapsed deadline: one entry per unsettled
/// resource in input order, then the deadline marker.
fn deadline_error(
    mode: WaitMode,
    resources: &[Resource],
    tracker: &Mutex<HashMap<ResourceKey, Status>>,
) -> KubeError {
    let states = tracker.lock().unwrap();
    let mut errors: Vec<KubeError> = Vec::new();

    for resource in resources {
        let status = states.get(&resource.key());
        if status.map(|s| is_settled(mode, s)).unwrap_or(false) {
            continue;
        }

        let state = status.map(|s| s.state).unwrap_or(ResourceState::Unknown);
        errors.push(KubeError::ResourceNotReady {
            name: resource.name.clone(),
            kind: resource.kind.clone(),
            status: state.to_string(),
        });
    }

    errors.push(KubeError::DeadlineExceeded);
    KubeError::Aggregate(errors)
}
