//! Cluster backends for resource operations
//!
//! All apply, wait and deploy machinery talks to the cluster through the
//! [`ClusterBackend`] trait:
//! - **KubeBackend**: a real API server via the dynamic client
//! - **MockCluster**: in-memory objects for unit tests

mod client;
mod mock;

pub use client::KubeBackend;
pub use mock::{MockCluster, OperationCounts};

use async_trait::async_trait;
use caravan_core::Resource;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde_json::Value;

use crate::error::Result;

/// Patch flavor sent to the API server.
#[derive(Debug, Clone)]
pub enum PatchBody {
    /// Strategic merge patch, for types the server has patch metadata for
    Strategic(Value),
    /// Generic JSON merge patch
    Merge(Value),
}

impl PatchBody {
    pub fn into_value(self) -> Value {
        match self {
            PatchBody::Strategic(v) | PatchBody::Merge(v) => v,
        }
    }
}

/// Resource operations against a cluster.
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    /// Fetch the live object, or None when it does not exist.
    async fn get(&self, resource: &Resource) -> Result<Option<DynamicObject>>;

    /// Create the object from its desired-state document.
    async fn create(&self, resource: &Resource) -> Result<DynamicObject>;

    /// Patch the live object.
    async fn patch(&self, resource: &Resource, patch: PatchBody) -> Result<DynamicObject>;

    /// Delete the object. A missing object surfaces as a 404 API error.
    async fn delete(&self, resource: &Resource) -> Result<()>;

    /// List objects of one kind, cluster-wide when `namespace` is None.
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    /// Whether the kind is namespace-scoped.
    async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool>;

    /// Whether the object currently exists.
    async fn exists(&self, resource: &Resource) -> Result<bool> {
        Ok(self.get(resource).await?.is_some())
    }
}
