//! Live cluster backend built on kube's dynamic API
//!
//! Resolves each resource's GroupVersionKind against cached discovery data,
//! then routes operations through `Api<DynamicObject>` so no compile-time
//! type knowledge is needed.

use caravan_core::Resource;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::GroupVersionKind,
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};

use async_trait::async_trait;

use crate::cluster::{ClusterBackend, PatchBody};
use crate::convert::{gvk_of, to_dynamic};
use crate::error::{KubeError, Result};

/// Cluster backend that talks to a real API server.
///
/// Discovery is run once at construction and cached; call
/// [`refresh_discovery`](KubeBackend::refresh_discovery) after installing
/// CRDs so newly served kinds resolve.
pub struct KubeBackend {
    /// Kubernetes client
    client: Client,
    /// Cached discovery information
    discovery: Discovery,
}

impl KubeBackend {
    /// Connect using the ambient kubeconfig or in-cluster environment.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.map_err(KubeError::Api)?;
        Self::new(client).await
    }

    /// Create a backend from an existing client, running discovery.
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self { client, discovery })
    }

    /// Create from existing client and discovery (for reuse)
    pub fn with_discovery(client: Client, discovery: Discovery) -> Self {
        Self { client, discovery }
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&mut self) -> Result<()> {
        self.discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;
        Ok(())
    }

    /// Resolve a GVK against discovery, or fail with the unknown kind.
    fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, ApiCapabilities)> {
        self.discovery
            .resolve_gvk(gvk)
            .ok_or_else(|| KubeError::UnknownKind {
                api_version: api_version_of(gvk),
                kind: gvk.kind.clone(),
            })
    }

    /// Build the dynamic API handle for one resource.
    ///
    /// Namespaced kinds without an explicit namespace fall back to `default`.
    fn api_for(&self, resource: &Resource) -> Result<Api<DynamicObject>> {
        let (ar, caps) = self.resolve(&gvk_of(resource))?;

        if caps.scope == Scope::Namespaced {
            let ns = resource.namespace.as_deref().unwrap_or("default");
            Ok(Api::namespaced_with(self.client.clone(), ns, &ar))
        } else {
            Ok(Api::all_with(self.client.clone(), &ar))
        }
    }

    /// Build the dynamic API handle for listing one kind.
    fn api_for_gvk(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>> {
        let (ar, caps) = self.resolve(gvk)?;

        match namespace {
            Some(ns) if caps.scope == Scope::Namespaced => {
                Ok(Api::namespaced_with(self.client.clone(), ns, &ar))
            }
            _ => Ok(Api::all_with(self.client.clone(), &ar)),
        }
    }
}

#[async_trait]
impl ClusterBackend for KubeBackend {
    async fn get(&self, resource: &Resource) -> Result<Option<DynamicObject>> {
        let api = self.api_for(resource)?;
        api.get_opt(&resource.name).await.map_err(KubeError::Api)
    }

    async fn create(&self, resource: &Resource) -> Result<DynamicObject> {
        let api = self.api_for(resource)?;
        let obj = to_dynamic(resource)?;
        api.create(&PostParams::default(), &obj)
            .await
            .map_err(KubeError::Api)
    }

    async fn patch(&self, resource: &Resource, patch: PatchBody) -> Result<DynamicObject> {
        let api = self.api_for(resource)?;
        let params = PatchParams::default();

        let patched = match patch {
            PatchBody::Strategic(body) => {
                api.patch(&resource.name, &params, &Patch::Strategic(body))
                    .await
            }
            PatchBody::Merge(body) => {
                api.patch(&resource.name, &params, &Patch::Merge(body))
                    .await
            }
        };

        patched.map_err(KubeError::Api)
    }

    async fn delete(&self, resource: &Resource) -> Result<()> {
        let api = self.api_for(resource)?;

        // Background propagation so dependents are cleaned up without
        // blocking the delete call itself.
        let params = DeleteParams {
            propagation_policy: Some(kube::api::PropagationPolicy::Background),
            ..Default::default()
        };

        api.delete(&resource.name, &params)
            .await
            .map(|_| ())
            .map_err(KubeError::Api)
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let api = self.api_for_gvk(gvk, namespace)?;
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(KubeError::Api)?;
        Ok(list.items)
    }

    async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool> {
        let (_, caps) = self.resolve(gvk)?;
        Ok(caps.scope == Scope::Namespaced)
    }
}

/// Format a GVK's apiVersion the way manifests write it.
fn api_version_of(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}
