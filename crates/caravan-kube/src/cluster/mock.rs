//! Mock cluster backend for testing
//!
//! Stores objects in memory and fabricates API error responses, useful for
//! unit tests without requiring a Kubernetes cluster.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use caravan_core::{Resource, ResourceKey};
use kube::api::DynamicObject;
use kube::core::{ErrorResponse, GroupVersionKind};
use serde_json::Value;

use super::{ClusterBackend, PatchBody};
use crate::error::{KubeError, Result};

/// In-memory cluster backend for testing
#[derive(Clone)]
pub struct MockCluster {
    /// Objects keyed by namespace/kind/name
    objects: Arc<RwLock<HashMap<ResourceKey, DynamicObject>>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
    /// Namespaces where list calls return 403 (None = cluster scope)
    forbidden_namespaces: Arc<RwLock<HashSet<Option<String>>>>,
    /// Keys whose patch calls fail with 422
    failing_patches: Arc<RwLock<HashSet<ResourceKey>>>,
    /// Kinds treated as cluster-scoped
    cluster_scoped_kinds: Arc<RwLock<HashSet<String>>>,
    /// Monotonic uid source
    next_uid: Arc<AtomicU64>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub patches: usize,
    pub deletes: usize,
}

impl MockCluster {
    /// Create a new empty mock cluster
    pub fn new() -> Self {
        let cluster_scoped = [
            "Namespace",
            "Node",
            "ClusterRole",
            "ClusterRoleBinding",
            "CustomResourceDefinition",
            "StorageClass",
            "PersistentVolume",
            "PriorityClass",
            "IngressClass",
            "APIService",
        ];

        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            operations: Arc::new(RwLock::new(OperationCounts::default())),
            forbidden_namespaces: Arc::new(RwLock::new(HashSet::new())),
            failing_patches: Arc::new(RwLock::new(HashSet::new())),
            cluster_scoped_kinds: Arc::new(RwLock::new(
                cluster_scoped.iter().map(|k| k.to_string()).collect(),
            )),
            next_uid: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Insert an object directly, bypassing operation counts
    pub fn seed(&self, resource: &Resource) -> Result<()> {
        let obj = self.materialize(resource)?;
        let mut objects = self.objects.write().unwrap();
        objects.insert(resource.key(), obj);
        Ok(())
    }

    /// Make list calls in a namespace fail with 403 (None = cluster scope)
    pub fn forbid_namespace(&self, namespace: Option<&str>) {
        let mut forbidden = self.forbidden_namespaces.write().unwrap();
        forbidden.insert(namespace.map(|n| n.to_string()));
    }

    /// Make patch calls against one object fail with 422
    pub fn fail_patches_for(&self, key: ResourceKey) {
        let mut failing = self.failing_patches.write().unwrap();
        failing.insert(key);
    }

    /// Treat an extra kind as cluster-scoped
    pub fn mark_cluster_scoped(&self, kind: &str) {
        let mut kinds = self.cluster_scoped_kinds.write().unwrap();
        kinds.insert(kind.to_string());
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        let mut ops = self.operations.write().unwrap();
        *ops = OperationCounts::default();
    }

    /// Whether an object exists (for testing)
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.objects.read().unwrap().contains_key(key)
    }

    /// Count stored objects
    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// Fetch a stored object without counting the access
    pub fn get_object(&self, key: &ResourceKey) -> Option<DynamicObject> {
        self.objects.read().unwrap().get(key).cloned()
    }

    /// Overwrite the status subtree of a stored object
    pub fn update_status(&self, key: &ResourceKey, status: Value) {
        let mut objects = self.objects.write().unwrap();
        if let Some(obj) = objects.get_mut(key) {
            obj.data["status"] = status;
        }
    }

    /// Build the stored object for a resource, assigning server fields.
    fn materialize(&self, resource: &Resource) -> Result<DynamicObject> {
        let mut obj: DynamicObject = serde_json::from_value(resource.doc.clone())?;
        let uid = self.next_uid.fetch_add(1, Ordering::SeqCst);
        obj.metadata.uid = Some(format!("uid-{uid}"));
        obj.metadata.resource_version = Some("1".to_string());
        Ok(obj)
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// Fabricate the API error a real server would return.
fn api_error(code: u16, reason: &str, message: String) -> KubeError {
    KubeError::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

#[async_trait]
impl ClusterBackend for MockCluster {
    async fn get(&self, resource: &Resource) -> Result<Option<DynamicObject>> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.gets += 1;
        }

        let objects = self.objects.read().unwrap();
        Ok(objects.get(&resource.key()).cloned())
    }

    async fn create(&self, resource: &Resource) -> Result<DynamicObject> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.creates += 1;
        }

        let key = resource.key();
        let mut objects = self.objects.write().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", resource.kind, resource.name),
            ));
        }

        let obj = self.materialize(resource)?;
        objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn patch(&self, resource: &Resource, patch: PatchBody) -> Result<DynamicObject> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.patches += 1;
        }

        let key = resource.key();

        {
            let failing = self.failing_patches.read().unwrap();
            if failing.contains(&key) {
                return Err(api_error(
                    422,
                    "Invalid",
                    format!("{} \"{}\" is invalid", resource.kind, resource.name),
                ));
            }
        }

        let mut objects = self.objects.write().unwrap();
        let current = objects.get(&key).ok_or_else(|| {
            api_error(
                404,
                "NotFound",
                format!("{} \"{}\" not found", resource.kind, resource.name),
            )
        })?;

        // Patch bodies carry the full desired document, so the mock
        // replaces rather than merges.
        let mut updated: DynamicObject = serde_json::from_value(patch.into_value())?;
        updated.metadata.uid = current.metadata.uid.clone();
        let version = current
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        updated.metadata.resource_version = Some((version + 1).to_string());

        objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, resource: &Resource) -> Result<()> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.deletes += 1;
        }

        let mut objects = self.objects.write().unwrap();
        if objects.remove(&resource.key()).is_none() {
            return Err(api_error(
                404,
                "NotFound",
                format!("{} \"{}\" not found", resource.kind, resource.name),
            ));
        }
        Ok(())
    }

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.lists += 1;
        }

        {
            let forbidden = self.forbidden_namespaces.read().unwrap();
            if forbidden.contains(&namespace.map(|n| n.to_string())) {
                let scope = match namespace {
                    Some(ns) => format!("in namespace \"{ns}\""),
                    None => "at the cluster scope".to_string(),
                };
                return Err(api_error(
                    403,
                    "Forbidden",
                    format!("{} is forbidden: cannot list resource {}", gvk.kind, scope),
                ));
            }
        }

        let api_version = if gvk.group.is_empty() {
            gvk.version.clone()
        } else {
            format!("{}/{}", gvk.group, gvk.version)
        };

        let objects = self.objects.read().unwrap();
        let items = objects
            .values()
            .filter(|obj| {
                obj.types.as_ref().is_some_and(|t| {
                    t.kind == gvk.kind && t.api_version == api_version
                })
            })
            .filter(|obj| {
                namespace.is_none() || obj.metadata.namespace.as_deref() == namespace
            })
            .cloned()
            .collect();

        Ok(items)
    }

    async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool> {
        let kinds = self.cluster_scoped_kinds.read().unwrap();
        Ok(!kinds.contains(&gvk.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_resource(kind: &str, name: &str, namespace: Option<&str>) -> Resource {
        let ns_line = namespace
            .map(|ns| format!("  namespace: {ns}\n"))
            .unwrap_or_default();
        let yaml = format!(
            "apiVersion: v1\nkind: {kind}\nmetadata:\n  name: {name}\n{ns_line}"
        );
        Resource::from_yaml(&yaml).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let cluster = MockCluster::new();
        let cm = make_resource("ConfigMap", "settings", Some("default"));

        let created = cluster.create(&cm).await.unwrap();
        assert_eq!(created.metadata.uid.as_deref(), Some("uid-1"));
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));

        let fetched = cluster.get(&cm).await.unwrap();
        assert!(fetched.is_some());

        let counts = cluster.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.gets, 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let cluster = MockCluster::new();
        let cm = make_resource("ConfigMap", "settings", Some("default"));

        cluster.create(&cm).await.unwrap();
        let err = cluster.create(&cm).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let cluster = MockCluster::new();
        let cm = make_resource("ConfigMap", "absent", Some("default"));

        assert!(cluster.get(&cm).await.unwrap().is_none());
        assert!(!cluster.exists(&cm).await.unwrap());
    }

    #[tokio::test]
    async fn test_patch_replaces_and_bumps_version() {
        let cluster = MockCluster::new();
        let cm = make_resource("ConfigMap", "settings", Some("default"));
        cluster.create(&cm).await.unwrap();

        let mut body = cm.doc.clone();
        body["data"] = serde_json::json!({"key": "value"});
        let patched = cluster.patch(&cm, PatchBody::Merge(body)).await.unwrap();

        assert_eq!(patched.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(patched.metadata.uid.as_deref(), Some("uid-1"));
        assert_eq!(patched.data["data"]["key"], "value");
    }

    #[tokio::test]
    async fn test_patch_missing_not_found() {
        let cluster = MockCluster::new();
        let cm = make_resource("ConfigMap", "absent", Some("default"));

        let err = cluster
            .patch(&cm, PatchBody::Merge(cm.doc.clone()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_patch_failure() {
        let cluster = MockCluster::new();
        let cm = make_resource("ConfigMap", "settings", Some("default"));
        cluster.create(&cm).await.unwrap();
        cluster.fail_patches_for(cm.key());

        let err = cluster
            .patch(&cm, PatchBody::Merge(cm.doc.clone()))
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert!(cluster.contains(&cm.key()));
    }

    #[tokio::test]
    async fn test_delete_missing_not_found() {
        let cluster = MockCluster::new();
        let cm = make_resource("ConfigMap", "absent", Some("default"));

        let err = cluster.delete(&cm).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_kind_and_namespace() {
        let cluster = MockCluster::new();
        cluster
            .seed(&make_resource("ConfigMap", "a", Some("default")))
            .unwrap();
        cluster
            .seed(&make_resource("ConfigMap", "b", Some("staging")))
            .unwrap();
        cluster
            .seed(&make_resource("Secret", "c", Some("default")))
            .unwrap();

        let gvk = GroupVersionKind::gvk("", "v1", "ConfigMap");
        let in_default = cluster.list(&gvk, Some("default")).await.unwrap();
        assert_eq!(in_default.len(), 1);

        let everywhere = cluster.list(&gvk, None).await.unwrap();
        assert_eq!(everywhere.len(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_namespace_list() {
        let cluster = MockCluster::new();
        cluster.forbid_namespace(Some("locked"));

        let gvk = GroupVersionKind::gvk("", "v1", "ConfigMap");
        let err = cluster.list(&gvk, Some("locked")).await.unwrap_err();
        assert!(err.is_forbidden());

        // Other namespaces are unaffected.
        assert!(cluster.list(&gvk, Some("default")).await.is_ok());
    }

    #[tokio::test]
    async fn test_cluster_scope_lookup() {
        let cluster = MockCluster::new();

        let ns = GroupVersionKind::gvk("", "v1", "Namespace");
        assert!(!cluster.is_namespaced(&ns).await.unwrap());

        let cm = GroupVersionKind::gvk("", "v1", "ConfigMap");
        assert!(cluster.is_namespaced(&cm).await.unwrap());

        cluster.mark_cluster_scoped("Widget");
        let widget = GroupVersionKind::gvk("example.com", "v1", "Widget");
        assert!(!cluster.is_namespaced(&widget).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_status_visible_in_get() {
        let cluster = MockCluster::new();
        let cm = make_resource("ConfigMap", "settings", Some("default"));
        cluster.seed(&cm).unwrap();

        cluster.update_status(&cm.key(), serde_json::json!({"phase": "Active"}));

        let obj = cluster.get(&cm).await.unwrap().unwrap();
        assert_eq!(obj.data["status"]["phase"], "Active");
    }
}
