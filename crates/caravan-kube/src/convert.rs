//! Conversion between planned resources and dynamic API objects

use caravan_core::Resource;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use serde_json::Value;

use crate::error::Result;

/// GroupVersionKind of a planned resource.
pub fn gvk_of(resource: &Resource) -> GroupVersionKind {
    GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind)
}

/// The resource's desired-state document as a dynamic API object.
pub fn to_dynamic(resource: &Resource) -> Result<DynamicObject> {
    Ok(serde_json::from_value(resource.doc.clone())?)
}

/// A live object's full JSON document.
pub fn to_document(obj: &DynamicObject) -> Result<Value> {
    Ok(serde_json::to_value(obj)?)
}

/// Copy server-assigned identity fields onto the planned resource.
pub fn refresh_resource(resource: &mut Resource, obj: &DynamicObject) {
    resource.resource_version = obj.metadata.resource_version.clone();
    resource.uid = obj.metadata.uid.clone();
}

/// Metadata fields owned by the API server.
const SERVER_FIELDS: &[&str] = &[
    "resourceVersion",
    "uid",
    "generation",
    "creationTimestamp",
    "managedFields",
];

/// Strip server-populated fields so desired and live documents compare.
pub fn sanitize(doc: &mut Value) {
    if let Some(metadata) = doc.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in SERVER_FIELDS {
            metadata.remove(*field);
        }
    }
    if let Some(obj) = doc.as_object_mut() {
        obj.remove("status");
    }
}

/// API groups whose types take strategic merge patches.
///
/// Custom resources and the extension groups are patched with generic JSON
/// merge instead, since the server has no patch strategy metadata for them.
const NATIVE_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "autoscaling",
    "policy",
    "networking.k8s.io",
    "rbac.authorization.k8s.io",
    "storage.k8s.io",
    "admissionregistration.k8s.io",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "discovery.k8s.io",
    "events.k8s.io",
    "flowcontrol.apiserver.k8s.io",
    "node.k8s.io",
    "scheduling.k8s.io",
];

/// Whether the resource's type supports strategic merge patches.
pub fn supports_strategic_merge(resource: &Resource) -> bool {
    NATIVE_GROUPS.contains(&resource.group.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(yaml: &str) -> Resource {
        Resource::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_gvk_of_core_and_grouped() {
        let cm = resource("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n");
        let gvk = gvk_of(&cm);
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "ConfigMap");

        let deploy = resource("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n");
        let gvk = gvk_of(&deploy);
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.kind, "Deployment");
    }

    #[test]
    fn test_dynamic_round_trip_preserves_document() {
        let res = resource(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: prod\nspec:\n  replicas: 2\n",
        );
        let obj = to_dynamic(&res).unwrap();
        assert_eq!(obj.metadata.name.as_deref(), Some("web"));
        assert_eq!(obj.metadata.namespace.as_deref(), Some("prod"));
        let doc = to_document(&obj).unwrap();
        assert_eq!(doc, res.doc);
    }

    #[test]
    fn test_sanitize_strips_server_fields() {
        let mut doc = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "cfg",
                "uid": "abc-123",
                "resourceVersion": "42",
                "generation": 3,
                "creationTimestamp": "2026-01-01T00:00:00Z",
                "managedFields": [{"manager": "caravan"}],
                "labels": {"app": "demo"}
            },
            "data": {"key": "value"},
            "status": {"phase": "Active"}
        });
        sanitize(&mut doc);
        assert_eq!(
            doc,
            json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": "cfg", "labels": {"app": "demo"}},
                "data": {"key": "value"}
            })
        );
    }

    #[test]
    fn test_refresh_resource_copies_identity() {
        let mut res = resource("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n");
        let mut obj = to_dynamic(&res).unwrap();
        obj.metadata.uid = Some("abc-123".to_string());
        obj.metadata.resource_version = Some("7".to_string());
        refresh_resource(&mut res, &obj);
        assert_eq!(res.uid.as_deref(), Some("abc-123"));
        assert_eq!(res.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn test_strategic_merge_support() {
        let deploy = resource("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n");
        assert!(supports_strategic_merge(&deploy));

        let cm = resource("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n");
        assert!(supports_strategic_merge(&cm));

        let custom =
            resource("apiVersion: stable.example.com/v1\nkind: CronTab\nmetadata:\n  name: tab\n");
        assert!(!supports_strategic_merge(&custom));

        let crd = resource(
            "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: crontabs.stable.example.com\n",
        );
        assert!(!supports_strategic_merge(&crd));
    }
}
