//! Parsed Kubernetes objects and their cluster identity

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::annotations;
use crate::error::{CoreError, Result};
use crate::manifest::Manifest;

/// A single Kubernetes object parsed from a rendered manifest.
///
/// Holds the full desired-state document plus the identity fields the
/// deployment machinery keys on. Server-assigned fields are filled in
/// after the object has been applied to a cluster.
#[derive(Debug, Clone)]
pub struct Resource {
    /// API group, empty for the core group
    pub group: String,
    /// Version within the API group
    pub version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    /// Annotations from the object's metadata
    pub annotations: BTreeMap<String, String>,
    /// Full desired-state document
    pub doc: Value,
    /// Server-assigned resource version, set after apply
    pub resource_version: Option<String>,
    /// Server-assigned UID, set after apply
    pub uid: Option<String>,
}

/// Identity of a resource within a cluster: namespace, kind and name.
///
/// Two objects with the same key refer to the same cluster object, so this
/// is what pruning and wait tracking match on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub namespace: Option<String>,
    pub kind: String,
    pub name: String,
}

impl Resource {
    /// Parse a single YAML document into a resource.
    ///
    /// The document must carry `apiVersion`, `kind` and `metadata.name`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(doc)
    }

    /// Parse a manifest's content, attributing parse failures to its path.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        Self::from_yaml(&manifest.content).map_err(|e| match e {
            CoreError::InvalidManifest { message } => CoreError::InvalidManifest {
                message: format!("{}: {}", manifest.path, message),
            },
            other => other,
        })
    }

    fn from_value(doc: Value) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidManifest {
            message: message.to_string(),
        };

        if !doc.is_object() {
            return Err(invalid("document is not a mapping"));
        }

        let api_version = doc
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing apiVersion"))?;
        let (group, version) = match api_version.rsplit_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };

        let kind = doc
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing kind"))?
            .to_string();

        let metadata = doc.get("metadata").and_then(Value::as_object);
        let name = metadata
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing metadata.name"))?
            .to_string();
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .map(String::from);

        let annotations = metadata
            .and_then(|m| m.get("annotations"))
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            group,
            version,
            kind,
            namespace,
            name,
            annotations,
            doc,
            resource_version: None,
            uid: None,
        })
    }

    /// The `apiVersion` string, `group/version` or bare `version` for core.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            namespace: self.namespace.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
        }
    }

    /// Human-readable identifier: `namespace/Kind/name` or `Kind/name`.
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.kind, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }

    /// Set the namespace on both the identity and the document.
    pub fn set_namespace(&mut self, namespace: &str) {
        self.namespace = Some(namespace.to_string());
        if let Some(metadata) = self.doc.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert(
                "namespace".to_string(),
                Value::String(namespace.to_string()),
            );
        }
    }

    /// Whether the object is exempt from deletion via its resource policy.
    pub fn has_keep_policy(&self) -> bool {
        annotations::has_keep_policy(&self.annotations)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", ns, self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}
