//! Rendered manifest documents
//!
//! A rendered template source holds zero or more YAML documents. Each
//! document becomes a [`Manifest`] tagged with its source path, and the
//! leading `kind`/`metadata.name` pair is captured so later stages can
//! attribute and group documents without reparsing.

use serde_json::Value;

/// A single YAML document from a rendered template.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Source path of the template that produced this document
    pub path: String,
    /// The document body
    pub content: String,
    /// Parsed kind and name, absent when the document has neither
    pub head: Option<ManifestHead>,
}

/// The identifying head of a manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHead {
    pub kind: String,
    pub name: String,
}

impl Manifest {
    /// Wrap a single document, capturing its head if one can be parsed.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let head = parse_head(&content);
        Self {
            path: path.into(),
            content,
            head,
        }
    }

    /// Split a rendered source into its documents.
    ///
    /// Empty documents are dropped. Every produced manifest carries the
    /// source path it came from.
    pub fn split(path: &str, source: &str) -> Vec<Manifest> {
        source
            .split("---")
            .map(str::trim)
            .filter(|doc| !doc.is_empty())
            .map(|doc| Manifest::new(path, doc))
            .collect()
    }
}

fn parse_head(content: &str) -> Option<ManifestHead> {
    let doc: Value = serde_yaml::from_str(content).ok()?;
    let kind = doc.get("kind")?.as_str()?.to_string();
    let name = doc.pointer("/metadata/name")?.as_str()?.to_string();
    Some(ManifestHead { kind, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_multiple_documents() {
        let source = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: first
---
apiVersion: v1
kind: Service
metadata:
  name: second
"#;
        let manifests = Manifest::split("app/templates/all.yaml", source);
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].path, "app/templates/all.yaml");
        assert_eq!(
            manifests[0].head,
            Some(ManifestHead {
                kind: "ConfigMap".to_string(),
                name: "first".to_string()
            })
        );
        assert_eq!(manifests[1].head.as_ref().map(|h| h.kind.as_str()), Some("Service"));
    }

    #[test]
    fn test_split_drops_empty_documents() {
        let source = "---\n\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: only\n---\n";
        let manifests = Manifest::split("app/templates/cm.yaml", source);
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].head.as_ref().map(|h| h.name.as_str()), Some("only"));
    }

    #[test]
    fn test_head_absent_for_incomplete_documents() {
        let nameless = Manifest::new("t.yaml", "apiVersion: v1\nkind: ConfigMap\n");
        assert!(nameless.head.is_none());

        let kindless = Manifest::new("t.yaml", "metadata:\n  name: cfg\n");
        assert!(kindless.head.is_none());

        let garbage = Manifest::new("t.yaml", ": not yaml : at all :");
        assert!(garbage.head.is_none());
        assert_eq!(garbage.content, ": not yaml : at all :");
    }
}
