//! Lifecycle hooks
//!
//! A manifest becomes a hook when it carries a hook annotation. Hooks are
//! pulled out of the regular resource set and executed around the unit they
//! belong to, ordered by weight.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotations::{self, caravan, helm};
use crate::manifest::Manifest;

/// Lifecycle events a hook can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookEvent {
    PreInstall,
    PostInstall,
    PreUpgrade,
    PostUpgrade,
    PreDelete,
    PostDelete,
    PreRollback,
    PostRollback,
    Test,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookEvent::PreInstall => "pre-install",
            HookEvent::PostInstall => "post-install",
            HookEvent::PreUpgrade => "pre-upgrade",
            HookEvent::PostUpgrade => "post-upgrade",
            HookEvent::PreDelete => "pre-delete",
            HookEvent::PostDelete => "post-delete",
            HookEvent::PreRollback => "pre-rollback",
            HookEvent::PostRollback => "post-rollback",
            HookEvent::Test => "test",
        };
        write!(f, "{}", s)
    }
}

/// When a hook's resource is removed from the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookDeletePolicy {
    /// Delete a leftover copy before the hook is recreated (default)
    #[default]
    BeforeHookCreation,
    /// Delete after the hook completed successfully
    HookSucceeded,
    /// Delete after the hook failed
    HookFailed,
}

/// A manifest promoted to hook status by its annotations.
#[derive(Debug, Clone)]
pub struct Hook {
    pub name: String,
    pub kind: String,
    /// Source path of the template that produced the hook
    pub path: String,
    /// The rendered document
    pub manifest: String,
    pub events: Vec<HookEvent>,
    pub weight: i32,
    pub delete_policies: Vec<HookDeletePolicy>,
}

impl Hook {
    pub fn runs_on(&self, event: HookEvent) -> bool {
        self.events.contains(&event)
    }

    pub fn deletes_on(&self, policy: HookDeletePolicy) -> bool {
        self.delete_policies.contains(&policy)
    }
}

/// Partition manifests into hooks and regular resources.
///
/// Hook-annotated documents without a parseable kind and name cannot be
/// tracked, so they are dropped with a warning.
pub fn split_hooks(manifests: Vec<Manifest>) -> (Vec<Hook>, Vec<Manifest>) {
    let mut hooks = Vec::new();
    let mut resources = Vec::new();

    for manifest in manifests {
        let Some(annotations) = manifest_annotations(&manifest.content) else {
            resources.push(manifest);
            continue;
        };
        if !annotations::is_hook(&annotations) {
            resources.push(manifest);
            continue;
        }
        let Some(head) = manifest.head.clone() else {
            tracing::warn!(path = %manifest.path, "dropping hook without kind or name");
            continue;
        };

        let events = annotations::get_annotation(&annotations, caravan::HOOK, helm::HOOK)
            .map(parse_events)
            .unwrap_or_default();

        hooks.push(Hook {
            name: head.name,
            kind: head.kind,
            path: manifest.path,
            manifest: manifest.content,
            events,
            weight: annotations::parse_hook_weight(&annotations),
            delete_policies: parse_delete_policies(&annotations),
        });
    }

    (hooks, resources)
}

/// Sort hooks by weight (stable).
pub fn sort_hooks(hooks: &mut [Hook]) {
    hooks.sort_by_key(|h| h.weight);
}

fn manifest_annotations(content: &str) -> Option<BTreeMap<String, String>> {
    let doc: Value = serde_yaml::from_str(content).ok()?;
    let map = doc.pointer("/metadata/annotations")?.as_object()?;
    Some(
        map.iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
    )
}

fn parse_events(value: &str) -> Vec<HookEvent> {
    annotations::parse_event_names(value)
        .iter()
        .filter_map(|name| match name.as_str() {
            "pre-install" => Some(HookEvent::PreInstall),
            "post-install" => Some(HookEvent::PostInstall),
            "pre-upgrade" => Some(HookEvent::PreUpgrade),
            "post-upgrade" => Some(HookEvent::PostUpgrade),
            "pre-delete" => Some(HookEvent::PreDelete),
            "post-delete" => Some(HookEvent::PostDelete),
            "pre-rollback" => Some(HookEvent::PreRollback),
            "post-rollback" => Some(HookEvent::PostRollback),
            "test" => Some(HookEvent::Test),
            _ => None,
        })
        .collect()
}

fn parse_delete_policies(annotations: &BTreeMap<String, String>) -> Vec<HookDeletePolicy> {
    let policies: Vec<HookDeletePolicy> = annotations::get_annotation(
        annotations,
        caravan::HOOK_DELETE_POLICY,
        helm::HOOK_DELETE_POLICY,
    )
    .map(|value| {
        value
            .split(',')
            .filter_map(|s| match s.trim() {
                "before-hook-creation" => Some(HookDeletePolicy::BeforeHookCreation),
                "hook-succeeded" => Some(HookDeletePolicy::HookSucceeded),
                "hook-failed" => Some(HookDeletePolicy::HookFailed),
                _ => None,
            })
            .collect()
    })
    .unwrap_or_default();

    if policies.is_empty() {
        vec![HookDeletePolicy::default()]
    } else {
        policies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hook_manifest(name: &str, annotations: &[(&str, &str)]) -> Manifest {
        let mut yaml = format!(
            "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: {name}\n  annotations:\n"
        );
        for (k, v) in annotations {
            yaml.push_str(&format!("    {k}: \"{v}\"\n"));
        }
        Manifest::new("app/templates/hook.yaml", yaml)
    }

    fn plain_manifest(name: &str) -> Manifest {
        Manifest::new(
            "app/templates/cm.yaml",
            format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {name}\n"),
        )
    }

    #[test]
    fn test_split_separates_hooks_from_resources() {
        let manifests = vec![
            plain_manifest("cfg"),
            hook_manifest("migrate", &[("helm.sh/hook", "pre-install")]),
        ];
        let (hooks, resources) = split_hooks(manifests);
        assert_eq!(hooks.len(), 1);
        assert_eq!(resources.len(), 1);
        assert_eq!(hooks[0].name, "migrate");
        assert_eq!(hooks[0].kind, "Job");
        assert!(hooks[0].runs_on(HookEvent::PreInstall));
        assert!(!hooks[0].runs_on(HookEvent::PostInstall));
    }

    #[test]
    fn test_hook_can_serve_multiple_events() {
        let manifests = vec![hook_manifest(
            "migrate",
            &[("caravan.io/hook", "pre-install, pre-upgrade")],
        )];
        let (hooks, _) = split_hooks(manifests);
        assert!(hooks[0].runs_on(HookEvent::PreInstall));
        assert!(hooks[0].runs_on(HookEvent::PreUpgrade));
    }

    #[test]
    fn test_native_annotations_win() {
        let manifests = vec![hook_manifest(
            "migrate",
            &[
                ("caravan.io/hook", "post-install"),
                ("helm.sh/hook", "pre-install"),
                ("caravan.io/hook-weight", "7"),
                ("helm.sh/hook-weight", "1"),
            ],
        )];
        let (hooks, _) = split_hooks(manifests);
        assert_eq!(hooks[0].events, vec![HookEvent::PostInstall]);
        assert_eq!(hooks[0].weight, 7);
    }

    #[test]
    fn test_garbled_weight_defaults_to_zero() {
        let manifests = vec![hook_manifest(
            "migrate",
            &[
                ("helm.sh/hook", "pre-install"),
                ("helm.sh/hook-weight", "not-a-number"),
            ],
        )];
        let (hooks, _) = split_hooks(manifests);
        assert_eq!(hooks[0].weight, 0);
    }

    #[test]
    fn test_delete_policy_default_and_multiple() {
        let manifests = vec![
            hook_manifest("a", &[("helm.sh/hook", "pre-install")]),
            hook_manifest(
                "b",
                &[
                    ("helm.sh/hook", "pre-install"),
                    ("helm.sh/hook-delete-policy", "hook-succeeded,hook-failed"),
                ],
            ),
        ];
        let (hooks, _) = split_hooks(manifests);
        assert_eq!(
            hooks[0].delete_policies,
            vec![HookDeletePolicy::BeforeHookCreation]
        );
        assert!(hooks[1].deletes_on(HookDeletePolicy::HookSucceeded));
        assert!(hooks[1].deletes_on(HookDeletePolicy::HookFailed));
        assert!(!hooks[1].deletes_on(HookDeletePolicy::BeforeHookCreation));
    }

    #[test]
    fn test_sort_hooks_by_weight_is_stable() {
        let mk = |name: &str, weight: i32| Hook {
            name: name.to_string(),
            kind: "Job".to_string(),
            path: String::new(),
            manifest: String::new(),
            events: vec![HookEvent::PreInstall],
            weight,
            delete_policies: vec![HookDeletePolicy::BeforeHookCreation],
        };
        let mut hooks = vec![mk("c", 30), mk("a", 10), mk("b", 20), mk("a2", 10)];
        sort_hooks(&mut hooks);
        let order: Vec<&str> = hooks.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(order, vec!["a", "a2", "b", "c"]);
    }

    #[test]
    fn test_nameless_hook_is_dropped() {
        let nameless = Manifest::new(
            "t.yaml",
            "apiVersion: batch/v1\nkind: Job\nmetadata:\n  annotations:\n    helm.sh/hook: \"pre-install\"\n",
        );
        let (hooks, resources) = split_hooks(vec![nameless]);
        assert!(hooks.is_empty());
        assert!(resources.is_empty());
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in [
            HookEvent::PreInstall,
            HookEvent::PostDelete,
            HookEvent::PreRollback,
            HookEvent::Test,
        ] {
            assert_eq!(parse_events(&event.to_string()), vec![event]);
        }
    }
}
