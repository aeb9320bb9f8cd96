//! Annotation parsing with Helm compatibility
//!
//! Caravan supports both `caravan.io/*` and `helm.sh/*` annotations
//! to facilitate migration from Helm charts.

use std::collections::BTreeMap;

/// Caravan-native annotations
pub mod caravan {
    /// Hook event annotation
    pub const HOOK: &str = "caravan.io/hook";
    /// Hook weight for ordering
    pub const HOOK_WEIGHT: &str = "caravan.io/hook-weight";
    /// Hook delete policy
    pub const HOOK_DELETE_POLICY: &str = "caravan.io/hook-delete-policy";
    /// Resource policy (keep on uninstall)
    pub const RESOURCE_POLICY: &str = "caravan.io/resource-policy";
}

/// Helm-compatible annotations (for migration)
pub mod helm {
    /// Hook event annotation
    pub const HOOK: &str = "helm.sh/hook";
    /// Hook weight for ordering
    pub const HOOK_WEIGHT: &str = "helm.sh/hook-weight";
    /// Hook delete policy
    pub const HOOK_DELETE_POLICY: &str = "helm.sh/hook-delete-policy";
    /// Resource policy (keep on uninstall)
    pub const RESOURCE_POLICY: &str = "helm.sh/resource-policy";
}

/// Resource policy value that exempts a resource from deletion
pub const KEEP_POLICY: &str = "keep";

/// Get annotation value, preferring Caravan over Helm
pub fn get_annotation<'a>(
    annotations: &'a BTreeMap<String, String>,
    caravan_key: &str,
    helm_key: &str,
) -> Option<&'a str> {
    annotations
        .get(caravan_key)
        .or_else(|| annotations.get(helm_key))
        .map(|s| s.as_str())
}

/// Check if a manifest declares itself as a hook
pub fn is_hook(annotations: &BTreeMap<String, String>) -> bool {
    get_annotation(annotations, caravan::HOOK, helm::HOOK).is_some()
}

/// Parse comma-separated hook event names from an annotation value
pub fn parse_event_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse hook weight (default: 0, unparseable values fall back to 0)
pub fn parse_hook_weight(annotations: &BTreeMap<String, String>) -> i32 {
    get_annotation(annotations, caravan::HOOK_WEIGHT, helm::HOOK_WEIGHT)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Check if the resource is exempt from deletion
pub fn has_keep_policy(annotations: &BTreeMap<String, String>) -> bool {
    get_annotation(annotations, caravan::RESOURCE_POLICY, helm::RESOURCE_POLICY)
        .map(|s| s == KEEP_POLICY)
        .unwrap_or(false)
}
