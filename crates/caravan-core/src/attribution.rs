//! Chart attribution for rendered manifests
//!
//! Umbrella charts render their subcharts under `charts/<name>/...` paths.
//! Attribution recovers the owning chart for every manifest from that path
//! layout, then answers ownership queries by resource kind and name. It is
//! best-effort: anything that cannot be attributed belongs to the root chart.

use std::collections::HashMap;

use crate::manifest::Manifest;

/// Derive the owning chart from a manifest path.
///
/// The segment following the deepest `charts` segment wins, so nested
/// subcharts attribute to the innermost chart. Without a `charts` segment
/// the first path segment is used. Empty paths yield nothing.
pub fn chart_for_path(path: &str) -> Option<&str> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut owner = None;
    for pair in segments.windows(2) {
        if pair[0] == "charts" {
            owner = Some(pair[1]);
        }
    }

    owner.or_else(|| segments.first().copied())
}

/// Ownership map from resource identity to chart name.
#[derive(Debug, Clone)]
pub struct Attribution {
    root: String,
    by_identity: HashMap<(String, String), String>,
}

impl Attribution {
    /// Attribute every manifest with a parseable head to a chart.
    ///
    /// Manifests without kind or name are skipped. When two manifests with
    /// the same kind and name land in different charts, the first one wins.
    pub fn new(root: impl Into<String>, manifests: &[Manifest]) -> Self {
        let root = root.into();
        let mut by_identity = HashMap::new();

        for manifest in manifests {
            let Some(head) = &manifest.head else {
                tracing::debug!(path = %manifest.path, "skipping manifest without kind or name");
                continue;
            };

            let chart = chart_for_path(&manifest.path)
                .map(str::to_string)
                .unwrap_or_else(|| head.name.clone());

            let identity = (head.kind.clone(), head.name.clone());
            if let Some(existing) = by_identity.get(&identity) {
                if *existing != chart {
                    tracing::warn!(
                        kind = %head.kind,
                        name = %head.name,
                        kept = %existing,
                        ignored = %chart,
                        "conflicting chart attribution"
                    );
                }
                continue;
            }
            by_identity.insert(identity, chart);
        }

        Self { root, by_identity }
    }

    /// The chart owning the given resource, or the root chart when unknown.
    pub fn chart_for(&self, kind: &str, name: &str) -> &str {
        self.by_identity
            .get(&(kind.to_string(), name.to_string()))
            .map(String::as_str)
            .unwrap_or(&self.root)
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(path: &str, kind: &str, name: &str) -> Manifest {
        Manifest::new(
            path,
            format!("apiVersion: v1\nkind: {kind}\nmetadata:\n  name: {name}\n"),
        )
    }

    #[test]
    fn test_chart_for_path_uses_charts_segment() {
        assert_eq!(
            chart_for_path("app/charts/redis/templates/deploy.yaml"),
            Some("redis")
        );
        assert_eq!(
            chart_for_path("app/charts/mid/charts/leaf/templates/x.yaml"),
            Some("leaf")
        );
    }

    #[test]
    fn test_chart_for_path_falls_back_to_first_segment() {
        assert_eq!(chart_for_path("app/templates/deploy.yaml"), Some("app"));
        // A trailing `charts` segment with nothing after it is not an owner.
        assert_eq!(chart_for_path("app/charts"), Some("app"));
        assert_eq!(chart_for_path(""), None);
    }

    #[test]
    fn test_attribution_maps_identity_to_chart() {
        let manifests = vec![
            manifest("app/templates/cm.yaml", "ConfigMap", "root-config"),
            manifest("app/charts/db/templates/svc.yaml", "Service", "db"),
        ];
        let attribution = Attribution::new("app", &manifests);
        assert_eq!(attribution.chart_for("ConfigMap", "root-config"), "app");
        assert_eq!(attribution.chart_for("Service", "db"), "db");
    }

    #[test]
    fn test_unknown_identity_falls_back_to_root() {
        let attribution = Attribution::new("app", &[]);
        assert_eq!(attribution.chart_for("Secret", "unseen"), "app");
    }

    #[test]
    fn test_headless_manifests_are_skipped() {
        let manifests = vec![Manifest::new("app/templates/junk.yaml", "just: data\n")];
        let attribution = Attribution::new("app", &manifests);
        assert!(attribution.by_identity.is_empty());
    }

    #[test]
    fn test_empty_path_uses_declared_name() {
        let manifests = vec![manifest("", "ConfigMap", "standalone")];
        let attribution = Attribution::new("app", &manifests);
        assert_eq!(
            attribution.chart_for("ConfigMap", "standalone"),
            "standalone"
        );
    }

    #[test]
    fn test_first_attribution_wins_on_conflict() {
        let manifests = vec![
            manifest("app/charts/a/templates/cm.yaml", "ConfigMap", "shared"),
            manifest("app/charts/b/templates/cm.yaml", "ConfigMap", "shared"),
        ];
        let attribution = Attribution::new("app", &manifests);
        assert_eq!(attribution.chart_for("ConfigMap", "shared"), "a");
    }
}
