//! Kind-ordered sorting for apply and delete
//!
//! Kubernetes resources depend on each other by kind: a Deployment needs its
//! ServiceAccount and ConfigMaps to exist first, a Namespace must outlive
//! everything inside it. The install and uninstall tables encode those
//! dependencies as explicit kind rankings. The two tables are independent,
//! not reversals of each other (e.g. Services are torn down earlier relative
//! to workloads than simple reversal would give).

use std::cmp::Ordering;

use crate::resource::Resource;

/// Kind ranking applied before resources are created or updated.
pub const INSTALL_ORDER: &[&str] = &[
    "PriorityClass",
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodSecurityPolicy",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "SecretList",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleList",
    "ClusterRoleBinding",
    "ClusterRoleBindingList",
    "Role",
    "RoleList",
    "RoleBinding",
    "RoleBindingList",
    "Service",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "HorizontalPodAutoscaler",
    "StatefulSet",
    "Job",
    "CronJob",
    "IngressClass",
    "Ingress",
    "APIService",
];

/// Kind ranking applied before resources are deleted.
pub const UNINSTALL_ORDER: &[&str] = &[
    "APIService",
    "Ingress",
    "IngressClass",
    "Service",
    "CronJob",
    "Job",
    "StatefulSet",
    "HorizontalPodAutoscaler",
    "Deployment",
    "ReplicaSet",
    "ReplicationController",
    "Pod",
    "DaemonSet",
    "RoleBindingList",
    "RoleBinding",
    "RoleList",
    "Role",
    "ClusterRoleBindingList",
    "ClusterRoleBinding",
    "ClusterRoleList",
    "ClusterRole",
    "CustomResourceDefinition",
    "PersistentVolumeClaim",
    "PersistentVolume",
    "StorageClass",
    "ConfigMap",
    "SecretList",
    "Secret",
    "ServiceAccount",
    "PodDisruptionBudget",
    "PodSecurityPolicy",
    "LimitRange",
    "ResourceQuota",
    "NetworkPolicy",
    "Namespace",
    "PriorityClass",
];

/// Compare two kinds against an ordering table.
///
/// Kinds absent from the table sort after every listed kind, alphabetically
/// among themselves. Two identical kinds compare equal, so a stable sort
/// preserves their input order.
pub fn compare_kinds(a: &str, b: &str, order: &[&str]) -> Ordering {
    let rank_a = order.iter().position(|k| *k == a);
    let rank_b = order.iter().position(|k| *k == b);

    match (rank_a, rank_b) {
        (Some(ra), Some(rb)) => ra.cmp(&rb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sort resources into creation order (stable).
pub fn sort_for_install(resources: &mut [Resource]) {
    resources.sort_by(|a, b| compare_kinds(&a.kind, &b.kind, INSTALL_ORDER));
}

/// Sort resources into deletion order (stable).
pub fn sort_for_uninstall(resources: &mut [Resource]) {
    resources.sort_by(|a, b| compare_kinds(&a.kind, &b.kind, UNINSTALL_ORDER));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;

    fn res(kind: &str, name: &str) -> Resource {
        let yaml = format!("apiVersion: v1\nkind: {kind}\nmetadata:\n  name: {name}\n");
        Resource::from_yaml(&yaml).unwrap()
    }

    fn kinds(resources: &[Resource]) -> Vec<&str> {
        resources.iter().map(|r| r.kind.as_str()).collect()
    }

    #[test]
    fn test_install_order_puts_foundations_first() {
        let mut resources = vec![
            res("Deployment", "web"),
            res("ConfigMap", "config"),
            res("Namespace", "app"),
            res("Service", "web"),
            res("ServiceAccount", "web"),
        ];
        sort_for_install(&mut resources);
        assert_eq!(
            kinds(&resources),
            vec![
                "Namespace",
                "ServiceAccount",
                "ConfigMap",
                "Service",
                "Deployment"
            ]
        );
    }

    #[test]
    fn test_uninstall_order_removes_workloads_before_config() {
        let mut resources = vec![
            res("ConfigMap", "config"),
            res("Namespace", "app"),
            res("Deployment", "web"),
            res("Service", "web"),
        ];
        sort_for_uninstall(&mut resources);
        assert_eq!(
            kinds(&resources),
            vec!["Service", "Deployment", "ConfigMap", "Namespace"]
        );
    }

    #[test]
    fn test_unknown_kinds_sort_after_known() {
        let mut resources = vec![
            res("CronTab", "tab"),
            res("Ingress", "edge"),
            res("Namespace", "app"),
        ];
        sort_for_install(&mut resources);
        assert_eq!(kinds(&resources), vec!["Namespace", "Ingress", "CronTab"]);

        // Unknown kinds trail for deletion as well.
        let mut resources = vec![res("CronTab", "tab"), res("Namespace", "app")];
        sort_for_uninstall(&mut resources);
        assert_eq!(kinds(&resources), vec!["Namespace", "CronTab"]);
    }

    #[test]
    fn test_unknown_kinds_sort_alphabetically() {
        let mut resources = vec![
            res("Zebra", "z"),
            res("Alpaca", "a"),
            res("ConfigMap", "config"),
            res("Mongoose", "m"),
        ];
        sort_for_install(&mut resources);
        assert_eq!(
            kinds(&resources),
            vec!["ConfigMap", "Alpaca", "Mongoose", "Zebra"]
        );
    }

    #[test]
    fn test_sort_is_stable_for_equal_kinds() {
        let mut resources = vec![
            res("ConfigMap", "first"),
            res("ConfigMap", "second"),
            res("CronTab", "one"),
            res("CronTab", "two"),
        ];
        sort_for_install(&mut resources);
        let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "one", "two"]);
    }

    #[test]
    fn test_compare_kinds_is_consistent() {
        // Transitivity over a mixed set of known and unknown kinds.
        let sample = [
            "Namespace",
            "Deployment",
            "ConfigMap",
            "CronTab",
            "Alpaca",
            "ConfigMap",
        ];
        for a in sample {
            assert_eq!(compare_kinds(a, a, INSTALL_ORDER), Ordering::Equal);
            for b in sample {
                let ab = compare_kinds(a, b, INSTALL_ORDER);
                assert_eq!(compare_kinds(b, a, INSTALL_ORDER), ab.reverse());
                for c in sample {
                    let bc = compare_kinds(b, c, INSTALL_ORDER);
                    if ab == bc {
                        assert_eq!(compare_kinds(a, c, INSTALL_ORDER), ab);
                    }
                }
            }
        }
    }

    #[test]
    fn test_uninstall_table_is_not_plain_reversal() {
        // Services come down before workloads, unlike reversed install order.
        let service = UNINSTALL_ORDER.iter().position(|k| *k == "Service");
        let cron_job = UNINSTALL_ORDER.iter().position(|k| *k == "CronJob");
        assert!(service < cron_job);
    }
}
