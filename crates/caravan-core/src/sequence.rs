//! Install unit sequencing
//!
//! An install unit is a group of resources that is applied, awaited and
//! hooked together. Units come from the chart's declarations; resources are
//! routed into them by chart attribution, and charts that were never
//! declared still get a unit of their own at the end of the sequence.

use indexmap::IndexMap;

use crate::attribution::{Attribution, chart_for_path};
use crate::chart::ChartMetadata;
use crate::error::{CoreError, Result};
use crate::hooks::{Hook, HookEvent, sort_hooks};
use crate::manifest::Manifest;
use crate::resource::Resource;

/// A group of resources deployed and awaited together.
#[derive(Debug, Clone)]
pub struct InstallUnit {
    /// Chart the unit collects resources for
    pub chart: String,
    pub resources: Vec<Resource>,
    /// Hooks run before the unit's resources are applied, weight-ordered
    pub pre_hooks: Vec<Hook>,
    /// Hooks run after the unit's resources are ready, weight-ordered
    pub post_hooks: Vec<Hook>,
    /// Earlier unit whose resources must be ready before this unit applies
    pub wait_for: Option<String>,
}

impl InstallUnit {
    pub fn new(chart: impl Into<String>) -> Self {
        Self {
            chart: chart.into(),
            resources: Vec::new(),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            wait_for: None,
        }
    }
}

/// Build the install-time unit sequence.
///
/// Declared units come first in declaration order, ad-hoc units follow in
/// the order their charts were first seen, and units that end up with no
/// resources are dropped. Each unit's hook lists are weight-sorted.
pub fn install_sequence(
    chart: &ChartMetadata,
    manifests: &[Manifest],
    resources: Vec<Resource>,
    hooks: Vec<Hook>,
) -> Result<Vec<InstallUnit>> {
    sequence_for_events(
        chart,
        manifests,
        resources,
        hooks,
        HookEvent::PreInstall,
        HookEvent::PostInstall,
    )
}

/// Build the unit sequence for an arbitrary pre/post event pair.
///
/// Upgrades reuse the install grouping but attach upgrade hooks instead.
pub fn sequence_for_events(
    chart: &ChartMetadata,
    manifests: &[Manifest],
    resources: Vec<Resource>,
    hooks: Vec<Hook>,
    pre: HookEvent,
    post: HookEvent,
) -> Result<Vec<InstallUnit>> {
    // Without declared units the whole release is one unit.
    if chart.install_units.is_empty() {
        let mut unit = InstallUnit::new(&chart.name);
        unit.resources = resources;
        for hook in hooks {
            if hook.runs_on(pre) {
                unit.pre_hooks.push(hook.clone());
            }
            if hook.runs_on(post) {
                unit.post_hooks.push(hook);
            }
        }
        sort_hooks(&mut unit.pre_hooks);
        sort_hooks(&mut unit.post_hooks);
        if unit.resources.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![unit]);
    }

    let attribution = Attribution::new(&chart.name, manifests);

    let mut units: IndexMap<String, InstallUnit> = IndexMap::new();
    for spec in &chart.install_units {
        if units.contains_key(&spec.name) {
            return Err(CoreError::DuplicateUnit {
                name: spec.name.clone(),
            });
        }
        let mut unit = InstallUnit::new(&spec.name);
        unit.wait_for = spec.wait_for.clone();
        units.insert(spec.name.clone(), unit);
    }

    for resource in resources {
        let owner = attribution
            .chart_for(&resource.kind, &resource.name)
            .to_string();
        let unit = units.entry(owner.clone()).or_insert_with(|| {
            tracing::debug!(chart = %owner, "creating ad-hoc install unit");
            InstallUnit::new(&owner)
        });
        unit.resources.push(resource);
    }

    for hook in hooks {
        if !hook.runs_on(pre) && !hook.runs_on(post) {
            continue;
        }
        let owner = chart_for_path(&hook.path).unwrap_or(attribution.root());
        // Hooks attach to existing units; a hook alone never creates one.
        let target = if units.contains_key(owner) {
            owner.to_string()
        } else {
            attribution.root().to_string()
        };
        match units.get_mut(&target) {
            Some(unit) => {
                if hook.runs_on(pre) {
                    unit.pre_hooks.push(hook.clone());
                }
                if hook.runs_on(post) {
                    unit.post_hooks.push(hook);
                }
            }
            None => {
                tracing::warn!(hook = %hook.name, chart = %target, "dropping hook with no install unit");
            }
        }
    }

    let mut sequence: Vec<InstallUnit> = units
        .into_values()
        .filter(|unit| !unit.resources.is_empty())
        .collect();
    for unit in &mut sequence {
        sort_hooks(&mut unit.pre_hooks);
        sort_hooks(&mut unit.post_hooks);
    }
    Ok(sequence)
}
