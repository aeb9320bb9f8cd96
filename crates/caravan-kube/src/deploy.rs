//! Release deployment: drives sequenced install units through hooks,
//! apply and readiness.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;

use caravan_core::{
    ChartMetadata, Hook, HookDeletePolicy, HookEvent, InstallUnit, Manifest, Resource,
    sequence_for_events, sort_for_install, sort_for_uninstall, split_hooks,
};

use crate::apply::ApplyEngine;
use crate::cluster::ClusterBackend;
use crate::convert::{gvk_of, refresh_resource};
use crate::error::{KubeError, Result};
use crate::progress::{ProgressReporter, ResourceStatus};
use crate::wait::StatusWaiter;

/// Knobs for a single install, upgrade or uninstall run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Namespace injected into namespaced resources that carry none.
    pub namespace: String,
    /// Block until every applied resource reports ready.
    pub wait: bool,
    /// Require Jobs to run to completion instead of merely having ready pods.
    pub wait_for_jobs: bool,
    /// Deadline for each wait phase and each hook.
    pub timeout: Duration,
    /// Delete and recreate resources whose patch is rejected.
    pub force: bool,
    /// Skip lifecycle hooks entirely.
    pub no_hooks: bool,
    /// After an upgrade, delete released resources absent from the new target set.
    pub prune: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            wait: false,
            wait_for_jobs: false,
            timeout: Duration::minutes(5),
            force: false,
            no_hooks: false,
            prune: false,
        }
    }
}

impl DeployOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_wait_for_jobs(mut self, wait_for_jobs: bool) -> Self {
        self.wait_for_jobs = wait_for_jobs;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_no_hooks(mut self, no_hooks: bool) -> Self {
        self.no_hooks = no_hooks;
        self
    }

    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }
}

/// Rolls a release onto the cluster, one install unit at a time.
///
/// Each unit runs its pre hooks, applies its resources in kind order,
/// optionally waits for readiness, then runs its post hooks. The first
/// failure aborts the run; already-applied units are left in place.
pub struct Deployer<B: ClusterBackend> {
    backend: Arc<B>,
    waiter: StatusWaiter<B>,
    reporter: Option<ProgressReporter>,
}

impl<B: ClusterBackend> Deployer<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let waiter = StatusWaiter::new(backend.clone());
        Self {
            backend,
            waiter,
            reporter: None,
        }
    }

    /// Replace the default waiter, e.g. to register custom status readers.
    pub fn with_waiter(mut self, waiter: StatusWaiter<B>) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn reporter(&self) -> Option<&ProgressReporter> {
        self.reporter.as_ref()
    }

    /// Install a chart: sequence its manifests into units and roll them out.
    pub async fn install(
        &mut self,
        chart: &ChartMetadata,
        manifests: Vec<Manifest>,
        options: &DeployOptions,
    ) -> Result<()> {
        let result = self
            .deploy(
                chart,
                manifests,
                HookEvent::PreInstall,
                HookEvent::PostInstall,
                options,
            )
            .await;
        if let Some(reporter) = &self.reporter {
            reporter.print_summary();
        }
        result.map(|_| ())
    }

    /// Upgrade a release, optionally pruning resources dropped since the
    /// previous deployment.
    pub async fn upgrade(
        &mut self,
        chart: &ChartMetadata,
        previous: &[Resource],
        manifests: Vec<Manifest>,
        options: &DeployOptions,
    ) -> Result<()> {
        let result = self
            .deploy(
                chart,
                manifests,
                HookEvent::PreUpgrade,
                HookEvent::PostUpgrade,
                options,
            )
            .await;
        let result = match result {
            Ok(targets) if options.prune => self.prune(previous, &targets).await,
            other => other.map(|_| ()),
        };
        if let Some(reporter) = &self.reporter {
            reporter.print_summary();
        }
        result
    }

    /// Delete released resources in reverse kind order.
    ///
    /// Resources marked with the keep policy stay in place; objects already
    /// gone from the cluster are not an error.
    pub async fn uninstall(
        &mut self,
        mut resources: Vec<Resource>,
        options: &DeployOptions,
    ) -> Result<()> {
        sort_for_uninstall(&mut resources);

        let backend = Arc::clone(&self.backend);
        let engine = ApplyEngine::new(backend.as_ref());
        let mut deleted = Vec::new();

        for resource in resources {
            if resource.has_keep_policy() {
                if let Some(reporter) = &self.reporter {
                    reporter.warn(&format!("kept {}", resource.display_name()));
                }
                continue;
            }
            if engine.delete(&resource).await? {
                if let Some(reporter) = &self.reporter {
                    reporter.success(&format!("deleted {}", resource.display_name()));
                }
                deleted.push(resource);
            }
        }

        if options.wait && !deleted.is_empty() {
            self.waiter.wait_for_delete(&deleted, options.timeout).await?;
        }
        Ok(())
    }

    async fn deploy(
        &mut self,
        chart: &ChartMetadata,
        manifests: Vec<Manifest>,
        pre: HookEvent,
        post: HookEvent,
        options: &DeployOptions,
    ) -> Result<Vec<Resource>> {
        let (hooks, manifests) = split_hooks(manifests);
        let mut resources = self.parse_resources(&manifests, options).await?;
        sort_for_install(&mut resources);
        let targets = resources.clone();

        let units = sequence_for_events(chart, &manifests, resources, hooks, pre, post)?;
        tracing::debug!(
            chart = %chart.name,
            units = units.len(),
            resources = targets.len(),
            "sequenced release"
        );

        self.run_units(units, pre, post, options).await?;
        Ok(targets)
    }

    async fn run_units(
        &mut self,
        units: Vec<InstallUnit>,
        pre: HookEvent,
        post: HookEvent,
        options: &DeployOptions,
    ) -> Result<()> {
        // Units named by a later wait_for are awaited even when the global
        // wait flag is off.
        let awaited: HashSet<String> = units.iter().filter_map(|u| u.wait_for.clone()).collect();
        {
            let names: HashSet<&str> = units.iter().map(|u| u.chart.as_str()).collect();
            for unit in &units {
                if let Some(target) = &unit.wait_for {
                    if !names.contains(target.as_str()) {
                        tracing::debug!(
                            unit = %unit.chart,
                            target = %target,
                            "wait-for target emitted no resources, treating as ready"
                        );
                    }
                }
            }
        }

        let total = units.len();
        for (index, unit) in units.into_iter().enumerate() {
            tracing::info!(unit = %unit.chart, index = index + 1, total, "deploying unit");
            if let Some(reporter) = &mut self.reporter {
                reporter.set_unit(index + 1, total, &unit.chart);
            }

            if !options.no_hooks {
                self.run_hooks(&unit.pre_hooks, pre, options).await?;
            }

            let mut resources = unit.resources;
            self.apply_resources(&mut resources, options).await?;

            if options.wait || awaited.contains(&unit.chart) {
                self.wait_for_unit(&resources, options).await?;
            }

            if !options.no_hooks {
                self.run_hooks(&unit.post_hooks, post, options).await?;
            }
        }
        Ok(())
    }

    /// Parse manifests into resources, injecting the release namespace into
    /// namespaced resources that do not set one.
    ///
    /// Documents without a parsable kind and name are skipped; anything else
    /// that fails to parse aborts the run.
    async fn parse_resources(
        &self,
        manifests: &[Manifest],
        options: &DeployOptions,
    ) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        for manifest in manifests {
            if manifest.head.is_none() {
                tracing::debug!(path = %manifest.path, "skipping manifest without kind or name");
                continue;
            }
            let mut resource = Resource::from_manifest(manifest)?;
            self.default_namespace(&mut resource, options).await?;
            resources.push(resource);
        }
        Ok(resources)
    }

    async fn default_namespace(
        &self,
        resource: &mut Resource,
        options: &DeployOptions,
    ) -> Result<()> {
        if resource.namespace.is_none() && self.backend.is_namespaced(&gvk_of(resource)).await? {
            resource.set_namespace(&options.namespace);
        }
        Ok(())
    }

    async fn apply_resources(
        &mut self,
        resources: &mut [Resource],
        options: &DeployOptions,
    ) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let engine = ApplyEngine::new(backend.as_ref()).with_force(options.force);

        for resource in resources.iter_mut() {
            let label = format!("{}/{}", resource.kind, resource.name);
            if let Some(reporter) = &mut self.reporter {
                reporter.add_resource(&resource.kind, &resource.name);
                reporter.update_status(&label, ResourceStatus::Applying);
            }

            match engine.apply_one(resource).await {
                Ok(outcome) => {
                    tracing::debug!(
                        resource = %resource.key(),
                        outcome = outcome.as_str(),
                        "applied"
                    );
                    if let Some(reporter) = &mut self.reporter {
                        reporter.update_status(&label, ResourceStatus::Applied);
                    }
                }
                Err(err) => {
                    if let Some(reporter) = &mut self.reporter {
                        reporter.fail(&label, &err.to_string());
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn wait_for_unit(&mut self, resources: &[Resource], options: &DeployOptions) -> Result<()> {
        if resources.is_empty() {
            return Ok(());
        }
        for resource in resources {
            if let Some(reporter) = &mut self.reporter {
                reporter.update_status(
                    &format!("{}/{}", resource.kind, resource.name),
                    ResourceStatus::WaitingForReady,
                );
            }
        }

        let result = if options.wait_for_jobs {
            self.waiter.wait_with_jobs(resources, options.timeout).await
        } else {
            self.waiter.wait(resources, options.timeout).await
        };

        match result {
            Ok(()) => {
                for resource in resources {
                    if let Some(reporter) = &mut self.reporter {
                        reporter.update_status(
                            &format!("{}/{}", resource.kind, resource.name),
                            ResourceStatus::Ready,
                        );
                    }
                }
                Ok(())
            }
            Err(err) => {
                self.report_wait_failure(&err);
                Err(err)
            }
        }
    }

    fn report_wait_failure(&mut self, err: &KubeError) {
        let Some(reporter) = &mut self.reporter else {
            return;
        };
        if let KubeError::Aggregate(errors) = err {
            for error in errors {
                if let KubeError::ResourceNotReady { name, kind, status } = error {
                    reporter.fail(&format!("{kind}/{name}"), status);
                }
            }
        }
    }

    async fn run_hooks(&self, hooks: &[Hook], event: HookEvent, options: &DeployOptions) -> Result<()> {
        for hook in hooks {
            if let Some(reporter) = &self.reporter {
                reporter.hook_start(&event.to_string(), &hook.name);
            }

            let started = Instant::now();
            let result = self.execute_hook(hook, options).await;

            if let Some(reporter) = &self.reporter {
                let error = result.as_ref().err().map(|e| e.to_string());
                reporter.hook_result(&hook.name, result.is_ok(), started.elapsed(), error.as_deref());
            }

            result.map_err(|err| KubeError::HookFailed {
                name: hook.name.clone(),
                event: event.to_string(),
                message: err.to_string(),
            })?;
        }
        Ok(())
    }

    /// Run one hook: create its object and watch it to completion.
    async fn execute_hook(&self, hook: &Hook, options: &DeployOptions) -> Result<()> {
        let mut resource = Resource::from_yaml(&hook.manifest)?;
        self.default_namespace(&mut resource, options).await?;

        // Clear out any leftover object from a previous run.
        if hook.deletes_on(HookDeletePolicy::BeforeHookCreation)
            && self.backend.exists(&resource).await?
        {
            self.delete_hook_object(&resource).await?;
            self.waiter
                .wait_for_delete(std::slice::from_ref(&resource), options.timeout)
                .await?;
        }

        let created = self.backend.create(&resource).await?;
        refresh_resource(&mut resource, &created);

        let result = self
            .waiter
            .watch_until_ready(std::slice::from_ref(&resource), options.timeout)
            .await;

        let cleanup = match &result {
            Ok(()) => hook.deletes_on(HookDeletePolicy::HookSucceeded),
            Err(_) => hook.deletes_on(HookDeletePolicy::HookFailed),
        };
        if cleanup {
            // Cleanup failures do not change the hook outcome.
            if let Err(err) = self.delete_hook_object(&resource).await {
                tracing::warn!(hook = %hook.name, error = %err, "failed to clean up hook object");
            }
        }

        result
    }

    async fn delete_hook_object(&self, resource: &Resource) -> Result<()> {
        match self.backend.delete(resource).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn prune(&mut self, previous: &[Resource], targets: &[Resource]) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let engine = ApplyEngine::new(backend.as_ref());
        let pruned = engine.prune(previous, targets).await?;
        if pruned > 0 {
            tracing::info!(count = pruned, "pruned resources dropped from the release");
            if let Some(reporter) = &self.reporter {
                reporter.info(&format!("pruned {pruned} resources no longer in the release"));
            }
        }
        Ok(())
    }
}
