//! Create-or-patch apply engine
//!
//! Applies desired-state resources one at a time: create when absent,
//! patch when drifted, and no touch at all when the sanitized documents
//! already match. Force mode recovers from rejected patches by
//! delete-and-recreate.

use std::collections::HashSet;

use caravan_core::{Resource, ResourceKey};

use crate::cluster::{ClusterBackend, PatchBody};
use crate::convert::{refresh_resource, sanitize, supports_strategic_merge, to_document};
use crate::error::Result;

/// What happened to one applied resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Patched,
    /// Cluster already matched the target; nothing was sent
    Unchanged,
    /// Patch was rejected and force mode replaced the object
    Recreated,
}

impl ApplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Patched => "patched",
            ApplyOutcome::Unchanged => "unchanged",
            ApplyOutcome::Recreated => "recreated",
        }
    }
}

/// Applies and deletes resources through a [`ClusterBackend`].
pub struct ApplyEngine<'a, B: ClusterBackend> {
    backend: &'a B,
    force: bool,
}

impl<'a, B: ClusterBackend> ApplyEngine<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            force: false,
        }
    }

    /// Recover from rejected patches by delete-and-recreate.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Apply every resource in order, stopping at the first failure.
    pub async fn apply(&self, resources: &mut [Resource]) -> Result<()> {
        for resource in resources.iter_mut() {
            let outcome = self.apply_one(resource).await?;
            tracing::debug!(resource = %resource.key(), outcome = outcome.as_str(), "applied");
        }
        Ok(())
    }

    /// Apply one resource, reporting what happened.
    pub async fn apply_one(&self, resource: &mut Resource) -> Result<ApplyOutcome> {
        let Some(current) = self.backend.get(resource).await? else {
            let created = self.backend.create(resource).await?;
            refresh_resource(resource, &created);
            return Ok(ApplyOutcome::Created);
        };

        let mut live_doc = to_document(&current)?;
        sanitize(&mut live_doc);
        let mut target_doc = resource.doc.clone();
        sanitize(&mut target_doc);

        // serde_json keeps map keys sorted, so equal documents serialize
        // to equal strings.
        if serde_json::to_string(&live_doc)? == serde_json::to_string(&target_doc)? {
            refresh_resource(resource, &current);
            return Ok(ApplyOutcome::Unchanged);
        }

        let body = if supports_strategic_merge(resource) {
            PatchBody::Strategic(target_doc)
        } else {
            PatchBody::Merge(target_doc)
        };

        match self.backend.patch(resource, body).await {
            Ok(patched) => {
                refresh_resource(resource, &patched);
                Ok(ApplyOutcome::Patched)
            }
            Err(err) if self.force => {
                tracing::warn!(
                    resource = %resource.key(),
                    error = %err,
                    "patch rejected, recreating"
                );
                self.recreate(resource).await
            }
            Err(err) => Err(err),
        }
    }

    async fn recreate(&self, resource: &mut Resource) -> Result<ApplyOutcome> {
        match self.backend.delete(resource).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let created = self.backend.create(resource).await?;
        refresh_resource(resource, &created);
        Ok(ApplyOutcome::Recreated)
    }

    /// Delete one resource, honoring its keep policy.
    ///
    /// Returns whether the object was actually deleted; absent and kept
    /// objects report false.
    pub async fn delete(&self, resource: &Resource) -> Result<bool> {
        if resource.has_keep_policy() {
            tracing::debug!(resource = %resource.key(), "kept by resource policy");
            return Ok(false);
        }

        match self.backend.delete(resource).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Delete previously-applied resources that are no longer targets.
    ///
    /// Individual delete failures are logged and skipped so one stuck
    /// object cannot block the rest of an upgrade.
    pub async fn prune(&self, previous: &[Resource], target: &[Resource]) -> Result<usize> {
        let keep: HashSet<ResourceKey> = target.iter().map(|r| r.key()).collect();
        let mut pruned = 0;

        for resource in previous {
            if keep.contains(&resource.key()) {
                continue;
            }

            match self.delete(resource).await {
                Ok(true) => pruned += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(resource = %resource.key(), error = %err, "failed to prune");
                }
            }
        }

        Ok(pruned)
    }
}
