//! Caravan Kube - Kubernetes integration for Caravan
//!
//! This crate provides:
//! - **Cluster Backend**: Typed access to a live cluster plus an in-memory mock
//! - **Apply Engine**: Create/patch/recreate with no-op detection and pruning
//! - **Status Readers**: Per-kind readiness interpretation with custom overrides
//! - **Status Waiter**: Readiness, completion and deletion waits with deadlines
//! - **Deployer**: Unit-by-unit rollout with lifecycle hooks
//! - **Progress Reporting**: Real-time feedback during deployment operations

pub mod apply;
pub mod cluster;
pub mod convert;
pub mod deploy;
pub mod error;
pub mod progress;
pub mod readers;
pub mod wait;

pub use apply::{ApplyEngine, ApplyOutcome};
pub use cluster::{ClusterBackend, KubeBackend, MockCluster, OperationCounts, PatchBody};
pub use convert::{gvk_of, sanitize};
pub use deploy::{DeployOptions, Deployer};
pub use error::{KubeError, Result};
pub use progress::{ProgressReporter, ResourceStatus, TrackedResource};
pub use readers::{
    AlwaysReadyReader, GenericReader, JobCompleteReader, JobReadyReader, PodReader,
    ReaderRegistry, ResourceState, Status, StatusReader,
};
pub use wait::StatusWaiter;
