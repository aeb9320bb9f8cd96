//! Caravan Core - Release planning types for the Kubernetes deployer
//!
//! This crate provides the cluster-independent half of Caravan:
//! - `ChartMetadata`: chart description with declared install units
//! - `Manifest` / `Resource`: rendered documents and parsed objects
//! - `Attribution`: manifest path to owning chart mapping
//! - `Hook`: lifecycle hooks split out of the manifest stream
//! - `install_sequence`: grouping of resources into ordered install units
//! - kind ordering tables for apply and delete

pub mod annotations;
pub mod attribution;
pub mod chart;
pub mod error;
pub mod hooks;
pub mod manifest;
pub mod ordering;
pub mod resource;
pub mod sequence;

pub use attribution::{Attribution, chart_for_path};
pub use chart::{ChartMetadata, InstallUnitSpec};
pub use error::{CoreError, Result};
pub use hooks::{Hook, HookDeletePolicy, HookEvent, sort_hooks, split_hooks};
pub use manifest::{Manifest, ManifestHead};
pub use ordering::{INSTALL_ORDER, UNINSTALL_ORDER, compare_kinds, sort_for_install, sort_for_uninstall};
pub use resource::{Resource, ResourceKey};
pub use sequence::{InstallUnit, install_sequence, sequence_for_events};
