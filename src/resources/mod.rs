//! Managed resource reconcilers.
//!
//! Three resource kinds are reconciled against the platform:
//!
//! - [`instance`]: containerized compute instances
//! - [`marketplace`]: catalog app deployments
//! - [`domain`]: custom domains attached to instances
//!
//! Each reconciler exposes the create/read/update/delete lifecycle over
//! the [`ComputeApi`](crate::api::ComputeApi) seam and reports partial
//! failures through [`outcome`] diagnostics.

pub mod domain;
pub mod instance;
pub mod marketplace;
pub mod model;
pub mod outcome;

pub use domain::DomainReconciler;
pub use instance::InstanceReconciler;
pub use marketplace::MarketplaceReconciler;
pub use model::{
    DomainConfig, DomainState, EnvVar, HealthCheckConfig, InstanceConfig, InstanceState,
    MarketplaceConfig, MarketplaceState, PersistentStorageConfig, PortBinding, StorageClass,
};
pub use outcome::{Diagnostic, ReadOutcome, Reconciled, Severity};
