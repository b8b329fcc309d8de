// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(missing_docs)]                // All public items should be documented

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Spheron Provider
//!
//! A declarative provisioning library for the Spheron compute platform.
//!
//! ## Overview
//!
//! The library manages three resource kinds over the Spheron HTTP API:
//!
//! - **Compute instances**: containerized deployments with ports,
//!   environment, health checks, and custom or named compute plans
//! - **Marketplace apps**: one-click catalog deployments resolved by name
//! - **Custom domains**: domains and subdomains attached to instances
//!
//! ## Architecture
//!
//! Each resource follows the same lifecycle:
//!
//! 1. **Desired State**: a validated resource configuration
//! 2. **Observed State**: fetched from the Spheron API
//! 3. **Reconciler**: converges them, waiting on the deployment event
//!    stream where a deployment is involved
//!
//! ## Modules
//!
//! - [`api`]: the Spheron API gateway and wire types
//! - [`config`]: provider connection settings
//! - [`error`]: the error hierarchy
//! - [`mapping`]: pure transforms between models and wire shapes
//! - [`resources`]: the resource reconcilers
//!
//! ## Example
//!
//! ```no_run
//! use spheron_provider::{ProviderConfig, SpheronClient};
//! use spheron_provider::resources::InstanceReconciler;
//!
//! # async fn run() -> spheron_provider::Result<()> {
//! let config = ProviderConfig::from_env()?;
//! let client = SpheronClient::new(&config)?;
//! let _reconciler = InstanceReconciler::new(&client);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod config;
pub mod error;
pub mod mapping;
pub mod resources;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{ComputeApi, SpheronClient};
pub use config::ProviderConfig;
pub use error::{ApiError, DeploymentError, NotFoundError, Result, SpheronError, ValidationError};
pub use resources::{
    DomainReconciler, InstanceReconciler, MarketplaceReconciler, ReadOutcome, Reconciled,
};
