//! Spheron API gateway.
//!
//! This module provides the authenticated HTTP client for the Spheron
//! compute API and the deployment event-stream waiter.
//!
//! - [`types`]: wire types
//! - [`client`]: the HTTP gateway implementation
//! - [`ComputeApi`]: the trait seam reconcilers program against

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

pub mod client;
mod stream;
pub mod types;

pub use client::SpheronClient;

use types::{
    AckResponse, Cluster, CreateFromTemplateRequest, CreateInstanceRequest, DeploymentEventData,
    Domain, DomainRequest, HealthCheckUpdate, Instance, InstanceCreated, InstanceOrder,
    MachineImage, MarketplaceApp, Organization, UpdateInstanceRequest,
};

/// Operations the reconcilers need from the Spheron API.
///
/// Every call is fallible and non-retrying; callers decide whether to
/// retry. Implementations must be safe to share across concurrently
/// reconciling resources.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Fetches the organization the access token is scoped to.
    async fn organization(&self) -> Result<Organization>;

    /// Submits an instance create request.
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<InstanceCreated>;

    /// Submits an instance update request, triggering a redeploy.
    async fn update_instance(
        &self,
        id: &str,
        request: &UpdateInstanceRequest,
    ) -> Result<InstanceCreated>;

    /// Updates an instance health check without redeploying.
    async fn update_health_check(
        &self,
        id: &str,
        request: &HealthCheckUpdate,
    ) -> Result<AckResponse>;

    /// Closes an instance.
    async fn close_instance(&self, id: &str) -> Result<AckResponse>;

    /// Fetches an instance record.
    async fn instance(&self, id: &str) -> Result<Instance>;

    /// Fetches a deployment order.
    async fn instance_order(&self, id: &str) -> Result<InstanceOrder>;

    /// Submits a marketplace template deployment.
    async fn create_from_template(
        &self,
        request: &CreateFromTemplateRequest,
    ) -> Result<InstanceCreated>;

    /// Lists available marketplace apps.
    async fn marketplace_apps(&self) -> Result<Vec<MarketplaceApp>>;

    /// Lists available compute machine images.
    async fn machine_images(&self) -> Result<Vec<MachineImage>>;

    /// Fetches a cluster record.
    async fn cluster(&self, id: &str) -> Result<Cluster>;

    /// Attaches a domain to an instance.
    async fn add_domain(&self, instance_id: &str, request: &DomainRequest) -> Result<Domain>;

    /// Updates a domain on an instance.
    async fn update_domain(
        &self,
        instance_id: &str,
        domain_id: &str,
        request: &DomainRequest,
    ) -> Result<Domain>;

    /// Removes a domain from an instance.
    async fn delete_domain(&self, instance_id: &str, domain_id: &str) -> Result<()>;

    /// Lists domains attached to an instance.
    async fn domains(&self, instance_id: &str) -> Result<Vec<Domain>>;

    /// Blocks until the deployment identified by `topic_id` reaches a
    /// terminal event, returning the success payload.
    async fn wait_for_deployment(&self, topic_id: &str) -> Result<DeploymentEventData>;
}
