//! Marketplace app reconciler.
//!
//! Deploys catalog apps by name: the app and the machine image are both
//! resolved against the remote catalogs, template-declared variables are
//! resolved against user values and defaults, and the deployment is
//! waited on like any other instance. The backing object is a regular
//! compute instance, so read and delete share the instance semantics.

use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ComputeApi;
use crate::api::types::{CreateFromTemplateRequest, CustomInstanceSpecs};
use crate::error::{ApiError, Result, SpheronError};
use crate::mapping;
use crate::resources::model::{MarketplaceConfig, MarketplaceState};
use crate::resources::outcome::{Diagnostic, ReadOutcome, Reconciled};

/// Region the platform treats as "pick any".
const ANY_REGION: &str = "any";

/// Instance lifecycle state after a close.
const STATE_CLOSED: &str = "Closed";

/// Grace period between the deployment event and the order becoming
/// readable. The order is written asynchronously after the event fires.
const ORDER_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Reconciler for marketplace app deployments.
pub struct MarketplaceReconciler<'a, C: ComputeApi> {
    api: &'a C,
}

impl<'a, C: ComputeApi> MarketplaceReconciler<'a, C> {
    /// Creates a new marketplace reconciler.
    #[must_use]
    pub const fn new(api: &'a C) -> Self {
        Self { api }
    }

    /// Deploys a marketplace app and waits for its deployment.
    ///
    /// Once the deployment is submitted a remote instance exists, so
    /// later failures are reported as diagnostics on a persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, a catalog lookup fails, a
    /// required template variable is unresolved, or the deployment could
    /// not be submitted.
    pub async fn create(&self, config: MarketplaceConfig) -> Result<Reconciled<MarketplaceState>> {
        config.validate()?;

        let organization_id = self.api.organization().await?.id;

        let images = self.api.machine_images().await?;
        let image = mapping::find_machine_image(&images, &config.machine_image)?;

        let apps = self.api.marketplace_apps().await?;
        let app = mapping::find_marketplace_app(&apps, &config.name)?;

        let variables =
            mapping::resolve_template_variables(&app.service_data.variables, &config.env)?;

        let region = if config.region.trim().is_empty() {
            ANY_REGION.to_string()
        } else {
            config.region.clone()
        };

        let topic = Uuid::new_v4().to_string();
        let request = CreateFromTemplateRequest {
            template_id: app.id.clone(),
            environment_variables: variables,
            organization_id,
            akash_image_id: image.id.clone(),
            unique_topic_id: topic.clone(),
            region: region.clone(),
            custom_instance_specs: CustomInstanceSpecs::default(),
            instance_count: 1,
        };

        let created = self.api.create_from_template(&request).await?;
        info!(
            instance = %created.cluster_instance_id,
            app = %config.name,
            topic = %topic,
            "marketplace deployment submitted"
        );

        let state = MarketplaceState {
            id: created.cluster_instance_id,
            config: MarketplaceConfig { region, ..config },
            ports: Vec::new(),
        };

        if let Err(e) = self.api.wait_for_deployment(&topic).await {
            let app_name = state.config.name.clone();
            return Ok(Reconciled::new(state).with_diagnostic(Diagnostic::error(
                "Deployment did not complete",
                format!("deployment of app {app_name} failed: {e}"),
            )));
        }

        // The order lags the deployment event.
        tokio::time::sleep(ORDER_SETTLE_DELAY).await;

        let mut outcome = Reconciled::new(state);
        match self
            .api
            .instance_order(&created.cluster_instance_order_id)
            .await
        {
            Ok(order) => {
                outcome.state.ports = order
                    .cluster_instance_configuration
                    .as_ref()
                    .map(|c| mapping::ports_from_wire(&c.ports))
                    .unwrap_or_default();
            }
            Err(e) => {
                outcome = outcome.with_diagnostic(Diagnostic::warning(
                    "Deployment order unavailable",
                    e.to_string(),
                ));
            }
        }

        Ok(outcome)
    }

    /// Refreshes a marketplace deployment from the remote side.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected API failures. A missing or closed
    /// backing instance is reported as [`ReadOutcome::Gone`], and a
    /// missing order blanks the derived ports with a warning.
    pub async fn read(&self, state: &MarketplaceState) -> Result<ReadOutcome<MarketplaceState>> {
        let instance = match self.api.instance(&state.id).await {
            Ok(instance) => instance,
            Err(SpheronError::Api(ApiError::NotFound { .. })) => {
                return Ok(ReadOutcome::Gone(Diagnostic::warning(
                    "Instance not found",
                    format!("instance {} no longer exists", state.id),
                )));
            }
            Err(e) => return Err(e),
        };

        if instance.state == STATE_CLOSED {
            return Ok(ReadOutcome::Gone(Diagnostic::warning(
                "Instance closed",
                format!("instance {} is closed", state.id),
            )));
        }

        let mut refreshed = state.clone();
        let outcome = match self.api.instance_order(&instance.active_order).await {
            Ok(order) => {
                refreshed.ports = order
                    .cluster_instance_configuration
                    .as_ref()
                    .map(|c| mapping::ports_from_wire(&c.ports))
                    .unwrap_or_default();
                Reconciled::new(refreshed)
            }
            Err(e) => {
                refreshed.ports = Vec::new();
                Reconciled::new(refreshed).with_diagnostic(Diagnostic::warning(
                    "Deployment order unavailable",
                    e.to_string(),
                ))
            }
        };

        Ok(ReadOutcome::Active(outcome))
    }

    /// Applies a desired configuration to a marketplace deployment.
    ///
    /// The platform offers no in-place update for template deployments,
    /// so this only rewrites local state; no remote call is made.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub async fn update(
        &self,
        state: &MarketplaceState,
        desired: MarketplaceConfig,
    ) -> Result<Reconciled<MarketplaceState>> {
        desired.validate()?;
        debug!(instance = %state.id, "marketplace update is local only");

        Ok(Reconciled::new(MarketplaceState {
            id: state.id.clone(),
            config: desired,
            ports: state.ports.clone(),
        }))
    }

    /// Closes the backing instance. A remote "already closed" rejection
    /// counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the close call fails for any other reason.
    pub async fn delete(&self, id: &str) -> Result<()> {
        match self.api.close_instance(id).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_closed() => {
                warn!(instance = %id, "instance was already closed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
