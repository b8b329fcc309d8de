//! Custom domain reconciler.
//!
//! Attaches domains and subdomains to running instances. The link a
//! domain points at is never user-supplied; it is resolved from the
//! instance's active deployment order at attach and update time, so the
//! domain always follows the deployment that is actually live.

use tracing::{debug, info};

use crate::api::ComputeApi;
use crate::api::types::DomainRequest;
use crate::error::{ApiError, Result, SpheronError};
use crate::mapping;
use crate::resources::model::{DomainConfig, DomainState};
use crate::resources::outcome::{Diagnostic, ReadOutcome, Reconciled};

/// Instance lifecycle state after a close.
const STATE_CLOSED: &str = "Closed";

/// Reconciler for custom domains.
pub struct DomainReconciler<'a, C: ComputeApi> {
    api: &'a C,
}

impl<'a, C: ComputeApi> DomainReconciler<'a, C> {
    /// Creates a new domain reconciler.
    #[must_use]
    pub const fn new(api: &'a C) -> Self {
        Self { api }
    }

    /// Resolves the deployment link for the configured container port.
    async fn resolve_link(&self, config: &DomainConfig) -> Result<String> {
        let instance = self.api.instance(&config.instance_id).await?;
        let order = self.api.instance_order(&instance.active_order).await?;
        mapping::deployment_url(&order, config.container_port)
    }

    /// Attaches a domain to an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, the deployment link cannot
    /// be resolved, or the attach call fails.
    pub async fn create(&self, config: DomainConfig) -> Result<Reconciled<DomainState>> {
        config.validate()?;

        let link = self.resolve_link(&config).await?;
        debug!(domain = %config.name, link = %link, "resolved deployment link");

        let request = DomainRequest {
            link,
            kind: config.kind,
            name: config.name.clone(),
        };
        let domain = self.api.add_domain(&config.instance_id, &request).await?;
        info!(domain = %domain.name, instance = %config.instance_id, "domain attached");

        Ok(Reconciled::new(DomainState {
            id: domain.id,
            verified: domain.verified,
            link: domain.link,
            config,
        }))
    }

    /// Refreshes a domain from the instance's domain list.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected API failures. A domain that is no
    /// longer attached, or whose instance is gone, is reported as
    /// [`ReadOutcome::Gone`].
    pub async fn read(&self, state: &DomainState) -> Result<ReadOutcome<DomainState>> {
        let instance_id = &state.config.instance_id;
        let instance = match self.api.instance(instance_id).await {
            Ok(instance) => instance,
            Err(SpheronError::Api(ApiError::NotFound { .. })) => {
                return Ok(ReadOutcome::Gone(Diagnostic::warning(
                    "Instance not found",
                    format!("instance {instance_id} no longer exists"),
                )));
            }
            Err(e) => return Err(e),
        };

        if instance.state == STATE_CLOSED {
            return Ok(ReadOutcome::Gone(Diagnostic::warning(
                "Instance closed",
                format!("instance {instance_id} is closed, domain is orphaned"),
            )));
        }

        let domains = self.api.domains(instance_id).await?;

        let Ok(domain) = mapping::find_domain_by_id(&domains, &state.id) else {
            return Ok(ReadOutcome::Gone(Diagnostic::warning(
                "Domain not found",
                format!("domain {} is no longer attached", state.id),
            )));
        };

        let mut refreshed = state.clone();
        refreshed.config.name.clone_from(&domain.name);
        refreshed.config.kind = domain.kind;
        refreshed.verified = domain.verified;
        refreshed.link.clone_from(&domain.link);

        Ok(ReadOutcome::Active(Reconciled::new(refreshed)))
    }

    /// Applies a desired configuration to an attached domain, re-resolving
    /// the deployment link.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails, the link cannot be resolved,
    /// or the update call fails.
    pub async fn update(
        &self,
        state: &DomainState,
        desired: DomainConfig,
    ) -> Result<Reconciled<DomainState>> {
        desired.validate()?;

        let link = self.resolve_link(&desired).await?;
        let request = DomainRequest {
            link,
            kind: desired.kind,
            name: desired.name.clone(),
        };

        let domain = self
            .api
            .update_domain(&desired.instance_id, &state.id, &request)
            .await?;

        Ok(Reconciled::new(DomainState {
            id: domain.id,
            verified: domain.verified,
            link: domain.link,
            config: desired,
        }))
    }

    /// Detaches a domain from an instance. An already detached domain
    /// counts as success.
    ///
    /// # Errors
    ///
    /// Returns an error if the detach call fails for any other reason.
    pub async fn delete(&self, instance_id: &str, domain_id: &str) -> Result<()> {
        match self.api.delete_domain(instance_id, domain_id).await {
            Ok(()) => Ok(()),
            Err(SpheronError::Api(ApiError::NotFound { .. })) => {
                debug!(domain = %domain_id, "domain was already detached");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockComputeApi;
    use crate::api::types::{
        AgreedMachineImage, Domain, DomainType, Instance, InstanceHealthCheck, InstanceOrder,
        OrderConfiguration, ProtocolData, WirePort,
    };
    use crate::error::NotFoundError;

    fn config() -> DomainConfig {
        DomainConfig {
            name: String::from("app.example.com"),
            kind: DomainType::Domain,
            instance_id: String::from("inst-1"),
            container_port: 8000,
        }
    }

    fn instance(active_order: &str) -> Instance {
        Instance {
            id: String::from("inst-1"),
            state: String::from("Deployed"),
            name: String::new(),
            orders: vec![active_order.to_string()],
            cluster: String::new(),
            active_order: active_order.to_string(),
            latest_url_preview: String::new(),
            agreed_machine_image_type: AgreedMachineImage::default(),
            health_check: InstanceHealthCheck::default(),
            created_at: None,
            updated_at: None,
        }
    }

    fn order(exposed_port: u16, preview: &str) -> InstanceOrder {
        InstanceOrder {
            url_preview: preview.to_string(),
            protocol_data: Some(ProtocolData {
                provider_host: String::from("provider.example"),
            }),
            cluster_instance_configuration: Some(OrderConfiguration {
                ports: vec![WirePort {
                    container_port: 8000,
                    exposed_port,
                }],
                ..OrderConfiguration::default()
            }),
            ..InstanceOrder::default()
        }
    }

    fn remote_domain(id: &str, link: &str) -> Domain {
        Domain {
            id: id.to_string(),
            name: String::from("app.example.com"),
            verified: false,
            link: link.to_string(),
            kind: DomainType::Domain,
            instance_id: String::from("inst-1"),
        }
    }

    #[tokio::test]
    async fn test_create_resolves_link_from_active_order() {
        let mut api = MockComputeApi::new();
        api.expect_instance()
            .returning(|_| Ok(instance("order-1")));
        api.expect_instance_order()
            .withf(|id| id == "order-1")
            .returning(|_| Ok(order(80, "https://app.preview.example")));
        api.expect_add_domain()
            .withf(|instance_id, request| {
                instance_id == "inst-1" && request.link == "https://app.preview.example"
            })
            .returning(|_, request| Ok(remote_domain("dom-1", &request.link)));

        let reconciler = DomainReconciler::new(&api);
        let outcome = reconciler.create(config()).await.unwrap();

        assert_eq!(outcome.state.id, "dom-1");
        assert_eq!(outcome.state.link, "https://app.preview.example");
    }

    #[tokio::test]
    async fn test_create_fails_when_port_not_exposed() {
        let mut api = MockComputeApi::new();
        api.expect_instance()
            .returning(|_| Ok(instance("order-1")));
        api.expect_instance_order().returning(|_| {
            Ok(InstanceOrder {
                cluster_instance_configuration: Some(OrderConfiguration::default()),
                ..InstanceOrder::default()
            })
        });
        api.expect_add_domain().never();

        let reconciler = DomainReconciler::new(&api);
        let err = reconciler.create(config()).await.unwrap_err();
        assert!(matches!(
            err,
            SpheronError::NotFound(NotFoundError::PortNotExposed {
                container_port: 8000
            })
        ));
    }

    #[tokio::test]
    async fn test_read_reports_closed_instance_as_orphaned() {
        let mut api = MockComputeApi::new();
        api.expect_instance().returning(|_| {
            let mut instance = instance("order-1");
            instance.state = String::from("Closed");
            Ok(instance)
        });
        api.expect_domains().never();

        let state = DomainState {
            id: String::from("dom-1"),
            config: config(),
            verified: true,
            link: String::new(),
        };

        let reconciler = DomainReconciler::new(&api);
        let outcome = reconciler.read(&state).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Gone(_)));
    }

    #[tokio::test]
    async fn test_read_reports_detached_domain_gone() {
        let mut api = MockComputeApi::new();
        api.expect_instance().returning(|_| Ok(instance("order-1")));
        api.expect_domains().returning(|_| Ok(vec![]));

        let state = DomainState {
            id: String::from("dom-1"),
            config: config(),
            verified: false,
            link: String::new(),
        };

        let reconciler = DomainReconciler::new(&api);
        let outcome = reconciler.read(&state).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Gone(_)));
    }

    #[tokio::test]
    async fn test_read_picks_up_verification() {
        let mut api = MockComputeApi::new();
        api.expect_instance().returning(|_| Ok(instance("order-1")));
        api.expect_domains().returning(|_| {
            let mut domain = remote_domain("dom-1", "provider.example:30080");
            domain.verified = true;
            Ok(vec![domain])
        });

        let state = DomainState {
            id: String::from("dom-1"),
            config: config(),
            verified: false,
            link: String::new(),
        };

        let reconciler = DomainReconciler::new(&api);
        match reconciler.read(&state).await.unwrap() {
            ReadOutcome::Active(outcome) => {
                assert!(outcome.state.verified);
                assert_eq!(outcome.state.link, "provider.example:30080");
            }
            ReadOutcome::Gone(_) => panic!("expected the domain to stay active"),
        }
    }

    #[tokio::test]
    async fn test_update_rebinds_link_to_non_http_port() {
        let mut api = MockComputeApi::new();
        api.expect_instance()
            .returning(|_| Ok(instance("order-2")));
        api.expect_instance_order()
            .returning(|_| Ok(order(30080, "https://stale.preview.example")));
        api.expect_update_domain()
            .withf(|instance_id, domain_id, request| {
                instance_id == "inst-1"
                    && domain_id == "dom-1"
                    && request.link == "provider.example:30080"
            })
            .returning(|_, _, request| Ok(remote_domain("dom-1", &request.link)));

        let state = DomainState {
            id: String::from("dom-1"),
            config: config(),
            verified: true,
            link: String::from("https://stale.preview.example"),
        };

        let reconciler = DomainReconciler::new(&api);
        let outcome = reconciler.update(&state, config()).await.unwrap();
        assert_eq!(outcome.state.link, "provider.example:30080");
    }

    #[tokio::test]
    async fn test_delete_tolerates_already_detached() {
        let mut api = MockComputeApi::new();
        api.expect_delete_domain().returning(|_, domain_id| {
            Err(ApiError::NotFound {
                path: format!("/v1/cluster-instance/inst-1/domains/{domain_id}"),
            }
            .into())
        });

        let reconciler = DomainReconciler::new(&api);
        assert!(reconciler.delete("inst-1", "dom-1").await.is_ok());
    }
}
