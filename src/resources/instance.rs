//! Compute instance reconciler.
//!
//! Drives the full lifecycle of a containerized compute instance:
//! create with deployment wait, refresh from the active order, diff-based
//! update, and close. The remote deployment order is authoritative for
//! exposed ports and for the concrete plan the platform provisioned.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ComputeApi;
use crate::api::types::{
    ClusterProtocol, CreateInstanceRequest, CustomInstanceSpecs, HealthCheckUpdate,
    InstanceConfiguration, InstanceOrder, UpdateInstanceRequest, WireEnv, WirePort,
};
use crate::error::{ApiError, Result, SpheronError};
use crate::mapping;
use crate::resources::model::{
    HealthCheckConfig, InstanceConfig, InstanceState, PersistentStorageConfig, PortBinding,
};
use crate::resources::outcome::{Diagnostic, ReadOutcome, Reconciled};

/// Registry provider for image-based deployments.
const CLUSTER_PROVIDER: &str = "DOCKERHUB";

/// Plan name the platform reports for custom cpu/memory deployments.
const CUSTOM_PLAN: &str = "Custom Plan";

/// Instance lifecycle state after a close.
const STATE_CLOSED: &str = "Closed";

/// Reconciler for compute instances.
pub struct InstanceReconciler<'a, C: ComputeApi> {
    api: &'a C,
}

impl<'a, C: ComputeApi> InstanceReconciler<'a, C> {
    /// Creates a new instance reconciler.
    #[must_use]
    pub const fn new(api: &'a C) -> Self {
        Self { api }
    }

    /// Creates an instance and waits for its first deployment.
    ///
    /// Once the create call succeeds a remote instance exists, so
    /// later failures (the deployment wait, the order fetch) are
    /// reported as diagnostics on a persisted state instead of errors.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the instance could not
    /// be created at all.
    pub async fn create(&self, config: InstanceConfig) -> Result<Reconciled<InstanceState>> {
        config.validate()?;

        let organization_id = self.api.organization().await?.id;
        let topic = Uuid::new_v4().to_string();
        let request = build_create_request(&organization_id, &topic, &config);

        let created = self.api.create_instance(&request).await?;
        info!(
            instance = %created.cluster_instance_id,
            topic = %topic,
            "instance created, waiting for deployment"
        );

        let cluster_name = config.name.clone();
        let mut state = InstanceState {
            id: created.cluster_instance_id,
            config,
        };

        let event = match self.api.wait_for_deployment(&topic).await {
            Ok(event) => event,
            Err(e) => {
                return Ok(Reconciled::new(state).with_diagnostic(Diagnostic::error(
                    "Deployment did not complete",
                    format!("deployment on cluster {cluster_name} failed: {e}"),
                )));
            }
        };

        merge_exposed_ports(&mut state.config.ports, &event.ports);

        let mut outcome = Reconciled::new(state);

        // The platform picks the concrete plan for named machine images;
        // record it so later diffs see what actually runs.
        if outcome.state.config.cpu.is_none() {
            match self.api.instance_order(&created.cluster_instance_order_id).await {
                Ok(order) => merge_agreed_plan(&mut outcome.state.config, &order),
                Err(e) => {
                    outcome = outcome.with_diagnostic(Diagnostic::warning(
                        "Deployment order unavailable",
                        e.to_string(),
                    ));
                }
            }
        }

        Ok(outcome)
    }

    /// Refreshes an instance from the remote side.
    ///
    /// # Errors
    ///
    /// Returns an error on unexpected API failures. A missing or closed
    /// instance is reported as [`ReadOutcome::Gone`], and a missing
    /// order degrades to a warning.
    pub async fn read(&self, state: &InstanceState) -> Result<ReadOutcome<InstanceState>> {
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
        let mut diagnostics = Vec::new();

        match self.api.instance_order(&instance.active_order).await {
            Ok(order) => merge_order(&mut refreshed.config, &order),
            Err(e) => diagnostics.push(Diagnostic::warning(
                "Deployment order unavailable",
                e.to_string(),
            )),
        }

        match self.api.cluster(&instance.cluster).await {
            Ok(cluster) if !cluster.name.is_empty() => refreshed.config.name = cluster.name,
            Ok(_) => {}
            Err(e) => diagnostics.push(Diagnostic::warning(
                "Cluster record unavailable",
                e.to_string(),
            )),
        }

        // The instance record, not the order, carries the health check.
        if let Some(port) = &instance.health_check.port {
            refreshed.config.health_check = Some(HealthCheckConfig {
                path: instance.health_check.url.clone(),
                port: port.container_port,
            });
        }

        Ok(ReadOutcome::Active(Reconciled {
            state: refreshed,
            diagnostics,
        }))
    }

    /// Applies a desired configuration to an existing instance.
    ///
    /// The health check is pushed unconditionally since it does not
    /// trigger a redeploy. A redeploy is submitted only when the tag,
    /// command, arguments, or environment actually changed.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a remote call other
    /// than the deployment wait fails.
    pub async fn update(
        &self,
        state: &InstanceState,
        desired: InstanceConfig,
    ) -> Result<Reconciled<InstanceState>> {
        desired.validate()?;

        if let Some(health_check) = &desired.health_check {
            self.api
                .update_health_check(
                    &state.id,
                    &HealthCheckUpdate {
                        health_check_url: health_check.path.clone(),
                        health_check_port: health_check.port,
                    },
                )
                .await?;
        }

        let mut next = InstanceState {
            id: state.id.clone(),
            config: desired,
        };

        if !needs_redeploy(&state.config, &next.config) {
            debug!(instance = %state.id, "no redeploy needed");
            return Ok(Reconciled::new(next));
        }

        let organization_id = self.api.organization().await?.id;
        let topic = Uuid::new_v4().to_string();
        let request = UpdateInstanceRequest {
            env: mapping::env_to_wire(&next.config.env, &next.config.secret_env),
            command: next.config.commands.clone(),
            args: next.config.args.clone(),
            unique_topic_id: topic.clone(),
            tag: next.config.tag.clone(),
            organization_id,
        };

        self.api.update_instance(&state.id, &request).await?;
        info!(instance = %state.id, topic = %topic, "redeploy submitted");

        match self.api.wait_for_deployment(&topic).await {
            Ok(event) => {
                merge_exposed_ports(&mut next.config.ports, &event.ports);
                Ok(Reconciled::new(next))
            }
            Err(e) => Ok(Reconciled::new(next).with_diagnostic(Diagnostic::error(
                "Redeploy did not complete",
                e.to_string(),
            ))),
        }
    }

    /// Closes an instance. A remote "already closed" rejection counts
    /// as success.
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

/// Builds the wire create request for an instance configuration.
fn build_create_request(
    organization_id: &str,
    topic: &str,
    config: &InstanceConfig,
) -> CreateInstanceRequest {
    let custom_specs = CustomInstanceSpecs {
        cpu: config.cpu.clone().unwrap_or_default(),
        memory: config.memory_gi.map(mapping::gi).unwrap_or_default(),
        persistent_storage: config
            .persistent_storage
            .as_ref()
            .map(mapping::persistent_storage_to_wire),
        storage: mapping::gi(config.storage_gi),
    };

    let configuration = InstanceConfiguration {
        branch: String::new(),
        folder_name: String::new(),
        protocol: ClusterProtocol::Akash,
        image: config.image.clone(),
        tag: config.tag.clone(),
        instance_count: config.replicas,
        build_image: false,
        ports: mapping::ports_to_wire(&config.ports),
        env: mapping::env_to_wire(&config.env, &config.secret_env),
        command: config.commands.clone(),
        args: config.args.clone(),
        region: config.region.clone(),
        akash_machine_image_name: config.machine_image.clone().unwrap_or_default(),
        custom_instance_specs: custom_specs,
    };

    let (health_check_url, health_check_port) = config.health_check.as_ref().map_or_else(
        || (String::new(), String::new()),
        |hc| (hc.path.clone(), hc.port.to_string()),
    );

    CreateInstanceRequest {
        organization_id: organization_id.to_string(),
        unique_topic_id: topic.to_string(),
        configuration,
        cluster_url: config.image.clone(),
        cluster_provider: CLUSTER_PROVIDER.to_string(),
        cluster_name: config.name.clone(),
        health_check_url,
        health_check_port,
    }
}

/// Fills in remote-assigned exposed ports, matched by container port.
fn merge_exposed_ports(ports: &mut [PortBinding], assigned: &[WirePort]) {
    for binding in ports {
        if let Some(wire) = assigned
            .iter()
            .find(|p| p.container_port == binding.container_port)
        {
            binding.exposed_port = Some(wire.exposed_port);
        }
    }
}

/// Overwrites a config with what the deployment order says is running.
fn merge_order(config: &mut InstanceConfig, order: &InstanceOrder) {
    let Some(provisioned) = &order.cluster_instance_configuration else {
        return;
    };

    if !provisioned.image.is_empty() {
        config.image = provisioned.image.clone();
    }
    if !provisioned.tag.is_empty() {
        config.tag = provisioned.tag.clone();
    }
    if !provisioned.region.is_empty() {
        config.region = provisioned.region.clone();
    }
    if provisioned.instance_count > 0 {
        config.replicas = provisioned.instance_count;
    }
    if !provisioned.ports.is_empty() {
        config.ports = mapping::ports_from_wire(&provisioned.ports);
    }
    if !provisioned.env.is_empty() {
        let (plain, secret) = mapping::env_from_wire(&provisioned.env);
        config.env = plain;
        config.secret_env = secret;
    }
    config.commands.clone_from(&provisioned.command);
    config.args.clone_from(&provisioned.args);

    merge_agreed_plan(config, order);
}

/// Records the concrete plan the platform provisioned. Named plans land
/// in `machine_image`; the custom plan lands in `cpu`/`memory_gi`.
fn merge_agreed_plan(config: &mut InstanceConfig, order: &InstanceOrder) {
    let Some(provisioned) = &order.cluster_instance_configuration else {
        return;
    };
    let agreed = &provisioned.agreed_machine_image;

    if agreed.machine_type == CUSTOM_PLAN {
        if agreed.cpu > 0.0 {
            config.cpu = Some(format_cpu(agreed.cpu));
        }
        if let Ok(memory) = mapping::parse_gi(&agreed.memory) {
            config.memory_gi = Some(memory);
        }
        config.machine_image = None;
    } else if !agreed.machine_type.is_empty() {
        config.machine_image = Some(agreed.machine_type.clone());
    }

    if let Ok(storage_gi) = mapping::parse_gi(&agreed.storage) {
        config.storage_gi = storage_gi;
    }

    if let Some(storage) = &agreed.persistent_storage {
        if let (Ok(class), Ok(size_gi)) = (
            mapping::storage_class_from_code(&storage.class),
            mapping::parse_gi(&storage.size),
        ) {
            config.persistent_storage = Some(PersistentStorageConfig {
                class,
                mount_point: storage.mount_point.clone(),
                size_gi,
            });
        }
    }
}

/// Formats a CPU count the way users write it: whole numbers without a
/// fraction, "0.5" as-is.
fn format_cpu(cpu: f32) -> String {
    if cpu.fract() == 0.0 {
        format!("{}", cpu as u32)
    } else {
        format!("{cpu}")
    }
}

/// Returns true when the desired config differs in a way that needs a
/// redeploy. Environment comparison is order-insensitive; command and
/// argument comparison is not.
fn needs_redeploy(current: &InstanceConfig, desired: &InstanceConfig) -> bool {
    let current_env: HashSet<WireEnv> = mapping::env_to_wire(&current.env, &current.secret_env)
        .into_iter()
        .collect();
    let desired_env: HashSet<WireEnv> = mapping::env_to_wire(&desired.env, &desired.secret_env)
        .into_iter()
        .collect();

    current.tag != desired.tag
        || current.commands != desired.commands
        || current.args != desired.args
        || current_env != desired_env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockComputeApi;
    use crate::api::types::{
        AckResponse, AgreedMachineImage, Cluster, DeploymentEventData, Instance, InstanceCreated,
        OrderConfiguration, Organization, OrganizationProfile,
    };
    use crate::error::DeploymentError;
    use crate::resources::model::{EnvVar, HealthCheckConfig};

    fn organization() -> Organization {
        Organization {
            id: String::from("org-1"),
            profile: OrganizationProfile::default(),
        }
    }

    fn config() -> InstanceConfig {
        InstanceConfig {
            name: String::from("web"),
            image: String::from("nginx"),
            tag: String::from("1.25"),
            region: String::from("us-east"),
            replicas: 1,
            ports: vec![PortBinding {
                container_port: 8080,
                exposed_port: None,
            }],
            env: vec![EnvVar::new("MODE", "prod")],
            secret_env: vec![],
            commands: vec![],
            args: vec![],
            machine_image: Some(String::from("Ventus Small")),
            cpu: None,
            memory_gi: None,
            storage_gi: 10,
            persistent_storage: None,
            health_check: Some(HealthCheckConfig {
                path: String::from("/healthz"),
                port: 8080,
            }),
        }
    }

    fn created() -> InstanceCreated {
        InstanceCreated {
            cluster_id: String::from("cluster-1"),
            cluster_instance_id: String::from("inst-1"),
            cluster_instance_order_id: String::from("order-1"),
            topic: String::new(),
        }
    }

    fn deployed_event() -> DeploymentEventData {
        DeploymentEventData {
            deployment_status: String::from("deployed"),
            latest_url_preview: String::new(),
            provider_host: String::from("provider.example"),
            ports: vec![WirePort {
                container_port: 8080,
                exposed_port: 30080,
            }],
        }
    }

    fn order_with_agreed(machine_type: &str, cpu: f32, memory: &str) -> InstanceOrder {
        InstanceOrder {
            cluster_instance_configuration: Some(OrderConfiguration {
                agreed_machine_image: AgreedMachineImage {
                    machine_type: machine_type.to_string(),
                    cpu,
                    memory: memory.to_string(),
                    ..AgreedMachineImage::default()
                },
                ..OrderConfiguration::default()
            }),
            ..InstanceOrder::default()
        }
    }

    #[tokio::test]
    async fn test_create_builds_wire_request_and_merges_ports() {
        let mut api = MockComputeApi::new();
        api.expect_organization().returning(|| Ok(organization()));
        api.expect_create_instance()
            .withf(|request| {
                request.cluster_provider == "DOCKERHUB"
                    && request.cluster_url == "nginx"
                    && request.health_check_port == "8080"
                    && request.configuration.ports[0].exposed_port == 8080
                    && !request.unique_topic_id.is_empty()
            })
            .returning(|_| Ok(created()));
        api.expect_wait_for_deployment()
            .returning(|_| Ok(deployed_event()));
        api.expect_instance_order()
            .withf(|id| id == "order-1")
            .returning(|_| Ok(order_with_agreed("Ventus Small", 0.0, "")));

        let reconciler = InstanceReconciler::new(&api);
        let outcome = reconciler.create(config()).await.unwrap();

        assert_eq!(outcome.state.id, "inst-1");
        assert_eq!(outcome.state.config.ports[0].exposed_port, Some(30080));
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_create_persists_state_when_wait_fails() {
        let mut api = MockComputeApi::new();
        api.expect_organization().returning(|| Ok(organization()));
        api.expect_create_instance().returning(|_| Ok(created()));
        api.expect_wait_for_deployment().returning(|topic| {
            Err(DeploymentError::Failed {
                topic: topic.to_string(),
            }
            .into())
        });
        api.expect_instance_order().never();

        let reconciler = InstanceReconciler::new(&api);
        let outcome = reconciler.create(config()).await.unwrap();

        assert_eq!(outcome.state.id, "inst-1");
        assert!(outcome.has_errors());
    }

    #[tokio::test]
    async fn test_create_records_custom_plan_from_order() {
        let mut api = MockComputeApi::new();
        api.expect_organization().returning(|| Ok(organization()));
        api.expect_create_instance().returning(|_| Ok(created()));
        api.expect_wait_for_deployment()
            .returning(|_| Ok(deployed_event()));
        api.expect_instance_order()
            .returning(|_| Ok(order_with_agreed("Custom Plan", 2.0, "4Gi")));

        let reconciler = InstanceReconciler::new(&api);
        let outcome = reconciler.create(config()).await.unwrap();

        assert_eq!(outcome.state.config.cpu.as_deref(), Some("2"));
        assert_eq!(outcome.state.config.memory_gi, Some(4));
        assert_eq!(outcome.state.config.machine_image, None);
    }

    #[tokio::test]
    async fn test_update_without_changes_skips_redeploy_but_pushes_health_check() {
        let mut api = MockComputeApi::new();
        api.expect_update_health_check()
            .withf(|id, request| id == "inst-1" && request.health_check_port == 8080)
            .times(1)
            .returning(|_, _| Ok(AckResponse::default()));
        api.expect_update_instance().never();
        api.expect_wait_for_deployment().never();

        let state = InstanceState {
            id: String::from("inst-1"),
            config: config(),
        };

        let reconciler = InstanceReconciler::new(&api);
        let outcome = reconciler.update(&state, config()).await.unwrap();

        assert_eq!(outcome.state.id, "inst-1");
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_update_with_tag_change_redeploys() {
        let mut api = MockComputeApi::new();
        api.expect_update_health_check()
            .returning(|_, _| Ok(AckResponse::default()));
        api.expect_organization().returning(|| Ok(organization()));
        api.expect_update_instance()
            .withf(|id, request| id == "inst-1" && request.tag == "1.26")
            .times(1)
            .returning(|_, _| Ok(created()));
        api.expect_wait_for_deployment()
            .returning(|_| Ok(deployed_event()));

        let state = InstanceState {
            id: String::from("inst-1"),
            config: config(),
        };
        let mut desired = config();
        desired.tag = String::from("1.26");

        let reconciler = InstanceReconciler::new(&api);
        let outcome = reconciler.update(&state, desired).await.unwrap();

        assert_eq!(outcome.state.config.tag, "1.26");
        assert_eq!(outcome.state.config.ports[0].exposed_port, Some(30080));
    }

    #[tokio::test]
    async fn test_env_reorder_does_not_redeploy() {
        let mut current = config();
        current.env = vec![EnvVar::new("A", "1"), EnvVar::new("B", "2")];
        let mut desired = config();
        desired.env = vec![EnvVar::new("B", "2"), EnvVar::new("A", "1")];

        assert!(!needs_redeploy(&current, &desired));

        desired.env.push(EnvVar::new("C", "3"));
        assert!(needs_redeploy(&current, &desired));
    }

    #[tokio::test]
    async fn test_read_reports_closed_instance_gone() {
        let mut api = MockComputeApi::new();
        api.expect_instance().returning(|id| {
            Ok(Instance {
                id: id.to_string(),
                state: String::from("Closed"),
                name: String::new(),
                orders: vec![],
                cluster: String::new(),
                active_order: String::new(),
                latest_url_preview: String::new(),
                agreed_machine_image_type: AgreedMachineImage::default(),
                health_check: crate::api::types::InstanceHealthCheck::default(),
                created_at: None,
                updated_at: None,
            })
        });

        let state = InstanceState {
            id: String::from("inst-1"),
            config: config(),
        };

        let reconciler = InstanceReconciler::new(&api);
        let outcome = reconciler.read(&state).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Gone(_)));
    }

    #[tokio::test]
    async fn test_read_degrades_on_missing_order() {
        let mut api = MockComputeApi::new();
        api.expect_instance().returning(|id| {
            Ok(Instance {
                id: id.to_string(),
                state: String::from("Deployed"),
                name: String::new(),
                orders: vec![String::from("order-1")],
                cluster: String::new(),
                active_order: String::from("order-1"),
                latest_url_preview: String::new(),
                agreed_machine_image_type: AgreedMachineImage::default(),
                health_check: crate::api::types::InstanceHealthCheck::default(),
                created_at: None,
                updated_at: None,
            })
        });
        api.expect_instance_order().returning(|id| {
            Err(ApiError::NotFound {
                path: format!("/v1/cluster-instance/order/{id}"),
            }
            .into())
        });
        api.expect_cluster().returning(|id| {
            Ok(Cluster {
                id: id.to_string(),
                name: String::from("web-cluster"),
                url: String::new(),
            })
        });

        let state = InstanceState {
            id: String::from("inst-1"),
            config: config(),
        };

        let reconciler = InstanceReconciler::new(&api);
        match reconciler.read(&state).await.unwrap() {
            ReadOutcome::Active(outcome) => {
                assert_eq!(outcome.diagnostics.len(), 1);
                assert!(!outcome.has_errors());
                assert_eq!(outcome.state.config.name, "web-cluster");
            }
            ReadOutcome::Gone(_) => panic!("expected the instance to stay active"),
        }
    }

    #[tokio::test]
    async fn test_read_refreshes_health_check_from_instance() {
        let mut api = MockComputeApi::new();
        api.expect_instance().returning(|id| {
            Ok(Instance {
                id: id.to_string(),
                state: String::from("Deployed"),
                name: String::new(),
                orders: vec![String::from("order-1")],
                cluster: String::new(),
                active_order: String::from("order-1"),
                latest_url_preview: String::new(),
                agreed_machine_image_type: AgreedMachineImage::default(),
                health_check: crate::api::types::InstanceHealthCheck {
                    url: String::from("/livez"),
                    port: Some(WirePort {
                        container_port: 9999,
                        exposed_port: 9999,
                    }),
                    ..crate::api::types::InstanceHealthCheck::default()
                },
                created_at: None,
                updated_at: None,
            })
        });
        api.expect_instance_order()
            .returning(|_| Ok(InstanceOrder::default()));
        api.expect_cluster().returning(|id| {
            Ok(Cluster {
                id: id.to_string(),
                name: String::new(),
                url: String::new(),
            })
        });

        let state = InstanceState {
            id: String::from("inst-1"),
            config: config(),
        };

        let reconciler = InstanceReconciler::new(&api);
        match reconciler.read(&state).await.unwrap() {
            ReadOutcome::Active(outcome) => {
                let health_check = outcome.state.config.health_check.unwrap();
                assert_eq!(health_check.port, 9999);
                assert_eq!(health_check.path, "/livez");
            }
            ReadOutcome::Gone(_) => panic!("expected the instance to stay active"),
        }
    }

    #[tokio::test]
    async fn test_delete_tolerates_already_closed() {
        let mut api = MockComputeApi::new();
        api.expect_close_instance()
            .returning(|_| Err(ApiError::remote("Instance already closed").into()));

        let reconciler = InstanceReconciler::new(&api);
        assert!(reconciler.delete("inst-1").await.is_ok());
    }
}
