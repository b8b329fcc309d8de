//! Spheron API wire types.
//!
//! This module defines the JSON shapes exchanged with the Spheron compute
//! API. All structs follow the remote camelCase convention; read-side
//! structs are default-tolerant so partially populated responses decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope of an access token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenScope {
    /// Organizations the token can act on.
    #[serde(default)]
    pub organizations: Vec<TokenOrganization>,
}

/// Organization entry inside a token scope.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenOrganization {
    /// Organization identifier.
    pub id: String,
    /// Organization name.
    #[serde(default)]
    pub name: String,
    /// Organization username.
    #[serde(default)]
    pub username: String,
}

/// An organization record.
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    /// Organization identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Organization profile.
    #[serde(default)]
    pub profile: OrganizationProfile,
}

/// Profile block of an organization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationProfile {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Username.
    #[serde(default)]
    pub username: String,
}

/// A port mapping on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePort {
    /// Port the container listens on.
    pub container_port: u16,
    /// Port the platform exposes it on.
    pub exposed_port: u16,
}

/// An environment variable on the wire: a `KEY=VALUE` string tagged with
/// a secrecy flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEnv {
    /// The `KEY=VALUE` encoding.
    pub value: String,
    /// Whether the platform should treat the value as secret.
    pub is_secret: bool,
}

/// Persistent storage block on the wire. The class carries an opaque
/// platform code, not the user-facing class name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePersistentStorage {
    /// Opaque storage class code.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub class: String,
    /// Mount point inside the container.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_point: String,
    /// Size as a Gi-suffixed string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
}

/// Custom compute plan specs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomInstanceSpecs {
    /// CPU count, e.g. "0.5" or "2".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,
    /// Memory as a Gi-suffixed string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,
    /// Optional persistent storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_storage: Option<WirePersistentStorage>,
    /// Ephemeral storage as a Gi-suffixed string.
    #[serde(default)]
    pub storage: String,
}

/// Deployment protocol selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterProtocol {
    /// The Akash compute protocol.
    Akash,
}

/// Configuration block of an instance create request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfiguration {
    /// Unused for image deployments; always empty.
    pub branch: String,
    /// Unused for image deployments; always empty.
    pub folder_name: String,
    /// Deployment protocol.
    pub protocol: ClusterProtocol,
    /// Docker image reference.
    pub image: String,
    /// Docker image tag.
    pub tag: String,
    /// Replica count.
    pub instance_count: u32,
    /// Whether the platform should build the image; always false here.
    pub build_image: bool,
    /// Port mappings.
    pub ports: Vec<WirePort>,
    /// Environment variables, plain and secret merged.
    pub env: Vec<WireEnv>,
    /// Container entrypoint command.
    pub command: Vec<String>,
    /// Container command arguments.
    pub args: Vec<String>,
    /// Deployment region.
    pub region: String,
    /// Named machine image; empty when custom specs are used.
    pub akash_machine_image_name: String,
    /// Custom compute specs; storage is always populated.
    pub custom_instance_specs: CustomInstanceSpecs,
}

/// Request to create a cluster instance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    /// Owning organization.
    pub organization_id: String,
    /// Correlation token for the deployment event stream.
    pub unique_topic_id: String,
    /// Instance configuration.
    pub configuration: InstanceConfiguration,
    /// Docker registry URL; the image reference for DOCKERHUB deployments.
    pub cluster_url: String,
    /// Registry provider, e.g. "DOCKERHUB".
    pub cluster_provider: String,
    /// Name of the cluster the instance belongs to.
    pub cluster_name: String,
    /// Health check path; empty when no health check is configured.
    pub health_check_url: String,
    /// Health check port. The create endpoint takes this as a string.
    pub health_check_port: String,
}

/// Request to update a cluster instance and trigger a redeploy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstanceRequest {
    /// Environment variables, plain and secret merged.
    pub env: Vec<WireEnv>,
    /// Container entrypoint command.
    pub command: Vec<String>,
    /// Container command arguments.
    pub args: Vec<String>,
    /// Correlation token for the redeploy event stream.
    pub unique_topic_id: String,
    /// Docker image tag.
    pub tag: String,
    /// Owning organization.
    pub organization_id: String,
}

/// Request to update an instance health check.
///
/// Unlike the create endpoint, this one takes the port as an integer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckUpdate {
    /// Health check path.
    pub health_check_url: String,
    /// Health check container port.
    pub health_check_port: u16,
}

/// Response to instance create/update submissions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceCreated {
    /// Owning cluster id.
    #[serde(default)]
    pub cluster_id: String,
    /// The created instance id.
    pub cluster_instance_id: String,
    /// The deployment order created for this submission.
    #[serde(default)]
    pub cluster_instance_order_id: String,
    /// Correlation token echoed back.
    #[serde(default)]
    pub topic: String,
}

/// Generic acknowledgement envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AckResponse {
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Whether the operation succeeded.
    #[serde(default)]
    pub success: bool,
    /// Whether the target was updated.
    #[serde(default)]
    pub updated: bool,
}

/// A cluster instance record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Instance identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Lifecycle state, e.g. "Deployed" or "Closed".
    #[serde(default)]
    pub state: String,
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// All deployment order ids.
    #[serde(default)]
    pub orders: Vec<String>,
    /// Owning cluster id.
    #[serde(default)]
    pub cluster: String,
    /// The deployment order the platform considers authoritative.
    #[serde(default)]
    pub active_order: String,
    /// Latest preview URL.
    #[serde(default)]
    pub latest_url_preview: String,
    /// The compute plan actually provisioned.
    #[serde(default)]
    pub agreed_machine_image_type: AgreedMachineImage,
    /// Health check state.
    #[serde(default)]
    pub health_check: InstanceHealthCheck,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The remote-resolved concrete compute plan.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreedMachineImage {
    /// Machine image name, e.g. "Ventus Small" or "Custom Plan".
    #[serde(default)]
    pub machine_type: String,
    /// Storage as a Gi-suffixed string.
    #[serde(default)]
    pub storage: String,
    /// Provisioned CPU count.
    #[serde(default)]
    pub cpu: f32,
    /// Memory as a Gi-suffixed string.
    #[serde(default)]
    pub memory: String,
    /// Persistent storage, when attached.
    #[serde(default)]
    pub persistent_storage: Option<WirePersistentStorage>,
}

/// Health check block on an instance record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceHealthCheck {
    /// Health check path.
    #[serde(default)]
    pub url: String,
    /// Health check port mapping.
    #[serde(default)]
    pub port: Option<WirePort>,
    /// Last observed status.
    #[serde(default)]
    pub status: String,
    /// Time of the last probe.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A deployment order: the remote-authoritative record of what was
/// provisioned for a correlation token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceOrder {
    /// Order identifier.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Order status.
    #[serde(default)]
    pub status: String,
    /// Preview URL. The wire misspells the field as "urlPrewiew".
    #[serde(rename = "urlPrewiew", default)]
    pub url_preview: String,
    /// Protocol-specific data.
    #[serde(default)]
    pub protocol_data: Option<ProtocolData>,
    /// Provisioned configuration.
    #[serde(default)]
    pub cluster_instance_configuration: Option<OrderConfiguration>,
}

/// Protocol-specific block of a deployment order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolData {
    /// Host the provider exposes the deployment on.
    #[serde(default)]
    pub provider_host: String,
}

/// Provisioned configuration inside a deployment order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfiguration {
    /// Docker image reference.
    #[serde(default)]
    pub image: String,
    /// Docker image tag.
    #[serde(default)]
    pub tag: String,
    /// Provisioned port mappings, exposed ports assigned.
    #[serde(default)]
    pub ports: Vec<WirePort>,
    /// Environment variables.
    #[serde(default)]
    pub env: Vec<WireEnv>,
    /// Container entrypoint command.
    #[serde(default)]
    pub command: Vec<String>,
    /// Container command arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Deployment region.
    #[serde(default)]
    pub region: String,
    /// The compute plan actually provisioned.
    #[serde(default)]
    pub agreed_machine_image: AgreedMachineImage,
    /// Replica count.
    #[serde(default)]
    pub instance_count: u32,
}

/// Domain binding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    /// A fully qualified domain.
    Domain,
    /// A subdomain.
    Subdomain,
}

/// Request to attach or update a domain on an instance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRequest {
    /// Resolved deployment link the domain points at.
    pub link: String,
    /// Domain binding type.
    #[serde(rename = "type")]
    pub kind: DomainType,
    /// Domain name.
    pub name: String,
}

/// A domain record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    /// Domain identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Domain name.
    #[serde(default)]
    pub name: String,
    /// Whether the platform has verified DNS ownership.
    #[serde(default)]
    pub verified: bool,
    /// Resolved deployment link.
    #[serde(default)]
    pub link: String,
    /// Domain binding type.
    #[serde(rename = "type")]
    pub kind: DomainType,
    /// Owning instance id.
    #[serde(default)]
    pub instance_id: String,
}

/// A marketplace app (cluster template).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceApp {
    /// Template identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Template name.
    #[serde(default)]
    pub name: String,
    /// Service metadata.
    #[serde(default)]
    pub service_data: MarketplaceServiceData,
}

/// Service metadata of a marketplace app.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarketplaceServiceData {
    /// Declared configurable variables.
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

/// A variable declared by a marketplace template.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    /// Variable name users configure it by.
    pub name: String,
    /// Label the deployment endpoint expects.
    #[serde(default)]
    pub label: String,
    /// Default value, when the template declares one.
    #[serde(default)]
    pub default_value: String,
    /// Whether the variable must resolve to a value.
    #[serde(default)]
    pub required: bool,
}

/// A resolved variable sent with a marketplace deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentVariable {
    /// Template-declared label.
    pub label: String,
    /// Resolved value.
    pub value: String,
}

/// Request to create an instance from a marketplace template.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFromTemplateRequest {
    /// Template to instantiate.
    pub template_id: String,
    /// Resolved deployment variables.
    pub environment_variables: Vec<DeploymentVariable>,
    /// Owning organization.
    pub organization_id: String,
    /// Machine image to deploy on.
    pub akash_image_id: String,
    /// Correlation token for the deployment event stream.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unique_topic_id: String,
    /// Deployment region.
    pub region: String,
    /// Custom compute specs; unused for template deployments.
    pub custom_instance_specs: CustomInstanceSpecs,
    /// Replica count; unused for template deployments.
    pub instance_count: u32,
}

/// A compute machine image catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineImage {
    /// Machine image identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Machine image name.
    #[serde(default)]
    pub name: String,
}

/// A cluster record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Cluster identifier.
    #[serde(rename = "_id")]
    pub id: String,
    /// Cluster name.
    #[serde(default)]
    pub name: String,
    /// Cluster URL.
    #[serde(default)]
    pub url: String,
}

/// An event delivered on the deployment subscription stream.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentEvent {
    /// Numeric event classifier; 2 is terminal success, 3 terminal failure.
    #[serde(rename = "type")]
    pub kind: i64,
    /// Event payload; only meaningful on terminal success.
    #[serde(default)]
    pub data: DeploymentEventData,
    /// Session (correlation token) the event belongs to.
    #[serde(default)]
    pub session: String,
}

/// Payload of a terminal deployment success event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEventData {
    /// Deployment status string.
    #[serde(default)]
    pub deployment_status: String,
    /// Preview URL assigned to the deployment.
    #[serde(default)]
    pub latest_url_preview: String,
    /// Host the provider exposes the deployment on.
    #[serde(default)]
    pub provider_host: String,
    /// Port mappings with remote-assigned exposed ports.
    #[serde(default)]
    pub ports: Vec<WirePort>,
}
