//! Resource models.
//!
//! These are the user-facing shapes of the three managed resources:
//! compute instances, marketplace app deployments, and custom domains.
//! Each config validates itself before any remote call, collecting every
//! violated constraint instead of stopping at the first.

use crate::api::types::DomainType;
use crate::error::{Result, ValidationError};

/// Replica count bounds.
pub const MIN_REPLICAS: u32 = 1;
/// Replica count bounds.
pub const MAX_REPLICAS: u32 = 20;

/// Storage size bounds, in Gi.
pub const MIN_STORAGE_GI: u32 = 1;
/// Storage size bounds, in Gi.
pub const MAX_STORAGE_GI: u32 = 1024;

/// CPU counts the platform accepts for custom plans.
pub const ALLOWED_CPUS: [&str; 7] = ["0.5", "1", "2", "4", "8", "16", "32"];

/// A container-to-exposed port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    /// Port the container listens on.
    pub container_port: u16,
    /// Port the platform exposes it on. Unset means the platform picks;
    /// the create request then carries the container port.
    pub exposed_port: Option<u16>,
}

/// A key/value environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    /// Variable name.
    pub key: String,
    /// Variable value.
    pub value: String,
}

impl EnvVar {
    /// Creates an environment variable.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Health check probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    /// Path to probe, e.g. "/healthz".
    pub path: String,
    /// Container port to probe.
    pub port: u16,
}

/// User-facing persistent storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// Spinning disk.
    Hdd,
    /// Solid state.
    Ssd,
    /// NVMe solid state.
    Nvme,
}

/// Persistent storage attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentStorageConfig {
    /// Storage class.
    pub class: StorageClass,
    /// Mount point inside the container.
    pub mount_point: String,
    /// Size in Gi.
    pub size_gi: u32,
}

/// Desired state of a compute instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    /// Cluster name the instance is created under.
    pub name: String,
    /// Docker image reference.
    pub image: String,
    /// Docker image tag.
    pub tag: String,
    /// Deployment region.
    pub region: String,
    /// Replica count.
    pub replicas: u32,
    /// Port mappings.
    pub ports: Vec<PortBinding>,
    /// Plain environment variables.
    pub env: Vec<EnvVar>,
    /// Secret environment variables, masked by the platform.
    pub secret_env: Vec<EnvVar>,
    /// Container entrypoint command.
    pub commands: Vec<String>,
    /// Container command arguments.
    pub args: Vec<String>,
    /// Named machine image plan. Mutually exclusive with `cpu`/`memory_gi`.
    pub machine_image: Option<String>,
    /// Custom plan CPU count, e.g. "0.5". Paired with `memory_gi`.
    pub cpu: Option<String>,
    /// Custom plan memory in Gi. Paired with `cpu`.
    pub memory_gi: Option<u32>,
    /// Ephemeral storage in Gi.
    pub storage_gi: u32,
    /// Optional persistent storage.
    pub persistent_storage: Option<PersistentStorageConfig>,
    /// Optional health check probe.
    pub health_check: Option<HealthCheckConfig>,
}

impl InstanceConfig {
    /// Validates the configuration, collecting every violated constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Config`] naming all problems.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.image.trim().is_empty() {
            problems.push(String::from("image must not be empty"));
        }

        if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&self.replicas) {
            problems.push(format!(
                "replicas must be between {MIN_REPLICAS} and {MAX_REPLICAS}, got {}",
                self.replicas
            ));
        }

        if !(MIN_STORAGE_GI..=MAX_STORAGE_GI).contains(&self.storage_gi) {
            problems.push(format!(
                "storage must be between {MIN_STORAGE_GI} and {MAX_STORAGE_GI} Gi, got {}",
                self.storage_gi
            ));
        }

        // With neither a named plan nor custom specs, the platform
        // synthesizes a custom plan and the agreed values are read back.
        match (&self.machine_image, &self.cpu, self.memory_gi) {
            (Some(_), None, None) | (None, None, None) => {}
            (Some(_), _, _) => {
                problems.push(String::from(
                    "machine_image cannot be combined with cpu or memory",
                ));
            }
            (None, Some(cpu), Some(_)) => {
                if !ALLOWED_CPUS.contains(&cpu.as_str()) {
                    problems.push(format!(
                        "cpu must be one of {}, got {cpu}",
                        ALLOWED_CPUS.join(", ")
                    ));
                }
            }
            (None, _, _) => {
                problems.push(String::from("cpu and memory must be set together"));
            }
        }

        if let Some(storage) = &self.persistent_storage {
            if !(MIN_STORAGE_GI..=MAX_STORAGE_GI).contains(&storage.size_gi) {
                problems.push(format!(
                    "persistent storage must be between {MIN_STORAGE_GI} and {MAX_STORAGE_GI} Gi, got {}",
                    storage.size_gi
                ));
            }
            if storage.mount_point.trim().is_empty() {
                problems.push(String::from("persistent storage mount point must not be empty"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::config(&problems).into())
        }
    }
}

/// Persisted state of a compute instance: the remote id plus the config
/// as materialized by the platform.
#[derive(Debug, Clone)]
pub struct InstanceState {
    /// Remote instance id.
    pub id: String,
    /// Materialized configuration. Exposed ports and custom plan fields
    /// are filled in from the active deployment.
    pub config: InstanceConfig,
}

/// Desired state of a marketplace app deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketplaceConfig {
    /// Marketplace app name, matched against the remote catalog.
    pub name: String,
    /// Machine image name to deploy on, matched against the catalog.
    pub machine_image: String,
    /// Deployment region; empty means any region.
    pub region: String,
    /// Values for the template-declared variables, keyed by name.
    pub env: Vec<EnvVar>,
}

impl MarketplaceConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Config`] naming all problems.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push(String::from("name must not be empty"));
        }
        if self.machine_image.trim().is_empty() {
            problems.push(String::from("machine_image must not be empty"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::config(&problems).into())
        }
    }
}

/// Persisted state of a marketplace app deployment.
#[derive(Debug, Clone)]
pub struct MarketplaceState {
    /// Remote instance id backing the deployment.
    pub id: String,
    /// Configuration, with the region defaulted when it was empty.
    pub config: MarketplaceConfig,
    /// Port mappings of the active deployment. Empty when the order
    /// could not be fetched.
    pub ports: Vec<PortBinding>,
}

/// Desired state of a custom domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    /// Domain name, e.g. "app.example.com".
    pub name: String,
    /// Whether this is a root domain or a subdomain.
    pub kind: DomainType,
    /// Instance the domain routes to.
    pub instance_id: String,
    /// Container port of the deployment the domain should resolve to.
    pub container_port: u16,
}

impl DomainConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Config`] naming all problems.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push(String::from("name must not be empty"));
        }
        if self.instance_id.trim().is_empty() {
            problems.push(String::from("instance_id must not be empty"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::config(&problems).into())
        }
    }
}

/// Persisted state of a custom domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Remote domain id.
    pub id: String,
    /// Configuration.
    pub config: DomainConfig,
    /// Whether DNS ownership has been verified.
    pub verified: bool,
    /// Deployment link the domain currently points at.
    pub link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> InstanceConfig {
        InstanceConfig {
            name: String::from("web"),
            image: String::from("nginx"),
            tag: String::from("1.25"),
            region: String::from("us-east"),
            replicas: 1,
            ports: vec![PortBinding {
                container_port: 80,
                exposed_port: None,
            }],
            env: vec![],
            secret_env: vec![],
            commands: vec![],
            args: vec![],
            machine_image: Some(String::from("Ventus Small")),
            cpu: None,
            memory_gi: None,
            storage_gi: 10,
            persistent_storage: None,
            health_check: None,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let mut config = base_config();
        config.replicas = 0;
        config.storage_gi = 2000;
        config.cpu = Some(String::from("3"));

        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("replicas"));
        assert!(message.contains("storage"));
        assert!(message.contains("machine_image cannot be combined"));
    }

    #[test]
    fn test_custom_plan_requires_cpu_and_memory_paired() {
        let mut config = base_config();
        config.machine_image = None;
        config.cpu = Some(String::from("2"));
        config.memory_gi = None;
        assert!(config.validate().is_err());

        config.memory_gi = Some(4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_plan_may_be_left_entirely_to_the_platform() {
        let mut config = base_config();
        config.machine_image = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_plan_rejects_unknown_cpu_count() {
        let mut config = base_config();
        config.machine_image = None;
        config.cpu = Some(String::from("3"));
        config.memory_gi = Some(4);
        assert!(config.validate().is_err());
    }
}
