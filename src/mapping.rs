//! Conversions between resource models and wire shapes.
//!
//! The remote API speaks in merged `KEY=VALUE` environment strings,
//! Gi-suffixed sizes, and opaque storage class codes. This module holds
//! the pure transforms in both directions plus the catalog lookup
//! helpers, so the reconcilers stay free of encoding detail.

use std::collections::HashMap;

use crate::api::types::{
    Domain, DeploymentVariable, InstanceOrder, MachineImage, MarketplaceApp, TemplateVariable,
    WireEnv, WirePersistentStorage, WirePort,
};
use crate::error::{NotFoundError, Result, ValidationError};
use crate::resources::model::{EnvVar, PersistentStorageConfig, PortBinding, StorageClass};

/// Exposed port that the platform fronts with the preview URL.
const HTTP_EXPOSED_PORT: u16 = 80;

/// Maps port bindings to the wire. An unset exposed port defaults to the
/// container port.
#[must_use]
pub fn ports_to_wire(ports: &[PortBinding]) -> Vec<WirePort> {
    ports
        .iter()
        .map(|p| WirePort {
            container_port: p.container_port,
            exposed_port: match p.exposed_port {
                Some(exposed) if exposed != 0 => exposed,
                _ => p.container_port,
            },
        })
        .collect()
}

/// Maps wire ports back to bindings, keeping the remote-assigned
/// exposed ports.
#[must_use]
pub fn ports_from_wire(ports: &[WirePort]) -> Vec<PortBinding> {
    ports
        .iter()
        .map(|p| PortBinding {
            container_port: p.container_port,
            exposed_port: Some(p.exposed_port),
        })
        .collect()
}

/// Merges plain and secret variables into the wire encoding.
#[must_use]
pub fn env_to_wire(plain: &[EnvVar], secret: &[EnvVar]) -> Vec<WireEnv> {
    let encode = |vars: &[EnvVar], is_secret: bool| {
        vars.iter()
            .map(|v| WireEnv {
                value: format!("{}={}", v.key, v.value),
                is_secret,
            })
            .collect::<Vec<_>>()
    };

    let mut wire = encode(plain, false);
    wire.extend(encode(secret, true));
    wire
}

/// Splits wire variables back into plain and secret buckets. The value
/// splits on the first `=`; values may themselves contain `=`.
#[must_use]
pub fn env_from_wire(wire: &[WireEnv]) -> (Vec<EnvVar>, Vec<EnvVar>) {
    let mut plain = Vec::new();
    let mut secret = Vec::new();

    for entry in wire {
        let (key, value) = entry
            .value
            .split_once('=')
            .unwrap_or((entry.value.as_str(), ""));
        let var = EnvVar::new(key, value);
        if entry.is_secret {
            secret.push(var);
        } else {
            plain.push(var);
        }
    }

    (plain, secret)
}

/// Formats a size as the Gi-suffixed wire string.
#[must_use]
pub fn gi(size: u32) -> String {
    format!("{size}Gi")
}

/// Parses a Gi-suffixed wire string. The suffix is the last two
/// characters, whatever they are.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidStorageSize`] if the string is too
/// short or the prefix is not a number.
pub fn parse_gi(value: &str) -> Result<u32> {
    let invalid = || ValidationError::InvalidStorageSize {
        value: value.to_string(),
    };

    if value.chars().count() < 3 {
        return Err(invalid().into());
    }

    let cut = value
        .char_indices()
        .rev()
        .nth(1)
        .map_or(0, |(index, _)| index);
    value[..cut].parse().map_err(|_| invalid().into())
}

/// Wire code for a storage class.
#[must_use]
pub const fn storage_class_code(class: StorageClass) -> &'static str {
    match class {
        StorageClass::Hdd => "beta1",
        StorageClass::Ssd => "beta2",
        StorageClass::Nvme => "beta3",
    }
}

/// Resolves a wire storage class code.
///
/// # Errors
///
/// Returns [`ValidationError::UnsupportedStorageClass`] for codes outside
/// the known set.
pub fn storage_class_from_code(code: &str) -> Result<StorageClass> {
    match code {
        "beta1" => Ok(StorageClass::Hdd),
        "beta2" => Ok(StorageClass::Ssd),
        "beta3" => Ok(StorageClass::Nvme),
        other => Err(ValidationError::UnsupportedStorageClass {
            class: other.to_string(),
        }
        .into()),
    }
}

/// Maps a persistent storage config to the wire.
#[must_use]
pub fn persistent_storage_to_wire(storage: &PersistentStorageConfig) -> WirePersistentStorage {
    WirePersistentStorage {
        class: storage_class_code(storage.class).to_string(),
        mount_point: storage.mount_point.clone(),
        size: gi(storage.size_gi),
    }
}

/// Resolves the public URL of a deployment for a container port.
///
/// Deployments exposed on port 80 are fronted by the platform preview
/// URL; everything else is reached directly on the provider host.
///
/// # Errors
///
/// Returns [`NotFoundError::PortNotExposed`] when the order does not
/// expose the container port.
pub fn deployment_url(order: &InstanceOrder, container_port: u16) -> Result<String> {
    let ports = order
        .cluster_instance_configuration
        .as_ref()
        .map(|c| c.ports.as_slice())
        .unwrap_or_default();

    let port = ports
        .iter()
        .find(|p| p.container_port == container_port)
        .ok_or(NotFoundError::PortNotExposed { container_port })?;

    if port.exposed_port == HTTP_EXPOSED_PORT && !order.url_preview.is_empty() {
        return Ok(order.url_preview.clone());
    }

    let host = order
        .protocol_data
        .as_ref()
        .map(|d| d.provider_host.as_str())
        .unwrap_or_default();

    Ok(format!("{host}:{}", port.exposed_port))
}

/// Finds a machine image by name in the catalog.
///
/// # Errors
///
/// Returns [`NotFoundError::MachineImage`] when absent.
pub fn find_machine_image<'a>(images: &'a [MachineImage], name: &str) -> Result<&'a MachineImage> {
    images.iter().find(|i| i.name == name).ok_or_else(|| {
        NotFoundError::MachineImage {
            name: name.to_string(),
        }
        .into()
    })
}

/// Finds a marketplace app by name in the catalog.
///
/// # Errors
///
/// Returns [`NotFoundError::Template`] when absent.
pub fn find_marketplace_app<'a>(
    apps: &'a [MarketplaceApp],
    name: &str,
) -> Result<&'a MarketplaceApp> {
    apps.iter().find(|a| a.name == name).ok_or_else(|| {
        NotFoundError::Template {
            name: name.to_string(),
        }
        .into()
    })
}

/// Finds a domain by id in an instance's domain list.
///
/// # Errors
///
/// Returns [`NotFoundError::Domain`] when absent.
pub fn find_domain_by_id<'a>(domains: &'a [Domain], id: &str) -> Result<&'a Domain> {
    domains.iter().find(|d| d.id == id).ok_or_else(|| {
        NotFoundError::Domain { id: id.to_string() }.into()
    })
}

/// Resolves the variables a template declares against user-provided
/// values, falling back to template defaults.
///
/// # Errors
///
/// Returns [`ValidationError::MissingTemplateVariables`] naming every
/// required variable that resolved to empty.
pub fn resolve_template_variables(
    declared: &[TemplateVariable],
    provided: &[EnvVar],
) -> Result<Vec<DeploymentVariable>> {
    let by_name: HashMap<&str, &str> = provided
        .iter()
        .map(|v| (v.key.as_str(), v.value.as_str()))
        .collect();

    let mut resolved = Vec::new();
    let mut missing = Vec::new();

    for variable in declared {
        let value = by_name
            .get(variable.name.as_str())
            .copied()
            .filter(|v| !v.is_empty())
            .unwrap_or(variable.default_value.as_str());

        if value.is_empty() {
            if variable.required {
                missing.push(variable.name.clone());
            }
            continue;
        }

        resolved.push(DeploymentVariable {
            label: variable.label.clone(),
            value: value.to_string(),
        });
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(ValidationError::MissingTemplateVariables { names: missing }.into())
    }
}
