//! Error types for the Spheron provider library.
//!
//! This module provides the error hierarchy for all operations in the
//! provisioning lifecycle: the API gateway, the deployment event stream,
//! configuration validation, and catalog lookups.

use thiserror::Error;

/// The main error type for the Spheron provider.
#[derive(Debug, Error)]
pub enum SpheronError {
    /// Spheron API gateway errors.
    #[error("Spheron API error: {0}")]
    Api(#[from] ApiError),

    /// Deployment event-stream errors.
    #[error("Deployment error: {0}")]
    Deployment(#[from] DeploymentError),

    /// Configuration validation errors.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Lookup failures for named remote entities.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),
}

/// Errors from the API gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The access token was rejected.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description from the remote API.
        message: String,
    },

    /// The requested path does not exist on the remote side.
    #[error("Not found: {path}")]
    NotFound {
        /// The request path that returned 404.
        path: String,
    },

    /// The remote API rejected the request.
    #[error("{message}")]
    Remote {
        /// Decoded error message, or the HTTP status line when the error
        /// envelope could not be decoded.
        message: String,
    },

    /// Network-level failure (connect, TLS, timeout).
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("Invalid response from Spheron API: {message}")]
    InvalidResponse {
        /// Description of the decode failure.
        message: String,
    },
}

/// Errors from the deployment event stream.
#[derive(Debug, Error)]
pub enum DeploymentError {
    /// The stream delivered a terminal failure event.
    #[error("Deployment failed for topic {topic}")]
    Failed {
        /// Correlation token of the failed deployment.
        topic: String,
    },

    /// The stream ended or errored before a terminal event arrived.
    #[error("Deployment event stream ended without a terminal event: {message}")]
    Stream {
        /// Description of the stream failure.
        message: String,
    },

    /// The caller-imposed deadline elapsed while waiting.
    #[error("Timed out after {elapsed_secs}s waiting for deployment of topic {topic}")]
    TimedOut {
        /// Correlation token that was being waited on.
        topic: String,
        /// Seconds waited before giving up.
        elapsed_secs: u64,
    },
}

/// Configuration validation errors, raised before any remote call.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// One or more required template variables have no value.
    #[error("Missing required deployment variables: {}", names.join(", "))]
    MissingTemplateVariables {
        /// Every required variable name that resolved to empty.
        names: Vec<String>,
    },

    /// A persistent-storage class outside HDD/SSD/NVMe.
    #[error("Storage class {class} is not supported. Supported classes are: HDD, SSD and NVMe.")]
    UnsupportedStorageClass {
        /// The offending class name or wire code.
        class: String,
    },

    /// A storage size string that does not carry a parseable Gi value.
    #[error("Invalid storage size: {value}")]
    InvalidStorageSize {
        /// The offending wire string.
        value: String,
    },

    /// A configuration field failed validation.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of every violated constraint.
        message: String,
    },

    /// A required environment variable is unset.
    #[error("Environment variable {name} is not set")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// Lookup-by-name and lookup-by-id failures.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// No compute machine image with the given name.
    #[error("Machine image not found: {name}")]
    MachineImage {
        /// The requested machine image name.
        name: String,
    },

    /// No marketplace template with the given name.
    #[error("Marketplace app not found: {name}")]
    Template {
        /// The requested template name.
        name: String,
    },

    /// No domain with the given id on the instance.
    #[error("Domain not found: {id}")]
    Domain {
        /// The requested domain id.
        id: String,
    },

    /// The requested container port is not part of the active deployment.
    #[error("No exposed port found for container port {container_port}")]
    PortNotExposed {
        /// The container port that has no exposure.
        container_port: u16,
    },
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, SpheronError>;

impl SpheronError {
    /// Returns true if the error is the remote "already closed" rejection,
    /// which delete paths treat as success.
    #[must_use]
    pub fn is_already_closed(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::Remote { message }) if message == "Instance already closed"
        )
    }
}

impl ApiError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a remote error with the given message.
    #[must_use]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl ValidationError {
    /// Creates a config validation error from collected problems.
    #[must_use]
    pub fn config(problems: &[String]) -> Self {
        Self::Config {
            message: problems.join("; "),
        }
    }
}
