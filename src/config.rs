//! Provider configuration.
//!
//! The provider needs an access token and an API endpoint. The token is
//! usually taken from the `SPHERON_TOKEN` environment variable so it
//! stays out of committed configuration.

use tracing::debug;

use crate::error::{Result, ValidationError};

/// Default Spheron API endpoint.
pub const DEFAULT_API_URL: &str = "https://api-v2.spheron.network";

/// Environment variable holding the access token.
pub const TOKEN_ENV_VAR: &str = "SPHERON_TOKEN";

/// Connection settings for the Spheron API.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Access token. Must be scoped to a single organization.
    pub token: String,
    /// API base URL, without a trailing slash.
    pub api_url: String,
}

impl ProviderConfig {
    /// Creates a configuration with the default API endpoint.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Overrides the API endpoint. A trailing slash is stripped so
    /// request paths can always start with one.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    /// Builds a configuration from the environment.
    ///
    /// Loads a `.env` file if one is present, then reads the token from
    /// `SPHERON_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine; explicit environment still applies.
        if dotenvy::dotenv().is_ok() {
            debug!("loaded environment from .env file");
        }

        let token = std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ValidationError::MissingEnvVar {
                name: TOKEN_ENV_VAR.to_string(),
            })?;

        Ok(Self::new(token))
    }
}
