//! Centralized client configuration.
//!
//! This module provides strongly-typed configuration for the client,
//! loaded via the `config` crate from environment variables.
//!
//! See [`KeycloakConfig`] for identity provider configuration.

use serde::Deserialize;
use storefront_session::KeycloakConfig;

/// Client configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the API gateway fronting the backend services.
    #[serde(default = "default_api_gateway_url")]
    pub api_gateway_url: String,

    /// Identity provider configuration.
    #[serde(default)]
    pub keycloak: KeycloakConfig,
}

fn default_api_gateway_url() -> String {
    "http://localhost:8888".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_gateway_url: default_api_gateway_url(),
            keycloak: KeycloakConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment variables.
    ///
    /// Nested keys use `__`, e.g. `KEYCLOAK__REALM`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default().separator("__").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}
