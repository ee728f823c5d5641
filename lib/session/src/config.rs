//! Identity provider configuration.
//!
//! This module provides the configuration for connecting to the Keycloak
//! realm that authenticates storefront users. The values select protocol
//! parameters (issuer, client, redirect) and carry no other logic.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// The smallest minimum-validity window the provider contract allows.
pub const MIN_VALIDITY_FLOOR_SECONDS: i64 = 30;

/// Configuration for the Keycloak identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server (e.g., "http://localhost:8080").
    #[serde(default = "default_url")]
    url: String,
    /// The realm users authenticate against.
    #[serde(default = "default_realm")]
    realm: String,
    /// The public client registered for this application.
    #[serde(default = "default_client_id")]
    client_id: String,
    /// Origin of the application; logout returns here.
    #[serde(default = "default_app_origin")]
    app_origin: String,
    /// Path on the application origin that receives the authorization code.
    #[serde(default = "default_redirect_path")]
    redirect_path: String,
    /// OAuth2 scopes to request as a comma-separated string.
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Seconds of remaining validity below which a token is renewed.
    #[serde(default = "default_min_validity_seconds")]
    min_validity_seconds: i64,
}

fn default_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_realm() -> String {
    "microservices-realm".to_string()
}

fn default_client_id() -> String {
    "storefront-frontend".to_string()
}

fn default_app_origin() -> String {
    "http://localhost:4200".to_string()
}

fn default_redirect_path() -> String {
    "/".to_string()
}

fn default_scopes() -> String {
    "openid,profile,email".to_string()
}

fn default_min_validity_seconds() -> i64 {
    MIN_VALIDITY_FLOOR_SECONDS
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            realm: default_realm(),
            client_id: default_client_id(),
            app_origin: default_app_origin(),
            redirect_path: default_redirect_path(),
            scopes: default_scopes(),
            min_validity_seconds: default_min_validity_seconds(),
        }
    }
}

impl KeycloakConfig {
    /// Creates a configuration with defaults for optional fields.
    #[must_use]
    pub fn new(url: String, realm: String, client_id: String) -> Self {
        Self {
            url,
            realm,
            client_id,
            ..Self::default()
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(url: String, realm: String, client_id: String) -> KeycloakConfigBuilder {
        KeycloakConfigBuilder::new(url, realm, client_id)
    }

    /// Returns the Keycloak base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the realm name.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the application origin.
    #[must_use]
    pub fn app_origin(&self) -> &str {
        self.app_origin.trim_end_matches('/')
    }

    /// Returns the OIDC issuer URL for the realm.
    #[must_use]
    pub fn issuer_url(&self) -> String {
        format!("{}/realms/{}", self.url.trim_end_matches('/'), self.realm)
    }

    /// Returns the redirect URI the provider sends the authorization code to.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        let path = self.redirect_path.trim_start_matches('/');
        format!("{}/{path}", self.app_origin())
    }

    /// Returns the path component of the redirect URI.
    #[must_use]
    pub fn redirect_path(&self) -> String {
        format!("/{}", self.redirect_path.trim_start_matches('/'))
    }

    /// Returns the realm's end-session endpoint.
    #[must_use]
    pub fn end_session_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/logout", self.issuer_url())
    }

    /// Returns the browser URL that ends the provider session and comes back
    /// to `redirect_uri`.
    #[must_use]
    pub fn end_session_url(&self, redirect_uri: &str, id_token_hint: Option<&str>) -> String {
        let mut url = format!(
            "{}?client_id={}&post_logout_redirect_uri={}",
            self.end_session_endpoint(),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
        );
        if let Some(hint) = id_token_hint {
            url.push_str("&id_token_hint=");
            url.push_str(&urlencoding::encode(hint));
        }
        url
    }

    /// Returns the OAuth2 scopes to request, parsed from comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the minimum validity window, never below the provider floor.
    #[must_use]
    pub fn min_validity(&self) -> Duration {
        Duration::seconds(self.min_validity_seconds.max(MIN_VALIDITY_FLOOR_SECONDS))
    }
}

/// Builder for `KeycloakConfig`.
#[derive(Debug)]
pub struct KeycloakConfigBuilder {
    config: KeycloakConfig,
    scopes: Vec<String>,
}

impl KeycloakConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(url: String, realm: String, client_id: String) -> Self {
        Self {
            config: KeycloakConfig::new(url, realm, client_id),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
        }
    }

    /// Sets the application origin.
    #[must_use]
    pub fn app_origin(mut self, origin: String) -> Self {
        self.config.app_origin = origin;
        self
    }

    /// Sets the redirect path on the application origin.
    #[must_use]
    pub fn redirect_path(mut self, path: String) -> Self {
        self.config.redirect_path = path;
        self
    }

    /// Adds a scope to the list of scopes to request.
    #[must_use]
    pub fn add_scope(mut self, scope: String) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// Sets the minimum validity window in seconds.
    #[must_use]
    pub fn min_validity_seconds(mut self, seconds: i64) -> Self {
        self.config.min_validity_seconds = seconds;
        self
    }

    /// Builds the `KeycloakConfig`.
    #[must_use]
    pub fn build(mut self) -> KeycloakConfig {
        self.config.scopes = self.scopes.join(",");
        self.config
    }
}
