//! Session lifecycle management.
//!
//! The [`SessionManager`] is the only writer of session state. It performs
//! the provider handshake, installs credentials, renews them, and tears the
//! session down. Everything else (guards, the request authenticator, the
//! refresh scheduler) reads through synchronous accessors.
//!
//! ```text
//! Uninitialized -> Authenticating -> Authenticated | Unauthenticated
//! Authenticated -> Refreshing -> Authenticated | Unauthenticated
//! ```

use chrono::{DateTime, Duration, Utc};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::claims::{Claims, UNKNOWN_USERNAME};
use crate::config::KeycloakConfig;
use crate::error::SessionError;
use crate::guard::SessionView;
use crate::provider::IdentityProvider;
use crate::role::RoleSet;
use crate::token::{Credential, TokenSet, TokenStore};

/// Authentication lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Boot has not started the handshake yet.
    Uninitialized,
    /// The provider handshake is in progress.
    Authenticating,
    /// A valid credential is installed.
    Authenticated,
    /// A renewal is in flight; the previous credential is still in use.
    Refreshing,
    /// No session.
    Unauthenticated,
}

impl SessionState {
    /// Returns true for states in which the held credential may be used.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Refreshing)
    }
}

/// Owns the process-wide session.
pub struct SessionManager<P> {
    provider: P,
    config: KeycloakConfig,
    store: Arc<TokenStore>,
    state: watch::Sender<SessionState>,
    initialized: AtomicBool,
    refresh_lock: Mutex<()>,
}

impl<P: IdentityProvider> SessionManager<P> {
    /// Creates a manager in the `Uninitialized` state.
    #[must_use]
    pub fn new(provider: P, config: KeycloakConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            provider,
            config,
            store: Arc::new(TokenStore::new()),
            state,
            initialized: AtomicBool::new(false),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }

    /// Returns the identity provider client.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns a read handle on the token store.
    #[must_use]
    pub fn token_store(&self) -> Arc<TokenStore> {
        Arc::clone(&self.store)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "session state changed");
        }
    }

    /// Performs the provider handshake.
    ///
    /// Only the first call talks to the provider; later calls return the
    /// current authentication status. Failures are logged and resolve to
    /// `false` with the session `Unauthenticated`.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("session already initialized, skipping handshake");
            return self.is_authenticated();
        }

        self.set_state(SessionState::Authenticating);
        let outcome = match self.provider.init().await {
            Ok(Some(tokens)) => self.install(tokens),
            Ok(None) => {
                info!("identity provider returned without a session");
                Err(SessionError::NotAuthenticated)
            }
            Err(err) => Err(err.into()),
        };
        self.settle(outcome, "session initialization failed")
    }

    /// Runs the interactive login again.
    ///
    /// Returns `true` once a new credential is installed.
    #[instrument(skip(self))]
    pub async fn login(&self) -> bool {
        self.initialized.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Authenticating);
        let outcome = match self.provider.login().await {
            Ok(tokens) => self.install(tokens),
            Err(err) => Err(err.into()),
        };
        self.settle(outcome, "login failed")
    }

    fn install(&self, tokens: TokenSet) -> Result<(), SessionError> {
        let credential = Credential::from_tokens(tokens, self.config.client_id(), Utc::now())?;
        self.store.replace(credential);
        self.set_state(SessionState::Authenticated);
        Ok(())
    }

    fn settle(&self, outcome: Result<(), SessionError>, failure: &str) -> bool {
        match outcome {
            Ok(()) => {
                info!(authenticated = true, "session established");
                true
            }
            Err(err) => {
                self.store.clear();
                self.set_state(SessionState::Unauthenticated);
                if err != SessionError::NotAuthenticated {
                    error!(error = %err, "{failure}");
                }
                info!(authenticated = false, "no session");
                false
            }
        }
    }

    /// Renews the credential unconditionally.
    ///
    /// On failure the session is logged out before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` if there is no session, or
    /// `SessionError::RefreshFailed` if the provider could not renew it.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), Report<SessionError>> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Renews the credential if it expires within `min_validity`.
    ///
    /// `min_validity` is raised to the configured minimum. Returns whether a
    /// renewal happened.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    #[instrument(skip(self))]
    pub async fn update_token(&self, min_validity: Duration) -> Result<bool, Report<SessionError>> {
        let window = min_validity.max(self.config.min_validity());
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated.into());
        }
        if !self.store.expires_within(window, Utc::now()) {
            debug!("token is still valid");
            return Ok(false);
        }

        let _guard = self.refresh_lock.lock().await;
        // A refresh may have completed while waiting for the lock.
        if !self.store.expires_within(window, Utc::now()) {
            return Ok(false);
        }
        self.refresh_locked().await?;
        Ok(true)
    }

    async fn refresh_locked(&self) -> Result<(), Report<SessionError>> {
        let current = match self.store.current() {
            Some(credential) if self.state().is_authenticated() => credential,
            _ => return Err(SessionError::NotAuthenticated.into()),
        };

        self.set_state(SessionState::Refreshing);
        let renewed = match self
            .provider
            .refresh(&current, self.config.min_validity())
            .await
        {
            Ok(tokens) => Credential::from_tokens(tokens, self.config.client_id(), Utc::now()),
            Err(err) => Err(err.into()),
        };

        if self.state() != SessionState::Refreshing {
            // Logged out while the renewal was in flight.
            return Err(SessionError::NotAuthenticated.into());
        }

        match renewed {
            Ok(credential) => {
                let expires_at = credential.expires_at();
                self.store.replace(credential);
                self.set_state(SessionState::Authenticated);
                info!(%expires_at, "token refreshed");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "failed to refresh the token, logging out");
                self.logout().await;
                Err(SessionError::RefreshFailed {
                    reason: err.to_string(),
                }
                .into())
            }
        }
    }

    /// Clears the session and ends the provider session.
    ///
    /// The browser is sent to the end-session endpoint and returns to the
    /// application origin. Provider failures are logged; local state is
    /// cleared regardless.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let previous = self.store.clear();
        self.set_state(SessionState::Unauthenticated);
        info!("session cleared");

        if let Err(err) = self
            .provider
            .logout(previous.as_deref(), self.config.app_origin())
            .await
        {
            warn!(error = %err, "identity provider logout failed");
        }
    }

    /// Returns true iff the state is authenticated and a credential is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated() && self.store.is_present()
    }

    /// Returns the credential, only while authenticated.
    #[must_use]
    pub fn credential(&self) -> Option<Arc<Credential>> {
        if self.state().is_authenticated() {
            self.store.current()
        } else {
            None
        }
    }

    /// Returns the raw bearer token, if any.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.credential().map(|c| c.raw_token().to_string())
    }

    /// Returns the decoded claims, only while authenticated.
    #[must_use]
    pub fn claims(&self) -> Option<Claims> {
        self.credential().map(|c| c.claims().clone())
    }

    /// Returns a top-level claim from the access token.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<JsonValue> {
        self.credential()
            .and_then(|c| c.claims().claim(name).cloned())
    }

    /// Returns the union of realm and client roles; empty when unauthenticated.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        self.credential()
            .map(|c| c.claims().roles())
            .unwrap_or_default()
    }

    /// Returns true if the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles().has_role(role)
    }

    /// Returns true if the user holds `ADMIN`.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles().is_admin()
    }

    /// Returns true if the user holds `CLIENT` or `ADMIN`.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.roles().is_user()
    }

    /// Returns the preferred username, or `"Unknown"`.
    #[must_use]
    pub fn username(&self) -> String {
        self.credential()
            .map_or_else(|| UNKNOWN_USERNAME.to_string(), |c| {
                c.claims().username().to_string()
            })
    }

    /// Returns the user's full name, falling back to the username.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.credential()
            .map_or_else(|| UNKNOWN_USERNAME.to_string(), |c| c.claims().full_name())
    }

    /// Returns the user's email, or an empty string.
    #[must_use]
    pub fn email(&self) -> String {
        self.credential()
            .map(|c| c.claims().email().to_string())
            .unwrap_or_default()
    }

    /// Returns when the current credential should be renewed.
    #[must_use]
    pub fn refresh_deadline(&self) -> Option<DateTime<Utc>> {
        self.credential()
            .map(|c| c.expires_at() - self.config.min_validity())
    }
}

impl<P: IdentityProvider> SessionView for SessionManager<P> {
    fn is_authenticated(&self) -> bool {
        SessionManager::is_authenticated(self)
    }

    fn is_admin(&self) -> bool {
        SessionManager::is_admin(self)
    }
}
