//! Test doubles for the session subsystem.
//!
//! Compiled for this crate's tests and, behind the `testing` feature, for
//! downstream crates.

use async_trait::async_trait;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{Value as JsonValue, json};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::provider::IdentityProvider;
use crate::token::{Credential, TokenSet};

/// Client ID the helpers put client roles under; matches the default config.
pub const TEST_CLIENT_ID: &str = "storefront-frontend";

/// Builds an unsigned JWT-shaped token carrying `payload`.
#[must_use]
pub fn token_with_claims(payload: &JsonValue) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = engine.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

/// Builds an access token for `username` expiring `expires_in` from now.
#[must_use]
pub fn access_token(
    username: &str,
    realm_roles: &[&str],
    client_roles: &[&str],
    expires_in: Duration,
) -> String {
    let exp = (Utc::now() + expires_in).timestamp();
    token_with_claims(&json!({
        "sub": format!("sub-{username}"),
        "exp": exp,
        "preferred_username": username,
        "email": format!("{username}@example.com"),
        "realm_access": { "roles": realm_roles },
        "resource_access": { TEST_CLIENT_ID: { "roles": client_roles } },
    }))
}

/// Builds a token set with an access token and a refresh token.
#[must_use]
pub fn tokens(
    username: &str,
    realm_roles: &[&str],
    client_roles: &[&str],
    expires_in: Duration,
) -> TokenSet {
    TokenSet::new(access_token(username, realm_roles, client_roles, expires_in))
        .with_refresh_token(format!("refresh-{username}"))
}

/// A recorded call to [`IdentityProvider::logout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutCall {
    /// Whether a credential was handed to the provider.
    pub had_credential: bool,
    /// Where the provider was asked to return the browser.
    pub redirect_uri: String,
}

/// Scripted identity provider.
///
/// `init` returns the configured result once, then `Ok(None)`. `login` and
/// `refresh` pop scripted results; when the refresh script is empty and a
/// renewal lifetime is set, a fresh token for the same user is minted.
#[derive(Debug)]
pub struct MockProvider {
    init_result: Mutex<Option<Result<Option<TokenSet>, ProviderError>>>,
    login_results: Mutex<VecDeque<Result<TokenSet, ProviderError>>>,
    refresh_results: Mutex<VecDeque<Result<TokenSet, ProviderError>>>,
    renew_lifetime: Option<Duration>,
    calls: Mutex<Calls>,
}

#[derive(Debug, Default)]
struct Calls {
    init: usize,
    login: usize,
    refresh: usize,
    logout: Vec<LogoutCall>,
}

impl MockProvider {
    fn with_init(result: Result<Option<TokenSet>, ProviderError>) -> Self {
        Self {
            init_result: Mutex::new(Some(result)),
            login_results: Mutex::new(VecDeque::new()),
            refresh_results: Mutex::new(VecDeque::new()),
            renew_lifetime: None,
            calls: Mutex::new(Calls::default()),
        }
    }

    /// A provider whose handshake yields `tokens`.
    #[must_use]
    pub fn authenticated(tokens: TokenSet) -> Self {
        Self::with_init(Ok(Some(tokens)))
    }

    /// A provider whose handshake completes without a session.
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self::with_init(Ok(None))
    }

    /// A provider whose handshake fails with `error`.
    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        Self::with_init(Err(error))
    }

    /// Queues a result for the next `refresh` call.
    #[must_use]
    pub fn then_refresh(self, result: Result<TokenSet, ProviderError>) -> Self {
        self.refresh_results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(result);
        self
    }

    /// Queues a result for the next `login` call.
    #[must_use]
    pub fn then_login(self, result: Result<TokenSet, ProviderError>) -> Self {
        self.login_results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(result);
        self
    }

    /// Renews tokens for `lifetime` whenever the refresh script is empty.
    #[must_use]
    pub fn renewing(mut self, lifetime: Duration) -> Self {
        self.renew_lifetime = Some(lifetime);
        self
    }

    /// Number of `init` calls.
    #[must_use]
    pub fn init_count(&self) -> usize {
        self.calls().init
    }

    /// Number of `login` calls.
    #[must_use]
    pub fn login_count(&self) -> usize {
        self.calls().login
    }

    /// Number of `refresh` calls.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.calls().refresh
    }

    /// Recorded `logout` calls, oldest first.
    #[must_use]
    pub fn logouts(&self) -> Vec<LogoutCall> {
        self.calls().logout.clone()
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn renew(&self, credential: &Credential, lifetime: Duration) -> TokenSet {
        let claims = credential.claims();
        let realm: Vec<&str> = claims.realm_roles().iter().map(String::as_str).collect();
        let client: Vec<&str> = claims.client_roles().iter().map(String::as_str).collect();
        let generation = self.calls().refresh;
        TokenSet::new(access_token(claims.username(), &realm, &client, lifetime))
            .with_refresh_token(format!("refresh-{}-{generation}", claims.username()))
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn init(&self) -> Result<Option<TokenSet>, ProviderError> {
        self.calls().init += 1;
        self.init_result
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .unwrap_or(Ok(None))
    }

    async fn login(&self) -> Result<TokenSet, ProviderError> {
        self.calls().login += 1;
        self.login_results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderError::Rejected {
                    reason: "no scripted login".to_string(),
                })
            })
    }

    async fn refresh(
        &self,
        credential: &Credential,
        _min_validity: Duration,
    ) -> Result<TokenSet, ProviderError> {
        self.calls().refresh += 1;
        let scripted = self
            .refresh_results
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match (scripted, self.renew_lifetime) {
            (Some(result), _) => result,
            (None, Some(lifetime)) => Ok(self.renew(credential, lifetime)),
            (None, None) => Err(ProviderError::Rejected {
                reason: "no scripted refresh".to_string(),
            }),
        }
    }

    async fn logout(
        &self,
        credential: Option<&Credential>,
        redirect_uri: &str,
    ) -> Result<(), ProviderError> {
        self.calls().logout.push(LogoutCall {
            had_credential: credential.is_some(),
            redirect_uri: redirect_uri.to_string(),
        });
        Ok(())
    }
}
