//! Identity provider abstraction.
//!
//! The session manager drives the authentication lifecycle through this
//! trait, so the state machine can run against the real Keycloak client
//! or against [`MockProvider`](crate::testing::MockProvider) without
//! network access.

use async_trait::async_trait;
use chrono::Duration;

use crate::error::ProviderError;
use crate::token::{Credential, TokenSet};

/// Client for an external OIDC identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Performs the boot handshake.
    ///
    /// In `login-required` mode this includes the full redirect round-trip.
    /// Returns `Ok(None)` when the provider completed without establishing
    /// a session.
    async fn init(&self) -> Result<Option<TokenSet>, ProviderError>;

    /// Runs the interactive login again.
    async fn login(&self) -> Result<TokenSet, ProviderError>;

    /// Exchanges the credential's refresh token for a new token set.
    ///
    /// `min_validity` is the window the caller considers too close to expiry.
    async fn refresh(
        &self,
        credential: &Credential,
        min_validity: Duration,
    ) -> Result<TokenSet, ProviderError>;

    /// Ends the provider session and sends the browser to the end-session
    /// endpoint, which returns to `redirect_uri`.
    async fn logout(
        &self,
        credential: Option<&Credential>,
        redirect_uri: &str,
    ) -> Result<(), ProviderError>;
}
