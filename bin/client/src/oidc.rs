//! Keycloak identity provider using the openidconnect crate.
//!
//! Login runs the authorization code flow with PKCE: the browser is sent to
//! the authorization endpoint, the loopback listener receives the code, and
//! the code is exchanged for tokens. The ID token is verified during the
//! exchange.

use async_trait::async_trait;
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, CsrfToken, EndpointMaybeSet, EndpointNotSet, EndpointSet,
    IssuerUrl, Nonce, OAuth2TokenResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    RefreshToken, Scope, TokenResponse,
};
use rootcause::prelude::Report;
use std::time::Duration;
use storefront_session::{Credential, IdentityProvider, KeycloakConfig, ProviderError, TokenSet};
use tracing::{debug, info, instrument};

use crate::callback::{CALLBACK_TIMEOUT, CallbackListener};
use crate::error::ClientError;
use crate::navigator::Navigator;

/// OIDC client as built from discovered metadata: the authorization endpoint
/// is known, the token and userinfo endpoints may be.
type RealmClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// Secrets of one login attempt, checked when the code comes back.
#[derive(Debug, Clone)]
struct LoginAttempt {
    csrf_token: String,
    pkce_verifier: String,
    nonce: String,
}

/// Keycloak client for the storefront's public OIDC client.
pub struct KeycloakProvider<N> {
    client: RealmClient,
    http_client: reqwest::Client,
    config: KeycloakConfig,
    navigator: N,
    callback_timeout: Duration,
}

impl<N: Navigator> KeycloakProvider<N> {
    /// Creates a provider by discovering the realm's metadata.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` for invalid URLs and
    /// `ClientError::Discovery` if the metadata cannot be fetched.
    pub async fn discover(config: KeycloakConfig, navigator: N) -> Result<Self, Report<ClientError>> {
        let issuer_url = IssuerUrl::new(config.issuer_url()).map_err(|e| ClientError::Config {
            details: format!("invalid issuer URL: {e}"),
        })?;
        let redirect_url = RedirectUrl::new(config.redirect_uri()).map_err(|e| ClientError::Config {
            details: format!("invalid redirect URI: {e}"),
        })?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ClientError::Config {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        let metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| ClientError::Discovery {
                details: e.to_string(),
            })?;
        info!(issuer = %config.issuer_url(), "discovered identity provider");

        // Public client: no secret, PKCE protects the code exchange.
        let client = CoreClient::from_provider_metadata(
            metadata,
            ClientId::new(config.client_id().to_string()),
            None,
        )
        .set_redirect_uri(redirect_url);

        Ok(Self {
            client,
            http_client,
            config,
            navigator,
            callback_timeout: CALLBACK_TIMEOUT,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }

    /// Builds the login redirect along with the secrets needed to finish it.
    fn authorization_url(&self) -> (String, LoginAttempt) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let scopes = self
            .config
            .scopes()
            .into_iter()
            .map(|scope| Scope::new(scope.to_string()));

        let (url, csrf_token, nonce) = self
            .client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .add_scopes(scopes)
            .set_pkce_challenge(pkce_challenge)
            .url();

        let attempt = LoginAttempt {
            csrf_token: csrf_token.into_secret(),
            pkce_verifier: pkce_verifier.into_secret(),
            nonce: nonce.secret().clone(),
        };
        (url.into(), attempt)
    }

    /// Redeems `code` for tokens and checks the ID token against the nonce
    /// sent with the login request.
    async fn exchange_code(&self, code: &str, attempt: &LoginAttempt) -> Result<TokenSet, ProviderError> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| ProviderError::Configuration {
                details: format!("token endpoint error: {e}"),
            })?
            .set_pkce_verifier(PkceCodeVerifier::new(attempt.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::Rejected {
                reason: format!("token exchange failed: {e}"),
            })?;

        let Some(id_token) = response.id_token() else {
            return Err(ProviderError::Rejected {
                reason: "no ID token in response".to_string(),
            });
        };
        id_token
            .claims(
                &self.client.id_token_verifier(),
                &Nonce::new(attempt.nonce.clone()),
            )
            .map_err(|e| ProviderError::Rejected {
                reason: format!("ID token validation failed: {e}"),
            })?;

        Ok(TokenSet {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            id_token: raw_id_token(&response),
        })
    }

    async fn authorize(&self) -> Result<TokenSet, ProviderError> {
        // Bind before redirecting so the callback cannot arrive early.
        let listener = CallbackListener::bind(&self.config.redirect_uri()).await?;
        let (auth_url, attempt) = self.authorization_url();
        self.navigator.navigate(&auth_url);

        let params = listener.wait(self.callback_timeout).await?;
        if params.state != attempt.csrf_token {
            return Err(ProviderError::Redirect {
                details: "state does not match the login request".to_string(),
            });
        }
        debug!("authorization code received");

        self.exchange_code(&params.code, &attempt).await
    }
}

/// Reads the raw ID token from a token response.
fn raw_id_token<TR: serde::Serialize>(token_response: &TR) -> Option<String> {
    serde_json::to_value(token_response)
        .ok()?
        .get("id_token")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl<N: Navigator> IdentityProvider for KeycloakProvider<N> {
    #[instrument(skip(self))]
    async fn init(&self) -> Result<Option<TokenSet>, ProviderError> {
        // login-required: there is no silent check, every boot logs in.
        self.authorize().await.map(Some)
    }

    #[instrument(skip(self))]
    async fn login(&self) -> Result<TokenSet, ProviderError> {
        self.authorize().await
    }

    #[instrument(skip(self, credential))]
    async fn refresh(
        &self,
        credential: &Credential,
        min_validity: chrono::Duration,
    ) -> Result<TokenSet, ProviderError> {
        let refresh_token = credential
            .refresh_token()
            .ok_or(ProviderError::NoRefreshToken)?;
        debug!(min_validity_secs = min_validity.num_seconds(), "refreshing access token");

        let token_response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .map_err(|e| ProviderError::Configuration {
                details: format!("token endpoint error: {e}"),
            })?
            .request_async(&self.http_client)
            .await
            .map_err(|e| ProviderError::Rejected {
                reason: format!("refresh grant failed: {e}"),
            })?;

        Ok(TokenSet {
            access_token: token_response.access_token().secret().clone(),
            // Keycloak may omit a rotated refresh token; keep the old one.
            refresh_token: token_response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| Some(refresh_token.to_string())),
            id_token: raw_id_token(&token_response).or_else(|| credential.id_token().map(str::to_string)),
        })
    }

    #[instrument(skip(self, credential))]
    async fn logout(
        &self,
        credential: Option<&Credential>,
        redirect_uri: &str,
    ) -> Result<(), ProviderError> {
        let mut outcome = Ok(());
        if let Some(refresh_token) = credential.and_then(Credential::refresh_token) {
            let form = [
                ("client_id", self.config.client_id()),
                ("refresh_token", refresh_token),
            ];
            outcome = match self
                .http_client
                .post(self.config.end_session_endpoint())
                .form(&form)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(ProviderError::Rejected {
                    reason: format!("end-session endpoint returned {}", response.status()),
                }),
                Err(e) => Err(ProviderError::Network {
                    details: e.to_string(),
                }),
            };
        }

        let id_token_hint = credential.and_then(Credential::id_token);
        self.navigator
            .navigate(&self.config.end_session_url(redirect_uri, id_token_hint));
        outcome
    }
}
