//! Credential storage.
//!
//! The token store holds at most one [`Credential`]. A credential is
//! immutable once built; renewal swaps in a whole new `Arc<Credential>`,
//! so the raw token, claims, and expiry always change together.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

use crate::claims::Claims;
use crate::error::SessionError;

/// Raw tokens returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// The bearer access token.
    pub access_token: String,
    /// Refresh token, if the provider issued one.
    pub refresh_token: Option<String>,
    /// ID token, if the provider issued one.
    pub id_token: Option<String>,
}

impl TokenSet {
    /// Creates a token set with only an access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }
}

/// A validated access token together with its decoded claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    raw_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
    claims: Claims,
}

impl Credential {
    /// Decodes a token set into a credential, rejecting tokens already past
    /// their expiry at `now`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidToken` if the access token cannot be
    /// decoded, or `SessionError::TokenExpired` if it has already expired.
    pub fn from_tokens(
        tokens: TokenSet,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let claims = Claims::decode(&tokens.access_token, client_id)?;
        if claims.is_expired_at(now) {
            return Err(SessionError::TokenExpired);
        }

        Ok(Self {
            raw_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            id_token: tokens.id_token,
            claims,
        })
    }

    /// Returns the raw bearer token.
    #[must_use]
    pub fn raw_token(&self) -> &str {
        &self.raw_token
    }

    /// Returns the refresh token, if present.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns the ID token, if present.
    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Returns the decoded claims.
    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Returns when the access token expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at()
    }
}

/// Holds the current credential, if any.
///
/// Reads are synchronous snapshots. Writes are reserved to the session
/// manager.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<Arc<Credential>>>,
}

impl TokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current credential.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the current raw bearer token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.current().map(|c| c.raw_token().to_string())
    }

    /// Returns true if a credential is stored.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.current().is_some()
    }

    /// Returns the expiry of the current credential.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current().map(|c| c.expires_at())
    }

    /// Returns true if the stored credential expires within `window` of `now`.
    ///
    /// An empty store counts as expiring.
    #[must_use]
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.current()
            .is_none_or(|c| c.claims().expires_within(window, now))
    }

    /// Replaces the credential in a single write.
    pub(crate) fn replace(&self, credential: Credential) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(credential));
    }

    /// Removes the credential, returning what was stored.
    pub(crate) fn clear(&self) -> Option<Arc<Credential>> {
        self.current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::access_token;

    const CLIENT: &str = "storefront-frontend";

    fn credential(expires_in: Duration) -> Credential {
        let tokens = TokenSet::new(access_token("alice", &["CLIENT"], &[], expires_in))
            .with_refresh_token("refresh-1");
        Credential::from_tokens(tokens, CLIENT, Utc::now()).expect("credential")
    }

    #[test]
    fn credential_keeps_raw_tokens() {
        let tokens = TokenSet::new(access_token("alice", &[], &[], Duration::minutes(5)))
            .with_refresh_token("refresh-1")
            .with_id_token("id-1");
        let raw = tokens.access_token.clone();

        let credential = Credential::from_tokens(tokens, CLIENT, Utc::now()).expect("credential");

        assert_eq!(credential.raw_token(), raw);
        assert_eq!(credential.refresh_token(), Some("refresh-1"));
        assert_eq!(credential.id_token(), Some("id-1"));
        assert_eq!(credential.claims().username(), "alice");
    }

    #[test]
    fn credential_rejects_expired_token() {
        let tokens = TokenSet::new(access_token("alice", &[], &[], Duration::seconds(-10)));

        let err = Credential::from_tokens(tokens, CLIENT, Utc::now()).unwrap_err();

        assert_eq!(err, SessionError::TokenExpired);
    }

    #[test]
    fn empty_store_has_no_token() {
        let store = TokenStore::new();
        assert!(!store.is_present());
        assert_eq!(store.token(), None);
        assert_eq!(store.expires_at(), None);
        assert!(store.expires_within(Duration::seconds(30), Utc::now()));
    }

    #[test]
    fn replace_swaps_whole_credential() {
        let store = TokenStore::new();
        let first = credential(Duration::minutes(1));
        let second = credential(Duration::minutes(10));
        let second_token = second.raw_token().to_string();

        store.replace(first);
        let before = store.current().expect("stored");
        store.replace(second);

        assert_eq!(store.token(), Some(second_token));
        // Earlier snapshots are unaffected by the swap.
        assert!(before.expires_at() < store.expires_at().expect("expiry"));
    }

    #[test]
    fn clear_empties_store() {
        let store = TokenStore::new();
        store.replace(credential(Duration::minutes(5)));

        let cleared = store.clear();

        assert!(cleared.is_some());
        assert!(!store.is_present());
        assert!(store.clear().is_none());
    }

    #[test]
    fn expires_within_tracks_window() {
        let store = TokenStore::new();
        store.replace(credential(Duration::minutes(5)));

        assert!(!store.expires_within(Duration::seconds(30), Utc::now()));
        assert!(store.expires_within(Duration::minutes(10), Utc::now()));
    }
}
