//! Identity claims decoded from an access token.
//!
//! The payload is read without verifying the signature. The backend
//! gateway verifies every token it receives; the client only needs the
//! claims to drive display and navigation decisions.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};

use crate::error::SessionError;
use crate::role::RoleSet;

/// Display name used when the token carries no username.
pub const UNKNOWN_USERNAME: &str = "Unknown";

/// Claims extracted from a Keycloak access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    subject: String,
    preferred_username: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    email: Option<String>,
    realm_roles: BTreeSet<String>,
    client_roles: BTreeSet<String>,
    expires_at: DateTime<Utc>,
    raw: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    #[serde(default)]
    sub: String,
    exp: i64,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    realm_access: Option<RoleClaim>,
    #[serde(default)]
    resource_access: HashMap<String, RoleClaim>,
}

#[derive(Debug, Default, Deserialize)]
struct RoleClaim {
    #[serde(default)]
    roles: Vec<String>,
}

impl Claims {
    /// Decodes the claims of a JWT access token.
    ///
    /// Client roles are read from `resource_access[client_id]`; roles
    /// granted to other clients are ignored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidToken` if the token is not a JWT, the
    /// payload is not base64url JSON, or `exp` is missing or out of range.
    pub fn decode(token: &str, client_id: &str) -> Result<Self, SessionError> {
        // JWT is base64url(header).base64url(payload).signature
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(SessionError::InvalidToken {
                reason: "not a JWT".to_string(),
            });
        }

        let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(parts[1].trim_end_matches('='))
            .map_err(|e| SessionError::InvalidToken {
                reason: format!("payload is not base64url: {e}"),
            })?;

        let raw: JsonValue =
            serde_json::from_slice(&payload_bytes).map_err(|e| SessionError::InvalidToken {
                reason: format!("payload is not JSON: {e}"),
            })?;

        Self::from_payload(raw, client_id)
    }

    /// Builds claims from an already decoded payload.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidToken` if required claims are missing.
    pub fn from_payload(raw: JsonValue, client_id: &str) -> Result<Self, SessionError> {
        let repr: ClaimsRepr =
            serde_json::from_value(raw.clone()).map_err(|e| SessionError::InvalidToken {
                reason: format!("unexpected claims: {e}"),
            })?;

        let expires_at =
            DateTime::from_timestamp(repr.exp, 0).ok_or_else(|| SessionError::InvalidToken {
                reason: format!("exp out of range: {}", repr.exp),
            })?;

        let realm_roles = repr
            .realm_access
            .map(|access| access.roles.into_iter().collect())
            .unwrap_or_default();

        let mut resource_access = repr.resource_access;
        let client_roles = resource_access
            .remove(client_id)
            .map(|access| access.roles.into_iter().collect())
            .unwrap_or_default();

        Ok(Self {
            subject: repr.sub,
            preferred_username: repr.preferred_username,
            given_name: repr.given_name,
            family_name: repr.family_name,
            email: repr.email,
            realm_roles,
            client_roles,
            expires_at,
            raw,
        })
    }

    /// Returns the subject (`sub`) claim.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns `preferred_username`, or `"Unknown"`.
    #[must_use]
    pub fn username(&self) -> &str {
        self.preferred_username
            .as_deref()
            .unwrap_or(UNKNOWN_USERNAME)
    }

    /// Returns the given name, if present.
    #[must_use]
    pub fn given_name(&self) -> Option<&str> {
        self.given_name.as_deref()
    }

    /// Returns the family name, if present.
    #[must_use]
    pub fn family_name(&self) -> Option<&str> {
        self.family_name.as_deref()
    }

    /// Returns "given family", falling back to the username when both are empty.
    #[must_use]
    pub fn full_name(&self) -> String {
        let full = format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or_default(),
            self.family_name.as_deref().unwrap_or_default()
        );
        let full = full.trim();
        if full.is_empty() {
            self.username().to_string()
        } else {
            full.to_string()
        }
    }

    /// Returns the email claim, or an empty string.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }

    /// Returns the realm-level roles.
    #[must_use]
    pub fn realm_roles(&self) -> &BTreeSet<String> {
        &self.realm_roles
    }

    /// Returns the roles scoped to this client.
    #[must_use]
    pub fn client_roles(&self) -> &BTreeSet<String> {
        &self.client_roles
    }

    /// Returns the union of realm and client roles.
    #[must_use]
    pub fn roles(&self) -> RoleSet {
        RoleSet::union(&self.realm_roles, &self.client_roles)
    }

    /// Returns when the token expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if fewer than `window` remain before expiry at `now`.
    #[must_use]
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at - now < window
    }

    /// Returns an arbitrary top-level claim from the payload.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&JsonValue> {
        self.raw.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::token_with_claims;
    use serde_json::json;

    fn sample_payload() -> JsonValue {
        json!({
            "sub": "f1b2c3",
            "exp": 4_102_444_800_i64,
            "preferred_username": "alice",
            "given_name": "Alice",
            "family_name": "Martin",
            "email": "alice@example.com",
            "realm_access": { "roles": ["CLIENT", "offline_access"] },
            "resource_access": {
                "storefront-frontend": { "roles": ["ADMIN"] },
                "account": { "roles": ["manage-account"] }
            }
        })
    }

    #[test]
    fn decode_reads_identity_claims() {
        let token = token_with_claims(&sample_payload());

        let claims = Claims::decode(&token, "storefront-frontend").expect("decode");

        assert_eq!(claims.subject(), "f1b2c3");
        assert_eq!(claims.username(), "alice");
        assert_eq!(claims.full_name(), "Alice Martin");
        assert_eq!(claims.email(), "alice@example.com");
        assert_eq!(claims.expires_at().timestamp(), 4_102_444_800);
    }

    #[test]
    fn decode_unions_realm_and_own_client_roles() {
        let token = token_with_claims(&sample_payload());

        let claims = Claims::decode(&token, "storefront-frontend").expect("decode");
        let roles = claims.roles();

        assert!(roles.has_role("CLIENT"));
        assert!(roles.has_role("ADMIN"));
        assert!(roles.has_role("offline_access"));
        assert!(!roles.has_role("manage-account"));
    }

    #[test]
    fn decode_ignores_roles_of_other_clients() {
        let token = token_with_claims(&sample_payload());

        let claims = Claims::decode(&token, "another-client").expect("decode");

        assert!(claims.client_roles().is_empty());
        assert!(!claims.roles().is_admin());
    }

    #[test]
    fn missing_optional_claims_fall_back() {
        let token = token_with_claims(&json!({ "sub": "x", "exp": 4_102_444_800_i64 }));

        let claims = Claims::decode(&token, "storefront-frontend").expect("decode");

        assert_eq!(claims.username(), "Unknown");
        assert_eq!(claims.full_name(), "Unknown");
        assert_eq!(claims.email(), "");
        assert!(claims.roles().is_empty());
    }

    #[test]
    fn full_name_uses_partial_name() {
        let token = token_with_claims(&json!({
            "exp": 4_102_444_800_i64,
            "preferred_username": "bob",
            "family_name": "Durand"
        }));

        let claims = Claims::decode(&token, "storefront-frontend").expect("decode");

        assert_eq!(claims.full_name(), "Durand");
    }

    #[test]
    fn decode_rejects_non_jwt() {
        let err = Claims::decode("opaque-token", "storefront-frontend").unwrap_err();
        assert!(matches!(err, SessionError::InvalidToken { .. }));
    }

    #[test]
    fn decode_rejects_bad_payload() {
        let err = Claims::decode("aGVhZGVy.%%%.sig", "storefront-frontend").unwrap_err();
        assert!(matches!(err, SessionError::InvalidToken { .. }));
    }

    #[test]
    fn decode_requires_exp() {
        let token = token_with_claims(&json!({ "sub": "x" }));
        let err = Claims::decode(&token, "storefront-frontend").unwrap_err();
        assert!(matches!(err, SessionError::InvalidToken { .. }));
    }

    #[test]
    fn claim_reads_raw_payload() {
        let token = token_with_claims(&sample_payload());
        let claims = Claims::decode(&token, "storefront-frontend").expect("decode");

        assert_eq!(claims.claim("email"), Some(&json!("alice@example.com")));
        assert_eq!(claims.claim("nonexistent"), None);
    }

    #[test]
    fn expiry_windows() {
        let token = token_with_claims(&json!({ "exp": 1_000 }));
        let claims = Claims::decode(&token, "storefront-frontend").expect("decode");
        let at = |secs| DateTime::from_timestamp(secs, 0).expect("timestamp");

        assert!(!claims.is_expired_at(at(999)));
        assert!(claims.is_expired_at(at(1_000)));
        assert!(claims.expires_within(Duration::seconds(30), at(980)));
        assert!(!claims.expires_within(Duration::seconds(30), at(960)));
    }
}
