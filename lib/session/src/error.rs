//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ProviderError`: Failures reported by the identity provider client
//! - `SessionError`: Failures in session lifecycle operations

use std::fmt;

/// Errors from identity provider operations.
///
/// These are produced by [`IdentityProvider`](crate::IdentityProvider)
/// implementations and consumed by the session manager, which never lets
/// them escape `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider could not be reached.
    Network { details: String },
    /// The provider refused the request (bad grant, denied login, etc.).
    Rejected { reason: String },
    /// The provider client is misconfigured.
    Configuration { details: String },
    /// A refresh was requested but no refresh token is held.
    NoRefreshToken,
    /// The browser redirect round-trip failed.
    Redirect { details: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { details } => {
                write!(f, "identity provider unreachable: {details}")
            }
            Self::Rejected { reason } => {
                write!(f, "identity provider rejected the request: {reason}")
            }
            Self::Configuration { details } => {
                write!(f, "identity provider misconfigured: {details}")
            }
            Self::NoRefreshToken => {
                write!(f, "no refresh token available")
            }
            Self::Redirect { details } => {
                write!(f, "redirect round-trip failed: {details}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from session lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// There is no authenticated session.
    NotAuthenticated,
    /// The credential could not be decoded.
    InvalidToken { reason: String },
    /// The credential was already past its expiry when received.
    TokenExpired,
    /// Renewing the credential failed; the session has been logged out.
    RefreshFailed { reason: String },
    /// The identity provider reported an error.
    Provider(ProviderError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => {
                write!(f, "session is not authenticated")
            }
            Self::InvalidToken { reason } => {
                write!(f, "invalid token: {reason}")
            }
            Self::TokenExpired => {
                write!(f, "token has expired")
            }
            Self::RefreshFailed { reason } => {
                write!(f, "token refresh failed: {reason}")
            }
            Self::Provider(err) => {
                write!(f, "{err}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_network_display() {
        let err = ProviderError::Network {
            details: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("unreachable"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn provider_error_rejected_display() {
        let err = ProviderError::Rejected {
            reason: "invalid_grant".to_string(),
        };
        assert!(err.to_string().contains("rejected"));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn session_error_refresh_failed_display() {
        let err = SessionError::RefreshFailed {
            reason: "session not active".to_string(),
        };
        assert!(err.to_string().contains("refresh failed"));
        assert!(err.to_string().contains("session not active"));
    }

    #[test]
    fn session_error_wraps_provider_error() {
        let err: SessionError = ProviderError::NoRefreshToken.into();
        assert_eq!(err, SessionError::Provider(ProviderError::NoRefreshToken));
        assert!(err.to_string().contains("no refresh token"));
    }

    #[test]
    fn session_error_not_authenticated_display() {
        let err = SessionError::NotAuthenticated;
        assert!(err.to_string().contains("not authenticated"));
    }
}
