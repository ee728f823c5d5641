//! Domain error types for client operations.
//!
//! Session and provider failures live in `storefront_session::error`; this
//! module covers the shell around them.

use std::fmt;

/// Errors from the application shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The identity provider could not be discovered.
    Discovery { details: String },
    /// The gateway answered with a non-success status.
    Api { status: u16 },
    /// The request could not be built or sent.
    Http { details: String },
    /// The response body could not be decoded.
    Decode { details: String },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Discovery { details } => {
                write!(f, "identity provider discovery failed: {details}")
            }
            Self::Api { status } => write!(f, "gateway returned status {status}"),
            Self::Http { details } => write!(f, "request failed: {details}"),
            Self::Decode { details } => write!(f, "failed to decode response: {details}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config {
            details: err.to_string(),
        }
    }
}
