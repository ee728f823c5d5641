//! Session and access control for the storefront client.
//!
//! This crate provides:
//! - Credential storage (`TokenStore`, `Credential`)
//! - The session lifecycle (`SessionManager`, `SessionState`)
//! - Background renewal (`RefreshScheduler`)
//! - Bearer token attachment (`RequestAuthenticator`, `AuthLayer`)
//! - Route guards (`auth_guard`, `admin_guard`)
//!
//! # Session Model
//!
//! Authentication is delegated to a Keycloak realm through the
//! [`IdentityProvider`] trait. The session manager is the single writer of
//! session state; guards and the authenticator only read it.
//!
//! # Example
//!
//! ```
//! use storefront_session::{GuardOutcome, SessionView, admin_guard, auth_guard};
//!
//! struct Customer;
//!
//! impl SessionView for Customer {
//!     fn is_authenticated(&self) -> bool {
//!         true
//!     }
//!
//!     fn is_admin(&self) -> bool {
//!         false
//!     }
//! }
//!
//! assert_eq!(auth_guard(&Customer), GuardOutcome::Allow);
//! assert_eq!(
//!     admin_guard(&Customer),
//!     GuardOutcome::DenyWithRedirect("/forbidden".to_string())
//! );
//! ```

pub mod authenticator;
pub mod claims;
pub mod config;
pub mod error;
pub mod guard;
pub mod provider;
pub mod refresh;
pub mod role;
pub mod session;
pub mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types at crate root
pub use authenticator::{AuthLayer, AuthService, RequestAuthenticator};
pub use claims::Claims;
pub use config::{KeycloakConfig, KeycloakConfigBuilder};
pub use error::{ProviderError, SessionError};
pub use guard::{FORBIDDEN_ROUTE, Guard, GuardOutcome, SessionView, admin_guard, auth_guard};
pub use provider::IdentityProvider;
pub use refresh::{RefreshOutcome, RefreshScheduler};
pub use role::{ROLE_ADMIN, ROLE_CLIENT, RoleSet};
pub use session::{SessionManager, SessionState};
pub use token::{Credential, TokenSet, TokenStore};
