//! Navigation guards.
//!
//! Guards decide whether a route may be activated from a synchronous read
//! of the session. They never start a login or touch the provider.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Route a non-admin user is sent to when opening an admin-only route.
pub const FORBIDDEN_ROUTE: &str = "/forbidden";

/// Read-only view of the session used by guards.
pub trait SessionView {
    /// Returns true if a usable credential is held.
    fn is_authenticated(&self) -> bool;

    /// Returns true if the user holds `ADMIN`.
    fn is_admin(&self) -> bool;
}

/// Result of running a guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "target", rename_all = "snake_case")]
pub enum GuardOutcome {
    /// Navigation proceeds.
    Allow,
    /// Navigation is cancelled in place.
    Deny,
    /// Navigation is cancelled and replaced with a navigation to the target.
    DenyWithRedirect(String),
}

impl GuardOutcome {
    /// Returns true if navigation may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Access requirement attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// No requirement.
    Public,
    /// Requires an authenticated session.
    Authenticated,
    /// Requires an authenticated session holding `ADMIN`.
    Admin,
}

impl Guard {
    /// Runs the guard against `session`.
    pub fn check(&self, session: &impl SessionView) -> GuardOutcome {
        match self {
            Self::Public => GuardOutcome::Allow,
            Self::Authenticated => auth_guard(session),
            Self::Admin => admin_guard(session),
        }
    }
}

/// Allows navigation only for an authenticated session.
///
/// Denial does not trigger a login; in `login-required` mode an
/// unauthenticated session only exists after the provider failed.
pub fn auth_guard(session: &impl SessionView) -> GuardOutcome {
    if session.is_authenticated() {
        GuardOutcome::Allow
    } else {
        debug!("auth guard denied navigation");
        GuardOutcome::Deny
    }
}

/// Allows navigation only for an authenticated admin.
///
/// An authenticated user without `ADMIN` is redirected to
/// [`FORBIDDEN_ROUTE`]; an unauthenticated session is denied without a
/// redirect.
pub fn admin_guard(session: &impl SessionView) -> GuardOutcome {
    if !session.is_authenticated() {
        debug!("admin guard denied unauthenticated navigation");
        return GuardOutcome::Deny;
    }
    if session.is_admin() {
        GuardOutcome::Allow
    } else {
        debug!(target_route = FORBIDDEN_ROUTE, "admin guard redirecting non-admin");
        GuardOutcome::DenyWithRedirect(FORBIDDEN_ROUTE.to_string())
    }
}
