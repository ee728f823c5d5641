//! Route table and guarded navigation.
//!
//! Each route carries a [`Guard`]. Navigation evaluates it and follows
//! redirect outcomes; the guard itself never navigates.

use serde::Serialize;
use storefront_session::{FORBIDDEN_ROUTE, Guard, GuardOutcome, SessionView};
use tracing::{debug, warn};

/// Upper bound on redirects followed by a single navigation.
pub const MAX_REDIRECTS: usize = 4;

/// Application routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Landing page at `/`, for any signed-in user.
    Home,
    /// Product catalogue, for any signed-in user.
    Products,
    /// The signed-in user's own orders.
    Orders,
    /// Every customer's orders. Admin only.
    AdminOrders,
    /// Where non-admins land after opening an admin route. Always reachable.
    Forbidden,
}

impl Route {
    /// Every route, in table order.
    pub const ALL: [Route; 5] = [
        Route::Home,
        Route::Products,
        Route::Orders,
        Route::AdminOrders,
        Route::Forbidden,
    ];

    /// Returns the route's path.
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Products => "/products",
            Self::Orders => "/orders",
            Self::AdminOrders => "/admin/orders",
            Self::Forbidden => FORBIDDEN_ROUTE,
        }
    }

    /// Returns the guard protecting the route.
    #[must_use]
    pub fn guard(&self) -> Guard {
        match self {
            Self::Home | Self::Products | Self::Orders => Guard::Authenticated,
            Self::AdminOrders => Guard::Admin,
            Self::Forbidden => Guard::Public,
        }
    }

    /// Looks up the route for `path`, ignoring any query and trailing slash.
    #[must_use]
    pub fn resolve(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let normalized = if trimmed.is_empty() { "/" } else { trimmed };
        Self::ALL.into_iter().find(|route| route.path() == normalized)
    }
}

/// Result of a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// The route was activated.
    Rendered(Route),
    /// Navigation was cancelled at `path`.
    Blocked(String),
}

/// Navigates to `path`, following guard redirects.
///
/// Unknown paths redirect to `/`.
pub fn navigate(session: &impl SessionView, path: &str) -> Navigation {
    let mut current = path.to_string();
    for _ in 0..=MAX_REDIRECTS {
        let Some(route) = Route::resolve(&current) else {
            debug!(path = %current, "unknown route, redirecting home");
            current = Route::Home.path().to_string();
            continue;
        };

        match route.guard().check(session) {
            GuardOutcome::Allow => {
                debug!(path = route.path(), "navigation allowed");
                return Navigation::Rendered(route);
            }
            GuardOutcome::Deny => {
                debug!(path = route.path(), "navigation denied");
                return Navigation::Blocked(current);
            }
            GuardOutcome::DenyWithRedirect(target) => {
                debug!(path = route.path(), %target, "navigation redirected");
                current = target;
            }
        }
    }

    warn!(path, "too many redirects, navigation cancelled");
    Navigation::Blocked(current)
}
