//! Page rendering.
//!
//! Pages render to plain text. Only routes a guard has allowed reach this
//! module.

use rootcause::prelude::Report;
use storefront_session::{IdentityProvider, SessionManager};

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::routes::Route;

/// Returns the role badge shown next to the user's name.
pub fn role_badge<P: IdentityProvider>(session: &SessionManager<P>) -> &'static str {
    if session.is_admin() { "ADMIN" } else { "CLIENT" }
}

/// Renders `route` for the current session.
///
/// # Errors
///
/// Returns the API error if a page's data cannot be fetched.
pub async fn render<P: IdentityProvider>(
    route: Route,
    session: &SessionManager<P>,
    api: &ApiClient,
) -> Result<String, Report<ClientError>> {
    let page = match route {
        Route::Home => format!(
            "Welcome, {} <{}> [{}]",
            session.full_name(),
            session.email(),
            role_badge(session)
        ),
        Route::Products => {
            let products = api.products().await?;
            format!("{} products", products.len())
        }
        Route::Orders => {
            let orders = api.orders().await?;
            format!("{} orders for {}", orders.len(), session.username())
        }
        Route::AdminOrders => {
            let orders = api.orders().await?;
            format!("{} orders (all customers)", orders.len())
        }
        Route::Forbidden => "Access denied: this page requires the ADMIN role.".to_string(),
    };
    Ok(page)
}
