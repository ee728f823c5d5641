use std::sync::Arc;
use storefront_client::{
    api::ApiClient,
    config::AppConfig,
    navigator::ConsoleNavigator,
    oidc::KeycloakProvider,
    pages,
    routes::{self, Navigation},
};
use storefront_session::{RefreshScheduler, RequestAuthenticator, SessionManager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("failed to load configuration");
    tracing::info!(realm = %config.keycloak.realm(), "Loaded configuration");

    tracing::info!("Discovering identity provider...");
    let provider = KeycloakProvider::discover(config.keycloak.clone(), ConsoleNavigator)
        .await
        .expect("failed to discover identity provider");

    let session = Arc::new(SessionManager::new(provider, config.keycloak.clone()));

    // No route renders before the handshake resolves.
    let authenticated = session.initialize().await;
    tracing::info!(authenticated, user = %session.username(), "Session initialized");

    let scheduler = RefreshScheduler::new(Arc::clone(&session)).spawn();

    let api = ApiClient::new(
        config.api_gateway_url.clone(),
        RequestAuthenticator::new(session.token_store()),
    )
    .expect("failed to create API client");

    let path = std::env::args().nth(1).unwrap_or_else(|| "/".to_string());
    match routes::navigate(session.as_ref(), &path) {
        Navigation::Rendered(route) => match pages::render(route, session.as_ref(), &api).await {
            Ok(page) => println!("{page}"),
            Err(e) => tracing::error!(error = %e, path = route.path(), "Failed to render page"),
        },
        Navigation::Blocked(path) => {
            tracing::warn!(%path, "Navigation blocked");
        }
    }

    tracing::info!("Press Ctrl-C to log out");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
    }

    scheduler.abort();
    session.logout().await;
    tracing::info!("Logged out");
}
