//! Authenticated client for the API gateway.
//!
//! Every request passes through the [`RequestAuthenticator`] layer before it
//! is sent, so the gateway sees the current bearer token.

use http::{Method, Request};
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use storefront_session::RequestAuthenticator;
use tower::{ServiceBuilder, ServiceExt};
use tracing::{debug, instrument};

use crate::error::ClientError;

/// Product catalogue, routed by the gateway to the product service.
pub const PRODUCTS_PATH: &str = "/product-service/api/products";

/// Orders, routed by the gateway to the order service.
pub const ORDERS_PATH: &str = "/commande-service/api/commandes";

/// HTTP client for the storefront backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    authenticator: RequestAuthenticator,
}

impl ApiClient {
    /// Creates a client for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        authenticator: RequestAuthenticator,
    ) -> Result<Self, Report<ClientError>> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Http {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            authenticator,
        })
    }

    /// Builds an unauthenticated request for `path` on the gateway.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the URL is invalid.
    pub fn request(&self, method: Method, path: &str) -> Result<Request<Vec<u8>>, Report<ClientError>> {
        Request::builder()
            .method(method)
            .uri(format!("{}{path}", self.base_url))
            .body(Vec::new())
            .map_err(|e| {
                ClientError::Http {
                    details: e.to_string(),
                }
                .into()
            })
    }

    /// Authorizes and sends `request`, failing on non-success statuses.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if sending fails and `ClientError::Api`
    /// for a non-success status.
    #[instrument(skip(self, request), fields(uri = %request.uri()))]
    pub async fn send(&self, request: Request<Vec<u8>>) -> Result<reqwest::Response, Report<ClientError>> {
        let http = self.http.clone();
        let service = ServiceBuilder::new()
            .layer(self.authenticator.layer())
            .service_fn(move |request: Request<Vec<u8>>| {
                let http = http.clone();
                async move {
                    let request = reqwest::Request::try_from(request)?;
                    http.execute(request).await
                }
            });

        let response = service.oneshot(request).await.map_err(|e| ClientError::Http {
            details: e.to_string(),
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), "gateway responded");
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
            }
            .into());
        }
        Ok(response)
    }

    /// Fetches `path` and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send), plus `ClientError::Decode` for an
    /// unexpected body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, Report<ClientError>> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        response.json::<T>().await.map_err(|e| {
            ClientError::Decode {
                details: e.to_string(),
            }
            .into()
        })
    }

    /// Lists the product catalogue.
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json).
    pub async fn products(&self) -> Result<Vec<JsonValue>, Report<ClientError>> {
        self.get_json(PRODUCTS_PATH).await
    }

    /// Lists orders visible to the current user.
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json).
    pub async fn orders(&self) -> Result<Vec<JsonValue>, Report<ClientError>> {
        self.get_json(ORDERS_PATH).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use chrono::Duration;
    use serde_json::json;
    use storefront_session::testing::{MockProvider, tokens};
    use storefront_session::{KeycloakConfig, SessionManager};
    use tokio::net::TcpListener;

    async fn guarded(headers: HeaderMap) -> impl IntoResponse {
        match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some(value) if value.starts_with("Bearer ") => {
                (StatusCode::OK, Json(json!([{ "authorization": value }])))
            }
            _ => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))),
        }
    }

    /// Serves the gateway paths, echoing the authorization header.
    pub(crate) async fn fake_gateway() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let app = Router::new()
            .route(PRODUCTS_PATH, get(guarded))
            .route(ORDERS_PATH, get(guarded))
            .route("/broken", get(|| async { "not json" }));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        base
    }

    pub(crate) async fn session(provider: MockProvider) -> SessionManager<MockProvider> {
        let session = SessionManager::new(provider, KeycloakConfig::default());
        session.initialize().await;
        session
    }

    #[tokio::test]
    async fn authenticated_calls_carry_bearer_token() {
        let base = fake_gateway().await;
        let session = session(MockProvider::authenticated(tokens(
            "alice",
            &["CLIENT"],
            &[],
            Duration::minutes(5),
        )))
        .await;
        let api = ApiClient::new(base, RequestAuthenticator::new(session.token_store()))
            .expect("client");

        let products = api.products().await.expect("products");

        let token = session.token().expect("token");
        assert_eq!(products, vec![json!({ "authorization": format!("Bearer {token}") })]);
    }

    #[tokio::test]
    async fn unauthenticated_calls_are_sent_without_token() {
        let base = fake_gateway().await;
        let session = session(MockProvider::unauthenticated()).await;
        let api = ApiClient::new(base, RequestAuthenticator::new(session.token_store()))
            .expect("client");

        let err = api.orders().await.unwrap_err();

        assert!(err.to_string().contains("gateway returned status 401"));
    }

    #[tokio::test]
    async fn logout_stops_attaching_token() {
        let base = fake_gateway().await;
        let session = session(MockProvider::authenticated(tokens(
            "alice",
            &["CLIENT"],
            &[],
            Duration::minutes(5),
        )))
        .await;
        let api = ApiClient::new(base, RequestAuthenticator::new(session.token_store()))
            .expect("client");
        assert!(api.orders().await.is_ok());

        session.logout().await;

        assert!(api.orders().await.is_err());
    }

    #[tokio::test]
    async fn undecodable_body_is_reported() {
        let base = fake_gateway().await;
        let session = session(MockProvider::unauthenticated()).await;
        let api = ApiClient::new(base, RequestAuthenticator::new(session.token_store()))
            .expect("client");

        let err = api.get_json::<Vec<JsonValue>>("/broken").await.unwrap_err();

        assert!(err.to_string().contains("failed to decode response"));
    }

    #[test]
    fn request_targets_gateway() {
        let api = ApiClient::new(
            "http://localhost:8888/",
            RequestAuthenticator::new(std::sync::Arc::default()),
        )
        .expect("client");

        let request = api.request(Method::GET, PRODUCTS_PATH).expect("request");

        assert_eq!(
            request.uri().to_string(),
            "http://localhost:8888/product-service/api/products"
        );
    }
}
