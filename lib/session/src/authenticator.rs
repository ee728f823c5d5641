//! Bearer token attachment for outgoing API requests.

use http::header::{AUTHORIZATION, HeaderValue};
use http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{trace, warn};

use crate::token::TokenStore;

/// Attaches the current access token to requests.
///
/// Reads the token store synchronously and never triggers a renewal. While a
/// renewal is in flight the previous token is still attached.
#[derive(Debug, Clone)]
pub struct RequestAuthenticator {
    store: Arc<TokenStore>,
}

impl RequestAuthenticator {
    /// Creates an authenticator reading from `store`.
    #[must_use]
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self { store }
    }

    /// Returns `request` with an `Authorization: Bearer` header when a token
    /// is held, or unchanged otherwise.
    pub fn authorize<B>(&self, mut request: Request<B>) -> Request<B> {
        let Some(token) = self.store.token() else {
            trace!(token_present = false, "forwarding request without credentials");
            return request;
        };

        match HeaderValue::try_from(format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
                trace!(token_present = true, "attached bearer token");
            }
            Err(_) => {
                warn!("access token is not a valid header value, forwarding without it");
            }
        }
        request
    }

    /// Authorizes `request` and hands it to `next`.
    pub fn intercept<B, R>(&self, request: Request<B>, next: impl FnOnce(Request<B>) -> R) -> R {
        next(self.authorize(request))
    }

    /// Returns a tower layer applying this authenticator.
    #[must_use]
    pub fn layer(&self) -> AuthLayer {
        AuthLayer::new(self.clone())
    }
}

/// Tower layer that authorizes every request passing through it.
#[derive(Debug, Clone)]
pub struct AuthLayer {
    authenticator: RequestAuthenticator,
}

impl AuthLayer {
    /// Creates a layer from an authenticator.
    #[must_use]
    pub fn new(authenticator: RequestAuthenticator) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

/// Service produced by [`AuthLayer`].
#[derive(Debug, Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: RequestAuthenticator,
}

impl<S, B> Service<Request<B>> for AuthService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        self.inner.call(self.authenticator.authorize(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::access_token;
    use crate::token::{Credential, TokenSet};
    use chrono::{Duration, Utc};
    use std::convert::Infallible;
    use tower::{ServiceBuilder, ServiceExt, service_fn};

    fn store_with_token() -> (Arc<TokenStore>, String) {
        let token = access_token("alice", &["CLIENT"], &[], Duration::minutes(5));
        let store = Arc::new(TokenStore::new());
        let credential =
            Credential::from_tokens(TokenSet::new(token.clone()), "storefront-frontend", Utc::now())
                .expect("credential");
        store.replace(credential);
        (store, token)
    }

    fn request() -> Request<()> {
        Request::get("http://localhost:8888/product-service/api/products")
            .body(())
            .expect("request")
    }

    #[test]
    fn attaches_bearer_token() {
        let (store, token) = store_with_token();
        let authenticator = RequestAuthenticator::new(store);

        let authorized = authenticator.authorize(request());

        let header = authorized.headers().get(AUTHORIZATION).expect("header");
        assert_eq!(header.to_str().expect("ascii"), format!("Bearer {token}"));
        assert!(header.is_sensitive());
    }

    #[test]
    fn forwards_unchanged_without_token() {
        let authenticator = RequestAuthenticator::new(Arc::new(TokenStore::new()));
        let mut original = request();
        original
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_static("abc"));

        let forwarded = authenticator.authorize(original);

        assert!(forwarded.headers().get(AUTHORIZATION).is_none());
        assert_eq!(forwarded.headers().len(), 1);
        assert_eq!(forwarded.uri().path(), "/product-service/api/products");
    }

    #[test]
    fn leaves_existing_authorization_header_without_token() {
        let authenticator = RequestAuthenticator::new(Arc::new(TokenStore::new()));
        let mut original = request();
        original
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));

        let forwarded = authenticator.authorize(original);

        let values: Vec<_> = forwarded.headers().get_all(AUTHORIZATION).iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("Basic dXNlcjpwYXNz")]);
        assert_eq!(
            forwarded.headers()[AUTHORIZATION].as_bytes(),
            b"Basic dXNlcjpwYXNz"
        );
    }

    #[test]
    fn stops_attaching_after_store_is_cleared() {
        let (store, _) = store_with_token();
        let authenticator = RequestAuthenticator::new(Arc::clone(&store));

        store.clear();

        assert!(authenticator.authorize(request()).headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn intercept_passes_authorized_request_to_next() {
        let (store, token) = store_with_token();
        let authenticator = RequestAuthenticator::new(store);

        let seen = authenticator.intercept(request(), |req| {
            req.headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

        assert_eq!(seen, Some(format!("Bearer {token}")));
    }

    #[tokio::test]
    async fn layer_authorizes_requests() {
        let (store, token) = store_with_token();
        let authenticator = RequestAuthenticator::new(store);
        let service = ServiceBuilder::new()
            .layer(authenticator.layer())
            .service(service_fn(|req: Request<()>| async move {
                Ok::<_, Infallible>(req.headers().get(AUTHORIZATION).cloned())
            }));

        let header = service.oneshot(request()).await.expect("infallible");

        assert_eq!(
            header.as_ref().and_then(|v| v.to_str().ok()),
            Some(format!("Bearer {token}").as_str())
        );
    }
}
