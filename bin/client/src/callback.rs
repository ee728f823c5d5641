//! Loopback listener for the authorization redirect.
//!
//! The provider redirects the browser to the application's redirect URI with
//! either `code` and `state` or `error` and `error_description`. The listener
//! serves exactly one such request and shuts down.

use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storefront_session::ProviderError;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How long the user has to complete the login in the browser.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Parameters of a successful authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// The authorization code.
    pub code: String,
    /// The state echoed back by the provider.
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackQuery {
    fn into_result(self) -> Result<CallbackParams, ProviderError> {
        if let Some(error) = self.error {
            let reason = match self.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(ProviderError::Rejected { reason });
        }
        match (self.code, self.state) {
            (Some(code), Some(state)) => Ok(CallbackParams { code, state }),
            _ => Err(ProviderError::Redirect {
                details: "callback is missing code or state".to_string(),
            }),
        }
    }
}

type ResultSlot = Arc<Mutex<Option<oneshot::Sender<Result<CallbackParams, ProviderError>>>>>;

/// A bound, not yet serving, redirect listener.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
}

impl CallbackListener {
    /// Binds the host and port of `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Configuration` if the URI is not an absolute
    /// http URL, or `ProviderError::Redirect` if the port cannot be bound.
    pub async fn bind(redirect_uri: &str) -> Result<Self, ProviderError> {
        let url = reqwest::Url::parse(redirect_uri).map_err(|e| ProviderError::Configuration {
            details: format!("invalid redirect URI: {e}"),
        })?;
        let host = url.host_str().ok_or_else(|| ProviderError::Configuration {
            details: "redirect URI has no host".to_string(),
        })?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProviderError::Configuration {
                details: "redirect URI has no port".to_string(),
            })?;

        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| ProviderError::Redirect {
                details: format!("failed to bind {host}:{port}: {e}"),
            })?;

        Ok(Self {
            listener,
            path: url.path().to_string(),
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Redirect` if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, ProviderError> {
        self.listener
            .local_addr()
            .map_err(|e| ProviderError::Redirect {
                details: e.to_string(),
            })
    }

    /// Serves until the redirect arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns the provider's error response, `ProviderError::Redirect` for a
    /// malformed callback or a timeout.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackParams, ProviderError> {
        let (result_tx, result_rx) = oneshot::channel();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(result_tx)));
        let app = Router::new()
            .route(&self.path, get(handle_callback))
            .with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = tokio::time::timeout(timeout, result_rx).await;
        let _ = shutdown_tx.send(());
        if let Ok(Err(e)) = server.await {
            warn!(error = %e, "callback listener stopped with an error");
        }

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProviderError::Redirect {
                details: "callback listener closed".to_string(),
            }),
            Err(_) => Err(ProviderError::Redirect {
                details: format!("no callback within {}s", timeout.as_secs()),
            }),
        }
    }
}

async fn handle_callback(
    State(slot): State<ResultSlot>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> impl IntoResponse {
    let result = match query {
        Ok(Query(query)) => query.into_result(),
        Err(rejection) => Err(ProviderError::Redirect {
            details: format!("malformed callback: {}", rejection.body_text()),
        }),
    };
    let body = match &result {
        Ok(_) => "Login complete. You can close this window.",
        Err(_) => "Login failed. You can close this window.",
    };

    let sender = slot.lock().unwrap_or_else(|p| p.into_inner()).take();
    match sender {
        Some(sender) => {
            debug!(success = result.is_ok(), "authorization callback received");
            let _ = sender.send(result);
        }
        None => debug!("ignoring repeated authorization callback"),
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn listener() -> (CallbackListener, String) {
        let listener = CallbackListener::bind("http://127.0.0.1:0/callback")
            .await
            .expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        (listener, base)
    }

    #[tokio::test]
    async fn receives_code_and_state() {
        let (listener, base) = listener().await;
        let waiting = tokio::spawn(listener.wait(Duration::from_secs(5)));

        let response = reqwest::get(format!("{base}/callback?code=abc&state=xyz"))
            .await
            .expect("request");

        assert!(response.status().is_success());
        let params = waiting.await.expect("join").expect("callback");
        assert_eq!(
            params,
            CallbackParams {
                code: "abc".to_string(),
                state: "xyz".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn provider_error_is_rejected() {
        let (listener, base) = listener().await;
        let waiting = tokio::spawn(listener.wait(Duration::from_secs(5)));

        reqwest::get(format!(
            "{base}/callback?error=access_denied&error_description=user%20cancelled"
        ))
        .await
        .expect("request");

        let err = waiting.await.expect("join").unwrap_err();
        assert_eq!(
            err,
            ProviderError::Rejected {
                reason: "access_denied: user cancelled".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn missing_code_fails() {
        let (listener, base) = listener().await;
        let waiting = tokio::spawn(listener.wait(Duration::from_secs(5)));

        reqwest::get(format!("{base}/callback?state=xyz"))
            .await
            .expect("request");

        let err = waiting.await.expect("join").unwrap_err();
        assert!(matches!(err, ProviderError::Redirect { .. }));
    }

    #[tokio::test]
    async fn malformed_query_fails_without_waiting_for_timeout() {
        let (listener, base) = listener().await;
        let waiting = tokio::spawn(listener.wait(Duration::from_secs(300)));

        let response = reqwest::get(format!("{base}/callback?code=a&code=b&state=xyz"))
            .await
            .expect("request");

        assert!(response.status().is_success());
        let err = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("callback settles before the listener timeout")
            .expect("join")
            .unwrap_err();
        assert!(
            matches!(&err, ProviderError::Redirect { details } if details.contains("malformed")),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn times_out_without_callback() {
        let (listener, _) = listener().await;

        let err = listener.wait(Duration::from_millis(50)).await.unwrap_err();

        assert!(matches!(err, ProviderError::Redirect { .. }));
    }

    #[tokio::test]
    async fn rejects_invalid_redirect_uri() {
        let err = CallbackListener::bind("not a url").await.err().expect("error");
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }
}
