//! Bearer authentication with token refresh on `401 Unauthorized`.
//!
//! The current token is attached to every outgoing request. When the peer
//! answers 401, the [`TokenProvider`] is asked for a new token and the
//! original request is re-issued once with it. Refreshes are serialized per
//! layer: concurrent 401s wait for the refresh in flight before starting
//! their own.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, warn};

use crate::{Error, Request, RequestBuilder, Response, Result};

/// Completion handle passed to [`TokenProvider::refresh_token`].
///
/// Invoke it with the new token (or `None` on failure) and the status code
/// of the refresh exchange. It may be invoked from any thread.
pub type RefreshCallback = Box<dyn FnOnce(Option<String>, u16) + Send>;

/// Source of bearer tokens.
pub trait TokenProvider: Send + Sync + 'static {
    /// Current token; `None` or empty means no `Authorization` header.
    fn token(&self) -> Option<String>;

    /// Start a refresh and report the outcome through `on_refreshed`.
    ///
    /// The refresh may complete asynchronously. A callback that is never
    /// invoked is treated as a failed refresh once the refresh timeout
    /// elapses.
    fn refresh_token(&self, on_refreshed: RefreshCallback);
}

/// Layer attaching bearer tokens and refreshing them on 401.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tether::middleware::AuthRefreshLayer;
///
/// let layer = AuthRefreshLayer::new(provider, Duration::from_secs(30));
/// ```
#[derive(Clone)]
pub struct AuthRefreshLayer {
    provider: Arc<dyn TokenProvider>,
    refresh_lock: Arc<Mutex<()>>,
    refresh_timeout: Duration,
}

impl std::fmt::Debug for AuthRefreshLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRefreshLayer")
            .field("refresh_timeout", &self.refresh_timeout)
            .finish_non_exhaustive()
    }
}

impl AuthRefreshLayer {
    /// Create a layer waiting at most `refresh_timeout` for each refresh.
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>, refresh_timeout: Duration) -> Self {
        Self {
            provider,
            refresh_lock: Arc::new(Mutex::new(())),
            refresh_timeout,
        }
    }
}

impl<S> Layer<S> for AuthRefreshLayer {
    type Service = AuthRefresh<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthRefresh {
            inner,
            provider: Arc::clone(&self.provider),
            refresh_lock: Arc::clone(&self.refresh_lock),
            refresh_timeout: self.refresh_timeout,
        }
    }
}

/// Service attaching bearer tokens and refreshing them on 401.
#[derive(Clone)]
pub struct AuthRefresh<S> {
    inner: S,
    provider: Arc<dyn TokenProvider>,
    refresh_lock: Arc<Mutex<()>>,
    refresh_timeout: Duration,
}

impl<S: std::fmt::Debug> std::fmt::Debug for AuthRefresh<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRefresh")
            .field("inner", &self.inner)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish_non_exhaustive()
    }
}

fn with_token(request: Request, token: Option<String>) -> Request {
    match token {
        Some(token) if !token.is_empty() => RequestBuilder::from(request)
            .header_if_absent("Authorization", format!("Bearer {token}"))
            .build(),
        _ => request,
    }
}

/// Ask `provider` for a new token, waiting at most `limit`.
///
/// Any failure (panic, dropped callback, timeout, empty token) yields `None`.
async fn refresh(provider: &dyn TokenProvider, limit: Duration) -> Option<String> {
    let (tx, rx) = oneshot::channel();
    let on_refreshed: RefreshCallback = Box::new(move |token, status| {
        // the waiter may already have timed out
        let _ = tx.send((token, status));
    });

    if catch_unwind(AssertUnwindSafe(|| provider.refresh_token(on_refreshed))).is_err() {
        warn!("token provider panicked during refresh");
        return None;
    }

    match tokio::time::timeout(limit, rx).await {
        Ok(Ok((Some(token), status))) if !token.is_empty() => {
            debug!(status, "token refreshed");
            Some(token)
        }
        Ok(Ok((_, status))) => {
            warn!(status, "token refresh returned no token");
            None
        }
        Ok(Err(_)) => {
            warn!("token refresh callback dropped without being invoked");
            None
        }
        Err(_) => {
            let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            warn!(timeout_ms, "token refresh timed out");
            None
        }
    }
}

impl<S> Service<Request> for AuthRefresh<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let provider = Arc::clone(&self.provider);
        let refresh_lock = Arc::clone(&self.refresh_lock);
        let refresh_timeout = self.refresh_timeout;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let original = request.clone();
            let response = inner.call(with_token(request, provider.token())).await?;
            if !response.is_unauthorized() {
                return Ok(response);
            }

            let refreshed = {
                let _guard = refresh_lock.lock().await;
                refresh(provider.as_ref(), refresh_timeout).await
            };

            match refreshed {
                Some(token) => {
                    debug!("re-issuing request with refreshed token");
                    inner
                        .ready()
                        .await?
                        .call(with_token(original, Some(token)))
                        .await
                }
                None => Ok(response),
            }
        })
    }
}
