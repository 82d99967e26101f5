//! Response observation middleware.
//!
//! Listeners register for an [`ApiPath`]; every response to a request whose
//! method and path match is delivered to them as text, in registration
//! order. The response itself is passed upstream untouched.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::{ApiPath, Error, Method, Request, Response, Result};

/// Error a listener may report; it is logged and otherwise ignored.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Observer of responses for a registered [`ApiPath`].
pub trait ApiListener: Send + Sync + 'static {
    /// Called with the matched path and the response body as text.
    fn on_api_response(&self, api_path: &ApiPath, body: &str) -> std::result::Result<(), ListenerError>;
}

type Listeners = Vec<Arc<dyn ApiListener>>;

/// Registry of listeners keyed by [`ApiPath`].
///
/// Paths are kept in registration order; the first registered path matching
/// a response wins. A path disappears with its last listener.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<(ApiPath, Listeners)>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<String> = self.lock().iter().map(|(path, _)| path.to_string()).collect();
        f.debug_struct("ListenerRegistry").field("paths", &paths).finish()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // listeners never run under this lock
    fn lock(&self) -> MutexGuard<'_, Vec<(ApiPath, Listeners)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `listener` for `api_path`.
    ///
    /// Registering the same listener twice for a path has no effect.
    pub fn add(&self, api_path: ApiPath, listener: Arc<dyn ApiListener>) {
        let mut entries = self.lock();
        match entries.iter_mut().find(|(path, _)| *path == api_path) {
            Some((_, listeners)) => {
                if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                    listeners.push(listener);
                }
            }
            None => entries.push((api_path, vec![listener])),
        }
    }

    /// Unregister `listener` from `api_path`.
    ///
    /// Returns `true` if it was registered.
    pub fn remove(&self, api_path: &ApiPath, listener: &Arc<dyn ApiListener>) -> bool {
        let mut entries = self.lock();
        let Some(index) = entries.iter().position(|(path, _)| path == api_path) else {
            return false;
        };
        let Some((_, listeners)) = entries.get_mut(index) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            entries.remove(index);
        }
        removed
    }

    /// Number of paths with at least one listener.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the listeners of the first path matching `path` and `method`.
    ///
    /// `path` is a URL path; one leading `/` is ignored.
    #[must_use]
    pub fn matching(
        &self,
        path: &str,
        method: Method,
    ) -> Option<(ApiPath, Vec<Arc<dyn ApiListener>>)> {
        let path = path.strip_prefix('/').unwrap_or(path);
        self.lock()
            .iter()
            .find(|(api_path, _)| api_path.matches(path, method))
            .map(|(api_path, listeners)| (api_path.clone(), listeners.clone()))
    }

    /// Deliver `response` to the listeners matching `path` and `method`.
    ///
    /// Returns the number of listeners that accepted the response.
    pub fn notify(&self, path: &str, method: Method, response: &Response) -> usize {
        let Some((api_path, listeners)) = self.matching(path, method) else {
            return 0;
        };
        let body = response.peek_text();
        debug!(%api_path, listeners = listeners.len(), "delivering response");

        listeners
            .iter()
            .filter(|listener| {
                match catch_unwind(AssertUnwindSafe(|| listener.on_api_response(&api_path, &body))) {
                    Ok(Ok(())) => true,
                    Ok(Err(err)) => {
                        warn!(%api_path, error = %err, "listener failed");
                        false
                    }
                    Err(_) => {
                        warn!(%api_path, "listener panicked");
                        false
                    }
                }
            })
            .count()
    }
}

/// Layer delivering responses to registered listeners.
#[derive(Debug, Clone)]
pub struct ResponseObserverLayer {
    registry: Arc<ListenerRegistry>,
}

impl ResponseObserverLayer {
    /// Create an observer layer backed by `registry`.
    #[must_use]
    pub const fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }
}

impl<S> Layer<S> for ResponseObserverLayer {
    type Service = ResponseObserver<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResponseObserver {
            inner,
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Service delivering responses to registered listeners.
#[derive(Debug, Clone)]
pub struct ResponseObserver<S> {
    inner: S,
    registry: Arc<ListenerRegistry>,
}

impl<S> Service<Request> for ResponseObserver<S>
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
        let path = request.url().path().to_string();
        let method = request.method();
        let registry = Arc::clone(&self.registry);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.call(request).await?;
            registry.notify(&path, method, &response);
            Ok(response)
        })
    }
}
