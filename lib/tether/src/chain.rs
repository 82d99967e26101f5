//! Interceptor chain.
//!
//! A [`Chain`] is an ordered list of [`Interceptor`]s wrapped around a
//! transport. Ordering is data: a [`ChainBuilder`] collects interceptors,
//! the first one added being the outermost, and [`ChainBuilder::build`]
//! nests them around the transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tower::Layer;
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::middleware::{
    AuthRefreshLayer, HeaderInjectorLayer, ListenerRegistry, LoggingLayer, ResponseObserverLayer,
    RetryLayer, TimeoutOverrideLayer, TokenProvider,
};
use crate::{Error, NetworkConfiguration, Request, Response, Result};

/// Type-erased service for middleware composition.
pub type BoxedService = BoxCloneService<Request, Response, Error>;

/// Future type for Tower Service implementation.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

type Wrap = dyn Fn(BoxedService) -> BoxedService + Send + Sync;

/// Thread-safe wrapper for `BoxedService`.
///
/// `BoxCloneService` is not `Sync`; the mutex is only held to clone it.
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: Request) -> ServiceFuture {
        // Lock, clone the service, and release the lock immediately
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        Box::pin(async move { service.call(request).await })
    }
}

/// A named, type-erased middleware layer.
#[derive(Clone)]
pub struct Interceptor {
    name: String,
    wrap: Arc<Wrap>,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Interceptor {
    /// Wrap a Tower layer into an interceptor.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use tether::Interceptor;
    /// use tether::middleware::TimeoutOverrideLayer;
    ///
    /// let interceptor = Interceptor::new("timeout_override", TimeoutOverrideLayer::new());
    /// ```
    pub fn new<L>(name: impl Into<String>, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send,
    {
        Self {
            name: name.into(),
            wrap: Arc::new(move |service| BoxCloneService::new(layer.layer(service))),
        }
    }

    /// Name of the interceptor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, service: BoxedService) -> BoxedService {
        (self.wrap)(service)
    }
}

/// Builder for [`Chain`].
#[derive(Debug, Clone, Default)]
pub struct ChainBuilder {
    interceptors: Vec<Interceptor>,
}

impl ChainBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in pipeline, outermost first: header injection, auth
    /// refresh, response observation, logging, timeout override, retry.
    ///
    /// Interceptors added afterwards sit between retry and the transport.
    #[must_use]
    pub fn standard(
        config: &NetworkConfiguration,
        token_provider: Arc<dyn TokenProvider>,
        registry: Arc<ListenerRegistry>,
    ) -> Self {
        Self::new()
            .layer(
                "header_injection",
                HeaderInjectorLayer::new(config.header_injection().clone()),
            )
            .layer(
                "auth_refresh",
                AuthRefreshLayer::new(token_provider, config.refresh_token_timeout()),
            )
            .layer("response_observer", ResponseObserverLayer::new(registry))
            .layer("logging", LoggingLayer::new(config.logging()))
            .layer("timeout_override", TimeoutOverrideLayer::new())
            .layer("retry", RetryLayer::new(config.retry()))
    }

    /// Append an interceptor; it runs inside every interceptor added before.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Append a Tower layer under `name`.
    #[must_use]
    pub fn layer<L>(self, name: impl Into<String>, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send,
    {
        self.interceptor(Interceptor::new(name, layer))
    }

    /// Interceptor names, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(Interceptor::name).collect()
    }

    /// Nest the interceptors around `transport`.
    pub fn build<T>(self, transport: T) -> Chain
    where
        T: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        T::Future: Send,
    {
        let mut service = BoxCloneService::new(transport);
        for interceptor in self.interceptors.iter().rev() {
            service = interceptor.wrap(service);
        }

        Chain {
            service: SyncService::new(service),
            names: self.interceptors.into_iter().map(|i| i.name).collect(),
        }
    }
}

/// A built interceptor chain, cheap to clone and shareable across threads.
#[derive(Clone)]
pub struct Chain {
    service: SyncService,
    names: Arc<[String]>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("interceptors", &self.names)
            .finish_non_exhaustive()
    }
}

impl Chain {
    /// Create a new chain builder.
    #[must_use]
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Interceptor names, outermost first.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Send `request` through every interceptor and the transport.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.service.call(request).await
    }
}

impl Service<Request> for Chain {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // SyncService is always ready (the underlying service is polled when called)
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.service.call(request)
    }
}
