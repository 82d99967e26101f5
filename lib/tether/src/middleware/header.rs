//! Static header injection middleware.
//!
//! Adds the configured headers to every request whose host matches the
//! configured pattern. A header the request already carries is never
//! overwritten.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::{Error, HeaderInjection, Request, RequestBuilder, Response, Result};

/// Layer that injects static headers.
#[derive(Debug, Clone)]
pub struct HeaderInjectorLayer {
    injection: Arc<HeaderInjection>,
}

impl HeaderInjectorLayer {
    /// Create a new header injection layer.
    #[must_use]
    pub fn new(injection: HeaderInjection) -> Self {
        Self {
            injection: Arc::new(injection),
        }
    }
}

impl<S> Layer<S> for HeaderInjectorLayer {
    type Service = HeaderInjector<S>;

    fn layer(&self, inner: S) -> Self::Service {
        HeaderInjector {
            inner,
            injection: Arc::clone(&self.injection),
        }
    }
}

/// Service that injects static headers.
#[derive(Debug, Clone)]
pub struct HeaderInjector<S> {
    inner: S,
    injection: Arc<HeaderInjection>,
}

fn inject(injection: &HeaderInjection, request: Request) -> Request {
    if injection.headers().is_empty() {
        return request;
    }
    let host_matches = request
        .url()
        .host_str()
        .is_some_and(|host| injection.matches_host(host));
    if !host_matches {
        return request;
    }

    let mut builder = RequestBuilder::from(request);
    for (name, value) in injection.headers() {
        builder.headers_mut().insert_if_absent(name.as_str(), value.as_str());
    }
    builder.build()
}

impl<S> Service<Request> for HeaderInjector<S>
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
        let request = inject(&self.injection, request);
        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}
