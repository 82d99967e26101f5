//! Per-request timeout override middleware.
//!
//! A request may carry `CONNECT_TIMEOUT`, `READ_TIMEOUT` and `WRITE_TIMEOUT`
//! directives (integer milliseconds, header-carried). This middleware parses
//! them into a [`RequestTimeouts`] extension that the transport honors, and
//! strips them so they never reach the remote peer.
//!
//! ```ignore
//! use tether::middleware::TimeoutDirectives;
//!
//! let request = TimeoutDirectives::new()
//!     .read(Duration::from_secs(60))
//!     .apply(Request::builder(Method::Get, url))
//!     .build();
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::{Error, Request, RequestBuilder, Response, Result};

/// Directive overriding the connect timeout.
pub const CONNECT_TIMEOUT: &str = "CONNECT_TIMEOUT";
/// Directive overriding the read timeout.
pub const READ_TIMEOUT: &str = "READ_TIMEOUT";
/// Directive overriding the write timeout.
pub const WRITE_TIMEOUT: &str = "WRITE_TIMEOUT";

/// Timeouts applied to a single request execution.
///
/// `None` fields fall back to the transport defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestTimeouts {
    /// Connection establishment.
    pub connect: Option<Duration>,
    /// Waiting for the response.
    pub read: Option<Duration>,
    /// Sending the request.
    pub write: Option<Duration>,
}

impl RequestTimeouts {
    /// Fill every unset field from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            connect: self.connect.or(fallback.connect),
            read: self.read.or(fallback.read),
            write: self.write.or(fallback.write),
        }
    }

    /// Budget for receiving the response head, if a read timeout is known.
    #[must_use]
    pub fn head_budget(&self) -> Option<Duration> {
        self.read.map(|read| {
            read + self.connect.unwrap_or_default() + self.write.unwrap_or_default()
        })
    }
}

/// Builder-side helper writing timeout directives onto a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutDirectives {
    timeouts: RequestTimeouts,
}

impl TimeoutDirectives {
    /// No directive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the connect timeout.
    #[must_use]
    pub const fn connect(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = Some(timeout);
        self
    }

    /// Override the read timeout.
    #[must_use]
    pub const fn read(mut self, timeout: Duration) -> Self {
        self.timeouts.read = Some(timeout);
        self
    }

    /// Override the write timeout.
    #[must_use]
    pub const fn write(mut self, timeout: Duration) -> Self {
        self.timeouts.write = Some(timeout);
        self
    }

    /// Write the directives onto `builder`.
    #[must_use]
    pub fn apply(self, mut builder: RequestBuilder) -> RequestBuilder {
        let directives = [
            (CONNECT_TIMEOUT, self.timeouts.connect),
            (READ_TIMEOUT, self.timeouts.read),
            (WRITE_TIMEOUT, self.timeouts.write),
        ];
        for (name, timeout) in directives {
            if let Some(timeout) = timeout {
                builder = builder.header(name, timeout.as_millis().to_string());
            }
        }
        builder
    }
}

fn parse_directive(builder: &mut RequestBuilder, name: &str) -> Result<Option<Duration>> {
    builder
        .headers_mut()
        .remove(name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| {
                    Error::invalid_request(format!("{name} must be milliseconds, got {raw:?}"))
                })
        })
        .transpose()
}

/// Strip the timeout directives from `request` and resolve its timeouts.
///
/// Directives override whatever [`RequestTimeouts`] the request already
/// carries; fields without a directive keep that value.
///
/// # Errors
///
/// Returns an error if a directive is not a whole number of milliseconds.
pub fn resolve_timeouts(request: Request) -> Result<Request> {
    let current = request
        .extensions()
        .get::<RequestTimeouts>()
        .copied()
        .unwrap_or_default();
    let mut builder = RequestBuilder::from(request);

    let connect = parse_directive(&mut builder, CONNECT_TIMEOUT);
    let read = parse_directive(&mut builder, READ_TIMEOUT);
    let write = parse_directive(&mut builder, WRITE_TIMEOUT);

    let overrides = RequestTimeouts {
        connect: connect?,
        read: read?,
        write: write?,
    };

    Ok(builder.extension(overrides.or(current)).build())
}

/// Layer resolving per-request timeout directives.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutOverrideLayer;

impl TimeoutOverrideLayer {
    /// Create a new timeout override layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TimeoutOverrideLayer {
    type Service = TimeoutOverride<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutOverride { inner }
    }
}

/// Service resolving per-request timeout directives.
#[derive(Debug, Clone)]
pub struct TimeoutOverride<S> {
    inner: S,
}

impl<S> Service<Request> for TimeoutOverride<S>
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
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let request = resolve_timeouts(request)?;
            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    fn builder() -> RequestBuilder {
        let url = url::Url::parse("https://api.example.com/slow").expect("url");
        Request::builder(Method::Get, url)
    }

    #[test]
    fn directives_become_extension_and_are_stripped() {
        let request = TimeoutDirectives::new()
            .connect(Duration::from_millis(1500))
            .read(Duration::from_secs(60))
            .apply(builder().header("Accept", "application/json"))
            .build();
        assert_eq!(request.header(READ_TIMEOUT), Some("60000"));

        let resolved = resolve_timeouts(request).expect("valid directives");

        assert!(resolved.header(CONNECT_TIMEOUT).is_none());
        assert!(resolved.header(READ_TIMEOUT).is_none());
        assert!(resolved.header(WRITE_TIMEOUT).is_none());
        assert_eq!(resolved.header("Accept"), Some("application/json"));
        assert_eq!(
            resolved.extensions().get::<RequestTimeouts>(),
            Some(&RequestTimeouts {
                connect: Some(Duration::from_millis(1500)),
                read: Some(Duration::from_secs(60)),
                write: None,
            })
        );
    }

    #[test]
    fn missing_directives_keep_current_timeouts() {
        let current = RequestTimeouts {
            connect: Some(Duration::from_secs(1)),
            read: Some(Duration::from_secs(2)),
            write: Some(Duration::from_secs(3)),
        };
        let request = builder()
            .header(WRITE_TIMEOUT, "250")
            .extension(current)
            .build();

        let resolved = resolve_timeouts(request).expect("valid directives");

        assert_eq!(
            resolved.extensions().get::<RequestTimeouts>(),
            Some(&RequestTimeouts {
                write: Some(Duration::from_millis(250)),
                ..current
            })
        );
    }

    #[test]
    fn directive_names_ignore_case() {
        let request = builder().header("read_timeout", "10").build();
        let resolved = resolve_timeouts(request).expect("valid directive");

        assert!(resolved.headers().is_empty());
        assert_eq!(
            resolved
                .extensions()
                .get::<RequestTimeouts>()
                .and_then(|t| t.read),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn malformed_directive_is_rejected() {
        let request = builder().header(CONNECT_TIMEOUT, "soon").build();
        let err = resolve_timeouts(request).expect_err("not a number");

        assert_eq!(
            err.to_string(),
            r#"invalid request: CONNECT_TIMEOUT must be milliseconds, got "soon""#
        );
    }

    #[test]
    fn head_budget_requires_read_timeout() {
        let timeouts = RequestTimeouts {
            connect: Some(Duration::from_secs(1)),
            read: None,
            write: Some(Duration::from_secs(1)),
        };
        assert_eq!(timeouts.head_budget(), None);

        let timeouts = RequestTimeouts {
            read: Some(Duration::from_secs(5)),
            ..timeouts
        };
        assert_eq!(timeouts.head_budget(), Some(Duration::from_secs(7)));
    }
}
