//! Retry middleware with exponential backoff.
//!
//! Built on [`tower::retry`]: [`AttemptPolicy`] decides after every attempt
//! whether to go again, and its future is the backoff to wait first.
//!
//! A request is attempted up to `max_retries` times. A 2xx response ends the
//! loop immediately, and so does a 401: it is handed back as a response for
//! the auth layer to refresh. Any other response is discarded and the next
//! attempt starts right away. Transport failures (connection, TLS, timeout)
//! sleep before the next attempt, doubling the delay each time.
//!
//! When every attempt is used up, the transport error of the last attempt is
//! returned if there was one, [`Error::RetryExhausted`] otherwise.
//!
//! A [`CancellationToken`] in the request extensions aborts the loop, both
//! during an attempt and during a backoff sleep.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tower::retry::Policy;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::{Error, Request, Response, Result, RetryPolicy};

/// Wait before the next attempt.
#[derive(Debug)]
pub enum Backoff {
    /// Retry right away.
    Immediate,
    /// Retry once the sleep elapses.
    Sleep(Pin<Box<Sleep>>),
}

impl Backoff {
    fn after(delay: Duration) -> Self {
        Self::Sleep(Box::pin(tokio::time::sleep(delay)))
    }
}

impl Future for Backoff {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.get_mut() {
            Self::Immediate => Poll::Ready(()),
            Self::Sleep(sleep) => sleep.as_mut().poll(cx),
        }
    }
}

/// [`tower::retry::Policy`] counting the attempts of one request.
///
/// Each request gets its own copy through [`tower::retry::Retry`], so the
/// attempt count and the current delay never leak between requests.
#[derive(Debug, Clone)]
pub struct AttemptPolicy {
    max_retries: u32,
    remaining: u32,
    delay: Duration,
}

impl AttemptPolicy {
    /// Policy allowing `policy.max_retries` attempts in total.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            max_retries: policy.max_retries,
            remaining: policy.max_retries.saturating_sub(1),
            delay: policy.initial_delay,
        }
    }
}

impl Policy<Request, Response, Error> for AttemptPolicy {
    type Future = Backoff;

    fn retry(&mut self, _req: &mut Request, result: &mut Result<Response>) -> Option<Self::Future> {
        match result {
            Ok(response) if response.is_success() || response.is_unauthorized() => None,
            Ok(response) => {
                let status = response.status();
                if self.remaining == 0 {
                    *result = Err(Error::RetryExhausted {
                        attempts: self.max_retries,
                        last_status: Some(status),
                    });
                    return None;
                }
                debug!(status, remaining = self.remaining, "unsuccessful response, retrying");
                self.remaining -= 1;
                Some(Backoff::Immediate)
            }
            Err(err) if err.is_transport() => {
                warn!(error = %err, remaining = self.remaining, "transport failure");
                if self.remaining == 0 {
                    return None;
                }
                self.remaining -= 1;
                let delay = self.delay;
                self.delay = delay.saturating_mul(2);
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                debug!(delay_ms, "backing off");
                Some(Backoff::after(delay))
            }
            Err(_) => None,
        }
    }

    fn clone_request(&mut self, req: &Request) -> Option<Request> {
        Some(req.clone())
    }
}

/// Layer retrying failed requests.
///
/// Without a policy the layer passes requests through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryLayer {
    policy: Option<RetryPolicy>,
}

impl RetryLayer {
    /// Create a retry layer; `None` disables retrying.
    #[must_use]
    pub const fn new(policy: Option<RetryPolicy>) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner,
            policy: self.policy,
        }
    }
}

/// Service retrying failed requests.
#[derive(Debug, Clone)]
pub struct Retry<S> {
    inner: S,
    policy: Option<RetryPolicy>,
}

/// Run `future` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: Option<&CancellationToken>, future: F) -> Result<F::Output> {
    match cancel {
        Some(cancel) => tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

impl<S> Service<Request> for Retry<S>
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
        let Some(policy) = self.policy else {
            return Box::pin(async move { inner.call(request).await });
        };
        if policy.max_retries == 0 {
            return Box::pin(async {
                Err(Error::RetryExhausted {
                    attempts: 0,
                    last_status: None,
                })
            });
        }

        let cancel = request.extensions().get::<CancellationToken>().cloned();
        let mut retry = tower::retry::Retry::new(AttemptPolicy::new(policy), inner);
        Box::pin(async move {
            // the first attempt starts inside the select, after the cancel check
            cancellable(cancel.as_ref(), async move { retry.call(request).await }).await?
        })
    }
}
