//! Tower middleware layers making up the request pipeline.
//!
//! Every layer works on [`crate::Request`]/[`crate::Response`] and can be
//! composed with [`tower::ServiceBuilder`] or through a [`crate::ChainBuilder`].
//! The standard chain applies them in this order, outermost first:
//!
//! 1. [`HeaderInjectorLayer`] - static headers for matching hosts
//! 2. [`AuthRefreshLayer`] - bearer token, refreshed once on 401
//! 3. [`ResponseObserverLayer`] - delivers matching responses to listeners
//! 4. [`LoggingLayer`] - request/response logging through `tracing`
//! 5. [`TimeoutOverrideLayer`] - per-request timeout directives
//! 6. [`RetryLayer`] - retries with exponential backoff
//!
//! # Example
//!
//! ```ignore
//! use tether::middleware::{RetryLayer, TimeoutOverrideLayer};
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(TimeoutOverrideLayer::new())
//!     .layer(RetryLayer::new(config.retry()))
//!     .service(HyperTransport::new(&config));
//! ```

mod auth;
mod header;
mod logging;
mod observer;
mod retry;
mod timeout;

pub use auth::{AuthRefresh, AuthRefreshLayer, RefreshCallback, TokenProvider};
pub use header::{HeaderInjector, HeaderInjectorLayer};
pub use logging::{Logging, LoggingLayer, to_curl};
pub use observer::{
    ApiListener, ListenerError, ListenerRegistry, ResponseObserver, ResponseObserverLayer,
};
pub use retry::{AttemptPolicy, Backoff, Retry, RetryLayer};
pub use timeout::{
    CONNECT_TIMEOUT, READ_TIMEOUT, RequestTimeouts, TimeoutDirectives, TimeoutOverride,
    TimeoutOverrideLayer, WRITE_TIMEOUT, resolve_timeouts,
};

// Re-export tower types for convenience
pub use tower::{Layer, ServiceBuilder};
