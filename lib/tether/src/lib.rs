//! Interceptor-based HTTP client layer.
//!
//! Requests flow through an ordered chain of Tower middleware before
//! reaching the transport:
//!
//! - static header injection for matching hosts,
//! - bearer tokens with a serialized refresh on `401 Unauthorized`,
//! - path-scoped response observation,
//! - per-request timeout overrides,
//! - retry with exponential backoff.
//!
//! A [`NetworkContext`] owns the configuration, the chain, one cached
//! [`ApiClient`] per base URL and the listener registry.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! pub struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! pub struct UserApi {
//!     client: Arc<ApiClient>,
//! }
//!
//! impl ApiService for UserApi {
//!     fn from_client(client: Arc<ApiClient>) -> Self {
//!         Self { client }
//!     }
//! }
//!
//! impl UserApi {
//!     pub async fn get_user(&self, id: u64) -> tether::Result<User> {
//!         self.client.get_json(&format!("users/{id}")).await
//!     }
//! }
//!
//! let context = NetworkContext::new();
//! context.initialize(
//!     NetworkConfiguration::builder("https://api.example.com").build()?,
//!     Arc::new(MyTokenProvider::default()),
//! )?;
//! let users: UserApi = context.create_service(None)?;
//! let user = users.get_user(42).await?;
//! ```

mod api_client;
mod chain;
mod config;
mod connector;
mod context;
mod factory;
pub mod middleware;
pub mod prelude;
#[cfg(test)]
mod testing;
mod transport;

pub use api_client::{ApiClient, ApiService};
pub use chain::{BoxedService, Chain, ChainBuilder, Interceptor, ServiceFuture};
pub use config::{
    DEFAULT_REFRESH_TOKEN_TIMEOUT, HeaderInjection, LogLevel, LoggingConfiguration,
    NetworkConfiguration, NetworkConfigurationBuilder, RetryPolicy, ensure_trailing_slash,
};
pub use context::{NetworkContext, NetworkContextBuilder};
pub use factory::ClientFactory;
pub use transport::HyperTransport;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use tether_core::{
    ApiPath, BodyCodec, Error, Headers, JsonCodec, Method, PathTemplate, Request, RequestBuilder,
    RequestHead, Response, Result, Segment, TextCodec, from_json, from_value, to_json,
};

// Re-export http types for status codes and extensions
pub use tether_core::{Extensions, StatusCode};

// Cancellation handle honored by the retry interceptor
pub use tokio_util::sync::CancellationToken;
pub use url;
