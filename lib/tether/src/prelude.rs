//! Prelude module for convenient imports.
//!
//! ```ignore
//! use tether::prelude::*;
//! ```

pub use crate::middleware::{ApiListener, ListenerError, RefreshCallback, TimeoutDirectives, TokenProvider};
pub use crate::{
    ApiClient, ApiPath, ApiService, CancellationToken, Error, Method, NetworkConfiguration,
    NetworkContext, Request, RequestBuilder, Response, Result, RetryPolicy, StatusCode,
};
pub use serde::{Deserialize, Serialize};
