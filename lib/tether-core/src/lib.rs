//! Core types for the tether HTTP client.
//!
//! This crate provides the data model that flows through the interceptor
//! pipeline:
//! - [`Method`] - HTTP method enum
//! - [`Headers`] - case-insensitive header multimap
//! - [`Request`] and [`RequestBuilder`] - HTTP request types
//! - [`Response`] - HTTP response with a peekable body
//! - [`ApiPath`] and [`PathTemplate`] - endpoint matchers for response observation
//! - [`BodyCodec`] - pluggable body encoding
//! - [`Error`] and [`Result`] - Error handling

mod api_path;
mod body;
mod error;
mod headers;
mod method;
mod request;
mod response;

pub use api_path::{ApiPath, PathTemplate, Segment};
pub use body::{BodyCodec, JsonCodec, TextCodec, from_json, from_value, to_json};
pub use error::{Error, Result};
pub use headers::Headers;
pub use method::Method;
pub use request::{Request, RequestBuilder, RequestHead};
pub use response::Response;

// Re-export http crate types for status codes
pub use http::{Extensions, StatusCode};
