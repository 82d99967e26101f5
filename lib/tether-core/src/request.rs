//! HTTP request building.
//!
//! A [`Request`] is immutable once handed to the pipeline: interceptors take it
//! apart with [`Request::into_parts`] or [`Request::to_builder`] and produce a
//! new one.
//!
//! # Example
//!
//! ```
//! use tether_core::{Method, Request};
//!
//! let request = Request::builder(Method::Get, "https://api.example.com/users".parse().unwrap())
//!     .header("Accept", "application/json")
//!     .query("page", "1")
//!     .build();
//!
//! assert_eq!(request.url().query(), Some("page=1"));
//! ```

use bytes::Bytes;
use http::Extensions;

use crate::{Headers, Method};

/// An HTTP request with method, URL, headers, optional body and typed extensions.
///
/// Extensions carry out-of-band data (timeouts, cancellation) that is never
/// put on the wire.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: url::Url,
    headers: Headers,
    body: Option<Bytes>,
    extensions: Extensions,
}

impl Request {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: url::Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// Reassemble a request from its parts.
    #[must_use]
    pub fn from_parts(
        method: Method,
        url: url::Url,
        headers: Headers,
        body: Option<Bytes>,
        extensions: Extensions,
    ) -> Self {
        Self {
            method,
            url,
            headers,
            body,
            extensions,
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Single header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Typed out-of-band values attached to this request.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// The method and URL, detached from headers and body.
    #[must_use]
    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method,
            url: self.url.clone(),
        }
    }

    /// Start a builder holding a copy of this request.
    #[must_use]
    pub fn to_builder(&self) -> RequestBuilder {
        RequestBuilder {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            extensions: self.extensions.clone(),
        }
    }

    /// Consume into (method, url, headers, body, extensions).
    #[must_use]
    pub fn into_parts(self) -> (Method, url::Url, Headers, Option<Bytes>, Extensions) {
        (
            self.method,
            self.url,
            self.headers,
            self.body,
            self.extensions,
        )
    }
}

impl From<Request> for RequestBuilder {
    fn from(request: Request) -> Self {
        let (method, url, headers, body, extensions) = request.into_parts();
        Self {
            method,
            url,
            headers,
            body,
            extensions,
        }
    }
}

/// Method and URL of the request a response answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// HTTP method.
    pub method: Method,
    /// Request URL.
    pub url: url::Url,
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: url::Url,
    headers: Headers,
    body: Option<Bytes>,
    extensions: Extensions,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
            extensions: Extensions::new(),
        }
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header only if it is not present yet.
    #[must_use]
    pub fn header_if_absent(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert_if_absent(name, value);
        self
    }

    /// Removes a header.
    #[must_use]
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    /// Mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach a typed out-of-band value, replacing one of the same type.
    #[must_use]
    pub fn extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// Mutable access to the extensions.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Set a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(self, value: &T) -> crate::Result<Self> {
        let body = crate::to_json(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    /// Builds the [`Request`].
    #[must_use]
    pub fn build(self) -> Request {
        Request {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            extensions: self.extensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> url::Url {
        url::Url::parse(s).expect("valid URL")
    }

    #[test]
    fn request_builder_basic() {
        let request = Request::builder(Method::Get, url("https://api.example.com/users"))
            .header("Accept", "application/json")
            .build();

        assert_eq!(request.method(), Method::Get);
        assert_eq!(request.url().as_str(), "https://api.example.com/users");
        assert_eq!(request.header("accept"), Some("application/json"));
        assert!(request.body().is_none());
    }

    #[test]
    fn header_if_absent_never_overwrites() {
        let request = Request::builder(Method::Get, url("https://api.example.com"))
            .header("X-Client", "app")
            .header_if_absent("x-client", "sdk")
            .header_if_absent("X-Version", "2")
            .build();

        assert_eq!(request.header("X-Client"), Some("app"));
        assert_eq!(request.header("X-Version"), Some("2"));
    }

    #[test]
    fn to_builder_produces_independent_copy() {
        let original = Request::builder(Method::Post, url("https://api.example.com/items"))
            .header("X-Trace", "1")
            .body("payload")
            .extension(7_u32)
            .build();

        let rebuilt = original.to_builder().without_header("X-Trace").build();

        assert_eq!(original.header("X-Trace"), Some("1"));
        assert!(rebuilt.header("X-Trace").is_none());
        assert_eq!(rebuilt.body(), Some(&Bytes::from("payload")));
        assert_eq!(rebuilt.extensions().get::<u32>(), Some(&7));
    }

    #[test]
    fn request_builder_json() {
        #[derive(serde::Serialize)]
        struct User {
            name: String,
        }

        let request = Request::builder(Method::Post, url("https://api.example.com/users"))
            .json(&User {
                name: "test".to_string(),
            })
            .expect("json")
            .build();

        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.body(), Some(&Bytes::from(r#"{"name":"test"}"#)));
    }

    #[test]
    fn head_captures_method_and_url() {
        let request = Request::builder(Method::Delete, url("https://api.example.com/users/1")).build();
        let head = request.head();

        assert_eq!(head.method, Method::Delete);
        assert_eq!(head.url.path(), "/users/1");
    }
}
