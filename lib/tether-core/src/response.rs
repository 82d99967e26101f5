//! HTTP response handling.
//!
//! The body is buffered as [`Bytes`], so observers can [`Response::peek_text`]
//! without disturbing what the caller eventually reads.

use bytes::Bytes;

use crate::{Headers, RequestHead};

/// HTTP response with status, headers, body and the request it answers.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Bytes,
    request: Option<RequestHead>,
}

impl Response {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            request: None,
        }
    }

    /// Records the originating request.
    #[must_use]
    pub fn with_request(mut self, request: RequestHead) -> Self {
        self.request = Some(request);
        self
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Single header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// The request this response answers, when the transport recorded it.
    #[must_use]
    pub const fn request(&self) -> Option<&RequestHead> {
        self.request.as_ref()
    }

    /// Read the body as text without consuming it.
    ///
    /// Invalid UTF-8 sequences are replaced.
    #[must_use]
    pub fn peek_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 401.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Deserialize the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        crate::from_json(&self.body)
    }

    /// Turn a non-2xx response into [`crate::Error::Http`].
    ///
    /// # Errors
    ///
    /// Returns the HTTP error, carrying the body, when the status is not 2xx.
    pub fn error_for_status(self) -> crate::Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let message = http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("unexpected status")
            .to_string();
        Err(crate::Error::http(self.status, message, Some(self.body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_status_checks() {
        let response = Response::new(200, Headers::new(), Bytes::new());
        assert!(response.is_success());

        let response = Response::new(401, Headers::new(), Bytes::new());
        assert!(response.is_unauthorized());
        assert!(response.is_client_error());

        let response = Response::new(503, Headers::new(), Bytes::new());
        assert!(response.is_server_error());
        assert!(!response.is_success());
    }

    #[test]
    fn peek_text_leaves_body_intact() {
        let response = Response::new(200, Headers::new(), r#"{"id":42}"#);

        assert_eq!(response.peek_text(), r#"{"id":42}"#);
        assert_eq!(response.peek_text(), r#"{"id":42}"#);
        assert_eq!(response.into_body(), Bytes::from(r#"{"id":42}"#));
    }

    #[test]
    fn response_json() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct User {
            id: u64,
        }

        let response = Response::new(200, Headers::new(), r#"{"id":1}"#);
        let user: User = response.json().expect("deserialize");
        assert_eq!(user, User { id: 1 });
    }

    #[test]
    fn error_for_status_keeps_body() {
        let response = Response::new(404, Headers::new(), "missing");
        let err = response.error_for_status().expect_err("404 is an error");

        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "HTTP error 404: Not Found");
        assert_eq!(err.body(), Some(&Bytes::from("missing")));
    }
}
