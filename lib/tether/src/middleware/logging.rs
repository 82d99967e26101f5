//! Request/response logging middleware.
//!
//! Logs through `tracing`, with a verbosity chosen by [`LogLevel`]:
//!
//! | Level | Logged |
//! |-------|--------|
//! | `None` | nothing |
//! | `Basic` | method, URL, status, duration |
//! | `Headers` | Basic + headers |
//! | `Body` | Headers + bodies (JSON pretty-printed) |
//!
//! `Authorization` and `Cookie` values are redacted unless private data
//! logging is enabled, in which case a replayable curl command is also
//! emitted for each request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{Instrument, Level, debug, info, span, warn};

use crate::{Error, Headers, LogLevel, LoggingConfiguration, Request, Response, Result};

const REDACTED: &str = "██";
const PRIVATE_HEADERS: [&str; 2] = ["authorization", "cookie"];

/// Layer that adds request/response logging.
///
/// # Example
///
/// ```ignore
/// use tether::middleware::LoggingLayer;
/// use tether::{LogLevel, LoggingConfiguration};
///
/// let layer = LoggingLayer::new(LoggingConfiguration {
///     level: LogLevel::Headers,
///     debug_private_data: false,
/// });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    config: LoggingConfiguration,
}

impl LoggingLayer {
    /// Create a logging layer.
    #[must_use]
    pub const fn new(config: LoggingConfiguration) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            config: self.config,
        }
    }
}

/// Service that logs requests and responses.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    config: LoggingConfiguration,
}

fn is_private(name: &str) -> bool {
    PRIVATE_HEADERS.iter().any(|p| p.eq_ignore_ascii_case(name))
}

/// Render headers one per line, redacting private values unless `reveal`.
fn render_headers(headers: &Headers, reveal: bool) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if reveal || !is_private(name) { value } else { REDACTED };
            format!("{name}: {value}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a body, pretty-printing it when it parses as JSON.
fn render_body(body: &[u8]) -> String {
    if body.is_empty() {
        return "(empty)".to_string();
    }
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Render `request` as a curl command line.
///
/// Header values are not redacted.
#[must_use]
pub fn to_curl(request: &Request) -> String {
    let mut command = format!("curl -X {}", request.method());
    for (name, value) in request.headers().iter() {
        command.push_str(" -H ");
        command.push_str(&shell_quote(&format!("{name}: {value}")));
    }
    if let Some(body) = request.body().filter(|body| !body.is_empty()) {
        command.push_str(" --data ");
        command.push_str(&shell_quote(&String::from_utf8_lossy(body)));
    }
    command.push(' ');
    command.push_str(&shell_quote(request.url().as_str()));
    command
}

fn log_request(config: LoggingConfiguration, request: &Request) {
    let reveal = config.debug_private_data;
    match config.level {
        LogLevel::None => {}
        LogLevel::Basic => info!("sending request"),
        LogLevel::Headers => {
            info!(headers = %render_headers(request.headers(), reveal), "sending request");
        }
        LogLevel::Body => {
            let body = request.body().map_or_else(|| "(empty)".to_string(), |b| render_body(b));
            info!(
                headers = %render_headers(request.headers(), reveal),
                body = %body,
                "sending request"
            );
        }
    }
    if reveal {
        debug!(curl = %to_curl(request), "replay");
    }
}

fn log_response(config: LoggingConfiguration, response: &Response, elapsed_ms: u64) {
    let status = response.status();
    let headers = matches!(config.level, LogLevel::Headers | LogLevel::Body)
        .then(|| render_headers(response.headers(), config.debug_private_data));
    let body = matches!(config.level, LogLevel::Body).then(|| render_body(response.body()));
    let (headers, body) = (headers.as_deref(), body.as_deref());

    if response.is_success() {
        info!(status, elapsed_ms, headers, body, "request completed");
    } else {
        warn!(status, elapsed_ms, headers, body, "request failed with HTTP error");
    }
}

impl<S> Service<Request> for Logging<S>
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
        let config = self.config;
        let mut inner = self.inner.clone();
        if config.level == LogLevel::None {
            return Box::pin(async move { inner.call(request).await });
        }

        let method = request.method();
        let url = request.url().to_string();
        let span = span!(Level::INFO, "http_request", %method, %url);

        Box::pin(
            async move {
                log_request(config, &request);
                let start = Instant::now();

                let result = inner.call(request).await;

                // Saturating conversion to u64
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                match &result {
                    Ok(response) => log_response(config, response, elapsed_ms),
                    Err(err) => warn!(error = %err, elapsed_ms, "request failed"),
                }

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{ScriptedTransport, get};
    use crate::{Method, RequestBuilder};

    fn headers() -> Headers {
        [
            ("Accept", "application/json"),
            ("Authorization", "Bearer secret"),
            ("cookie", "session=abc"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn private_headers_are_redacted() {
        insta::assert_snapshot!(render_headers(&headers(), false), @r"
        Accept: application/json
        Authorization: ██
        cookie: ██
        ");
    }

    #[test]
    fn private_headers_can_be_revealed() {
        let rendered = render_headers(&headers(), true);
        assert!(rendered.contains("Authorization: Bearer secret"));
        assert!(rendered.contains("cookie: session=abc"));
    }

    #[test]
    fn json_bodies_are_pretty_printed() {
        insta::assert_snapshot!(render_body(br#"{"id":1,"tags":["a"]}"#), @r#"
        {
          "id": 1,
          "tags": [
            "a"
          ]
        }
        "#);
        assert_eq!(render_body(b"plain text"), "plain text");
        assert_eq!(render_body(b""), "(empty)");
    }

    #[test]
    fn curl_command_replays_request() {
        let url = url::Url::parse("https://api.example.com/users").expect("url");
        let request = RequestBuilder::new(Method::Post, url)
            .header("Content-Type", "application/json")
            .header("Authorization", "Bearer abc")
            .body(r#"{"name":"o'hara"}"#)
            .build();

        insta::assert_snapshot!(to_curl(&request), @r#"curl -X POST -H 'Content-Type: application/json' -H 'Authorization: Bearer abc' --data '{"name":"o'\''hara"}' 'https://api.example.com/users'"#);
    }

    #[test]
    fn curl_command_without_headers_or_body() {
        insta::assert_snapshot!(to_curl(&get("https://api.example.com/users?page=2")), @"curl -X GET 'https://api.example.com/users?page=2'");
        assert_eq!(render_headers(&Headers::new(), false), "");
    }

    #[tokio::test]
    async fn every_level_passes_the_response_through() {
        for level in [LogLevel::None, LogLevel::Basic, LogLevel::Headers, LogLevel::Body] {
            let transport = ScriptedTransport::status(404);
            let layer = LoggingLayer::new(LoggingConfiguration {
                level,
                debug_private_data: true,
            });

            let response = layer
                .layer(transport.clone())
                .oneshot(get("https://api.example.com/missing"))
                .await
                .expect("response");

            assert_eq!(response.status(), 404);
            assert_eq!(transport.calls(), 1);
        }
    }
}
