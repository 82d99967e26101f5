//! Default transport using hyper-util.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower_service::Service;

use crate::{
    Error, Headers, Request, Response, Result, config::NetworkConfiguration,
    connector::https_connector, middleware::RequestTimeouts,
};

/// HTTP transport with connection pooling and TLS.
///
/// Timeouts come from the request's [`RequestTimeouts`] extension, falling
/// back to the configuration defaults:
/// - up to the response head: `read + connect + write`, only when a read
///   timeout is known;
/// - body collection: `read`.
///
/// The configured connect timeout also bounds the connector itself.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    defaults: RequestTimeouts,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a transport configured from `config`.
    #[must_use]
    pub fn new(config: &NetworkConfiguration) -> Self {
        let connector = https_connector(config.connect_timeout());

        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_idle_per_host())
            .build(connector);

        Self {
            inner,
            defaults: RequestTimeouts {
                connect: config.connect_timeout(),
                read: config.read_timeout(),
                write: config.write_timeout(),
            },
        }
    }

    /// Timeouts applied when a request carries no override.
    #[must_use]
    pub const fn defaults(&self) -> RequestTimeouts {
        self.defaults
    }

    fn build_hyper_request(request: Request) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, headers, body, _extensions) = request.into_parts();

        let mut builder = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str());

        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }

        let body = body.map_or_else(Full::default, Full::new);
        builder
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    fn extract_headers(headers: &http::HeaderMap) -> Headers {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        let timeouts = request
            .extensions()
            .get::<RequestTimeouts>()
            .copied()
            .unwrap_or_default()
            .or(self.defaults);
        let origin = request.head();
        let hyper_request = Self::build_hyper_request(request)?;

        let response = with_deadline(timeouts.head_budget(), self.inner.request(hyper_request))
            .await?
            .map_err(Self::map_hyper_error)?;

        let status = response.status().as_u16();
        let headers = Self::extract_headers(response.headers());

        let body = with_deadline(timeouts.read, response.into_body().collect())
            .await?
            .map_err(|e| Error::connection(e.to_string()))?
            .to_bytes();

        Ok(Response::new(status, headers, body).with_request(origin))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = err.to_string();

        if err.is_connect() {
            return Error::connection(msg);
        }

        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

async fn with_deadline<F: Future>(limit: Option<Duration>, future: F) -> Result<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| Error::Timeout),
        None => Ok(future.await),
    }
}

impl Service<Request> for HyperTransport {
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.execute(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    fn config() -> NetworkConfiguration {
        NetworkConfiguration::builder("https://api.example.com")
            .connect_timeout(Duration::from_secs(2))
            .read_timeout(Duration::from_secs(10))
            .build()
            .expect("valid config")
    }

    #[test]
    fn defaults_come_from_configuration() {
        let transport = HyperTransport::new(&config());
        let defaults = transport.defaults();

        assert_eq!(defaults.connect, Some(Duration::from_secs(2)));
        assert_eq!(defaults.read, Some(Duration::from_secs(10)));
        assert_eq!(defaults.write, None);
    }

    #[test]
    fn hyper_request_carries_headers_not_extensions() {
        let url = url::Url::parse("https://api.example.com/users").expect("url");
        let request = Request::builder(Method::Post, url)
            .header("X-Trace", "abc")
            .extension(RequestTimeouts::default())
            .body("{}")
            .build();

        let hyper_request = HyperTransport::build_hyper_request(request).expect("valid request");

        assert_eq!(hyper_request.method(), http::Method::POST);
        assert_eq!(
            hyper_request.headers().get("x-trace").map(|v| v.as_bytes()),
            Some(&b"abc"[..])
        );
        assert!(hyper_request.extensions().get::<RequestTimeouts>().is_none());
    }

    #[test]
    fn response_headers_keep_repeated_values() {
        let mut map = http::HeaderMap::new();
        map.append("set-cookie", http::HeaderValue::from_static("a=1"));
        map.append("set-cookie", http::HeaderValue::from_static("b=2"));

        let headers = HyperTransport::extract_headers(&map);

        assert_eq!(
            headers.get_all("Set-Cookie").collect::<Vec<_>>(),
            vec!["a=1", "b=2"]
        );
    }

    #[tokio::test]
    async fn deadline_maps_to_timeout_error() {
        let result = with_deadline(Some(Duration::from_millis(5)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout)));
    }
}
