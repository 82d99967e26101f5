//! Base-URL-bound client and typed service contracts.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ensure_trailing_slash;
use crate::{BodyCodec, Chain, Error, Method, Request, RequestBuilder, Response, Result, from_value};

/// Client bound to a base URL, sending requests through a [`Chain`].
///
/// Relative paths are resolved against the base URL, which always ends
/// with `/`. Bodies are encoded with the first codec and decoded with the
/// first codec accepting the response `Content-Type`.
///
/// # Example
///
/// ```ignore
/// let client = context.client_for(Some("https://api.example.com/v1"))?;
/// let user: User = client.get_json("users/42").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    chain: Chain,
    codecs: Vec<Arc<dyn BodyCodec>>,
}

impl ApiClient {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or no codec is given.
    pub fn new(chain: Chain, base_url: &str, codecs: Vec<Arc<dyn BodyCodec>>) -> Result<Self> {
        if codecs.is_empty() {
            return Err(Error::configuration("at least one body codec is required"));
        }
        Ok(Self {
            base_url: Url::parse(&ensure_trailing_slash(base_url))?,
            chain,
            codecs,
        })
    }

    /// Base URL, ending with `/`.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The chain requests go through.
    #[must_use]
    pub const fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Codecs, in preference order.
    #[must_use]
    pub fn codecs(&self) -> &[Arc<dyn BodyCodec>] {
        &self.codecs
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Start a request to `path`.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(Request::builder(method, self.url(path)?))
    }

    /// Send a request through the chain.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.chain.execute(request).await
    }

    fn encoder(&self) -> Result<&Arc<dyn BodyCodec>> {
        self.codecs
            .first()
            .ok_or_else(|| Error::configuration("no body codec configured"))
    }

    fn encode<B: Serialize + ?Sized>(&self, builder: RequestBuilder, body: &B) -> Result<RequestBuilder> {
        let codec = self.encoder()?;
        let bytes = codec.encode(&serde_json::to_value(body)?)?;
        Ok(builder.header("Content-Type", codec.media_type()).body(bytes))
    }

    fn decode<T: DeserializeOwned>(&self, response: &Response) -> Result<T> {
        let content_type = response.header("Content-Type");
        let codec = self
            .codecs
            .iter()
            .find(|codec| codec.accepts(content_type))
            .ok_or_else(|| {
                Error::configuration(format!(
                    "no body codec accepts {}",
                    content_type.unwrap_or("a body without content type")
                ))
            })?;
        from_value(codec.decode(response.body())?)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let accept = self.encoder()?.media_type();
        let request = builder.header_if_absent("Accept", accept).build();
        self.execute(request).await?.error_for_status()
    }

    /// `GET` `path` and decode the response body.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-2xx statuses and undecodable bodies.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(self.request(Method::Get, path)?).await?;
        self.decode(&response)
    }

    /// Send `body` to `path` and decode the response body.
    pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.encode(self.request(method, path)?, body)?;
        let response = self.send(builder).await?;
        self.decode(&response)
    }

    /// Send an optional `body` to `path`, discarding the response body.
    pub async fn send_unit<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self.request(method, path)?;
        if let Some(body) = body {
            builder = self.encode(builder, body)?;
        }
        self.send(builder).await.map(drop)
    }
}

/// A typed API contract built on an [`ApiClient`].
///
/// # Example
///
/// ```ignore
/// struct UserApi {
///     client: Arc<ApiClient>,
/// }
///
/// impl ApiService for UserApi {
///     fn from_client(client: Arc<ApiClient>) -> Self {
///         Self { client }
///     }
/// }
///
/// impl UserApi {
///     async fn user(&self, id: u64) -> tether::Result<User> {
///         self.client.get_json(&format!("users/{id}")).await
///     }
/// }
/// ```
pub trait ApiService: Sized {
    /// Build the service on top of a shared client.
    fn from_client(client: Arc<ApiClient>) -> Self;
}
