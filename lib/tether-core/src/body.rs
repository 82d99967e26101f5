//! Body serialization utilities and pluggable body codecs.
//!
//! The pipeline treats bodies as opaque [`Bytes`]. Typed calls go through a
//! list of [`BodyCodec`]s: the first codec accepting the response media type
//! decodes it.

use std::fmt::Debug;

use bytes::Bytes;
use serde_json::Value;

use crate::Result;

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails, with the error message
/// including the path to the problematic field (e.g., "user.address.city").
///
/// # Example
///
/// ```
/// use tether_core::from_json;
/// use serde::Deserialize;
///
/// #[derive(Debug, PartialEq, Deserialize)]
/// struct User { name: String }
///
/// let user: User = from_json(br#"{"name":"Alice"}"#).expect("deserialize");
/// assert_eq!(user, User { name: "Alice".to_string() });
/// ```
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

/// Convert a decoded value into a typed one, keeping the failing path.
///
/// # Errors
///
/// Returns an error if the value does not have the shape of `T`.
pub fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_path_to_error::deserialize(value).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

/// Encodes request bodies and decodes response bodies.
pub trait BodyCodec: Debug + Send + Sync + 'static {
    /// Media type written in `Content-Type` for encoded bodies.
    fn media_type(&self) -> &'static str;

    /// Returns `true` if this codec can decode a body of `media_type`.
    ///
    /// `None` means the response carried no `Content-Type`.
    fn accepts(&self, media_type: Option<&str>) -> bool;

    /// Encode a value into a body.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn encode(&self, value: &Value) -> Result<Bytes>;

    /// Decode a body into a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed.
    fn decode(&self, body: &[u8]) -> Result<Value>;
}

fn essence(media_type: &str) -> &str {
    media_type.split(';').next().unwrap_or(media_type).trim()
}

/// JSON codec, optionally pretty-printing what it encodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Creates a compact JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Creates a codec that pretty-prints encoded bodies.
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl BodyCodec for JsonCodec {
    fn media_type(&self) -> &'static str {
        "application/json"
    }

    fn accepts(&self, media_type: Option<&str>) -> bool {
        media_type.is_none_or(|media_type| {
            let essence = essence(media_type);
            essence.eq_ignore_ascii_case("application/json")
                || essence.to_ascii_lowercase().ends_with("+json")
        })
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(Bytes::from(bytes))
    }

    fn decode(&self, body: &[u8]) -> Result<Value> {
        if body.is_empty() {
            return Ok(Value::Null);
        }
        from_json(body)
    }
}

/// Plain text codec: bodies are decoded into JSON strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl BodyCodec for TextCodec {
    fn media_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn accepts(&self, media_type: Option<&str>) -> bool {
        media_type.is_some_and(|media_type| {
            essence(media_type)
                .to_ascii_lowercase()
                .starts_with("text/")
        })
    }

    fn encode(&self, value: &Value) -> Result<Bytes> {
        match value {
            Value::String(text) => Ok(Bytes::from(text.clone())),
            other => Ok(Bytes::from(other.to_string())),
        }
    }

    fn decode(&self, body: &[u8]) -> Result<Value> {
        Ok(Value::String(String::from_utf8_lossy(body).into_owned()))
    }
}
