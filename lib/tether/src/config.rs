//! Network configuration.
//!
//! A [`NetworkConfiguration`] is built once, validated, and then shared
//! read-only by every interceptor and the transport.

use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::{Error, Result};

/// Default wait for a token refresh to settle.
pub const DEFAULT_REFRESH_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry policy: `max_retries` attempts, spaced by an exponential backoff
/// starting at `initial_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts.
    pub max_retries: u32,
    /// Delay before the second attempt; doubled after each transport failure.
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }
}

/// Verbosity of the logging interceptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// No logging.
    None,
    /// Request line, status and duration.
    #[default]
    Basic,
    /// Basic, plus request and response headers.
    Headers,
    /// Headers, plus request and response bodies.
    Body,
}

/// Logging policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingConfiguration {
    /// Verbosity.
    pub level: LogLevel,
    /// Log `Authorization`/`Cookie` values and curl commands instead of redacting them.
    pub debug_private_data: bool,
}

/// Static headers added to requests whose host matches a pattern.
#[derive(Debug, Clone)]
pub struct HeaderInjection {
    headers: Vec<(String, String)>,
    host_pattern: Regex,
}

impl HeaderInjection {
    /// Headers to add, in configuration order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns `true` if the whole `host` matches the configured pattern.
    #[must_use]
    pub fn matches_host(&self, host: &str) -> bool {
        self.host_pattern.is_match(host)
    }
}

/// Immutable configuration of a network context.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tether::{NetworkConfiguration, RetryPolicy};
///
/// let config = NetworkConfiguration::builder("https://api.example.com")
///     .read_timeout(Duration::from_secs(20))
///     .retry(RetryPolicy::new(3, Duration::from_millis(100)))
///     .header("X-Client", "tether")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct NetworkConfiguration {
    base_url: String,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    refresh_token_timeout: Duration,
    retry: Option<RetryPolicy>,
    header_injection: HeaderInjection,
    logging: LoggingConfiguration,
    pretty_json: bool,
    pool_idle_per_host: usize,
    pool_idle_timeout: Duration,
}

impl NetworkConfiguration {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder(base_url: impl Into<String>) -> NetworkConfigurationBuilder {
        NetworkConfigurationBuilder::new(base_url)
    }

    /// Default base URL of created services, always ending with `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Default read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Default write timeout.
    #[must_use]
    pub const fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// How long a 401 waits for the token refresh to settle.
    #[must_use]
    pub const fn refresh_token_timeout(&self) -> Duration {
        self.refresh_token_timeout
    }

    /// Retry policy; `None` disables retry.
    #[must_use]
    pub const fn retry(&self) -> Option<RetryPolicy> {
        self.retry
    }

    /// Header injection policy.
    #[must_use]
    pub const fn header_injection(&self) -> &HeaderInjection {
        &self.header_injection
    }

    /// Logging policy.
    #[must_use]
    pub const fn logging(&self) -> LoggingConfiguration {
        self.logging
    }

    /// Whether JSON request bodies are pretty-printed.
    #[must_use]
    pub const fn pretty_json(&self) -> bool {
        self.pretty_json
    }

    /// Maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(&self) -> usize {
        self.pool_idle_per_host
    }

    /// Idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(&self) -> Duration {
        self.pool_idle_timeout
    }
}

/// Builder for [`NetworkConfiguration`].
#[derive(Debug, Clone)]
pub struct NetworkConfigurationBuilder {
    base_url: String,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    refresh_token_timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    headers: Vec<(String, String)>,
    host_pattern: Option<String>,
    logging: LoggingConfiguration,
    pretty_json: bool,
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
}

impl NetworkConfigurationBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            refresh_token_timeout: None,
            retry: None,
            headers: Vec::new(),
            host_pattern: None,
            logging: LoggingConfiguration::default(),
            pretty_json: false,
            pool_idle_per_host: None,
            pool_idle_timeout: None,
        }
    }

    /// Set the default connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the default read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the default write timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Set how long a 401 waits for a token refresh.
    #[must_use]
    pub const fn refresh_token_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_token_timeout = Some(timeout);
        self
    }

    /// Enable retry with the given policy.
    #[must_use]
    pub const fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Add a header injected into matching requests.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add several injected headers.
    #[must_use]
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Regular expression the whole request host must match for header
    /// injection. Defaults to the base URL's host.
    #[must_use]
    pub fn host_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.host_pattern = Some(pattern.into());
        self
    }

    /// Set the logging verbosity.
    #[must_use]
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.logging.level = level;
        self
    }

    /// Log private header values and curl commands.
    #[must_use]
    pub const fn debug_private_data(mut self, enabled: bool) -> Self {
        self.logging.debug_private_data = enabled;
        self
    }

    /// Pretty-print JSON request bodies.
    #[must_use]
    pub const fn pretty_json(mut self, enabled: bool) -> Self {
        self.pretty_json = enabled;
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute URL with a host, or
    /// if the host pattern is not a valid regular expression.
    pub fn build(self) -> Result<NetworkConfiguration> {
        let base_url = ensure_trailing_slash(&self.base_url);
        let parsed = Url::parse(&base_url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::configuration(format!("base URL has no host: {base_url}")))?;

        let pattern = self
            .host_pattern
            .unwrap_or_else(|| regex::escape(host));
        let host_pattern = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| {
            Error::configuration(format!("invalid host pattern {pattern:?}: {err}"))
        })?;

        Ok(NetworkConfiguration {
            base_url,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            refresh_token_timeout: self
                .refresh_token_timeout
                .unwrap_or(DEFAULT_REFRESH_TOKEN_TIMEOUT),
            retry: self.retry,
            header_injection: HeaderInjection {
                headers: self.headers,
                host_pattern,
            },
            logging: self.logging,
            pretty_json: self.pretty_json,
            pool_idle_per_host: self.pool_idle_per_host.unwrap_or(32),
            pool_idle_timeout: self
                .pool_idle_timeout
                .unwrap_or(Duration::from_secs(90)),
        })
    }
}

/// Append a `/` to `url` unless it already ends with one.
#[must_use]
pub fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = NetworkConfiguration::builder("https://api.example.com")
            .build()
            .expect("valid config");

        assert_eq!(config.base_url(), "https://api.example.com/");
        assert_eq!(config.refresh_token_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry(), None);
        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.logging().level, LogLevel::Basic);
        assert!(!config.logging().debug_private_data);
        assert_eq!(config.pool_idle_per_host(), 32);
    }

    #[test]
    fn builder_overrides() {
        let config = NetworkConfiguration::builder("https://api.example.com/v1/")
            .connect_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_secs(20))
            .refresh_token_timeout(Duration::from_secs(3))
            .retry(RetryPolicy::new(3, Duration::from_millis(100)))
            .log_level(LogLevel::Body)
            .build()
            .expect("valid config");

        assert_eq!(config.base_url(), "https://api.example.com/v1/");
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(20)));
        assert_eq!(config.refresh_token_timeout(), Duration::from_secs(3));
        assert_eq!(
            config.retry(),
            Some(RetryPolicy::new(3, Duration::from_millis(100)))
        );
        assert_eq!(config.logging().level, LogLevel::Body);
    }

    #[test]
    fn host_pattern_defaults_to_base_url_host() {
        let config = NetworkConfiguration::builder("https://api.example.com")
            .header("X-Client", "tether")
            .build()
            .expect("valid config");

        let injection = config.header_injection();
        assert!(injection.matches_host("api.example.com"));
        assert!(!injection.matches_host("apixexample.com"));
        assert!(!injection.matches_host("cdn.api.example.com"));
    }

    #[test]
    fn host_pattern_must_match_whole_host() {
        let config = NetworkConfiguration::builder("https://api.example.com")
            .host_pattern(r".*\.example\.com")
            .build()
            .expect("valid config");

        let injection = config.header_injection();
        assert!(injection.matches_host("cdn.example.com"));
        assert!(!injection.matches_host("cdn.example.com.evil.org"));
    }

    #[test]
    fn invalid_host_pattern_is_rejected() {
        let err = NetworkConfiguration::builder("https://api.example.com")
            .host_pattern("(")
            .build()
            .expect_err("invalid regex");
        assert!(err.is_configuration());
    }

    #[test]
    fn base_url_must_be_absolute() {
        let err = NetworkConfiguration::builder("not a url")
            .build()
            .expect_err("invalid url");
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn trailing_slash_is_added_once() {
        assert_eq!(ensure_trailing_slash("https://a.io"), "https://a.io/");
        assert_eq!(ensure_trailing_slash("https://a.io/"), "https://a.io/");
    }
}
