//! Client configuration built from pure `with_*` transformations.
//!
//! Provides transport-agnostic configuration for every generated client:
//! - Target address and TLS mode
//! - Timeouts, retry policy and default headers
//! - Telemetry switch and endpoint
//! - Transport-specific sections for gRPC ([`GrpcOptions`]) and GraphQL ([`GraphQlOptions`])
//!
//! A [`ClientConfig`] is a plain value: each `with_*` method consumes it and
//! returns the modified copy. Clients take their own frozen copy at
//! construction, so edits made afterwards never reach a live client.
//! The target is not validated here; an invalid target is reported when a
//! transport binding is created.

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigSnafu, ConnectionSnafu, Result},
    metrics::SdkMetrics,
};

/// Default request timeout (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of re-attempts after the first failure.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default fixed delay between attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default receive/send cap for binary transports (4 MiB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Default HTTP/2 keep-alive ping interval.
const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default HTTP/2 keep-alive ping timeout.
const DEFAULT_KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default GraphQL selection-set nesting limit.
const DEFAULT_MAX_QUERY_DEPTH: usize = 15;

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_keep_alive_interval() -> Duration {
    DEFAULT_KEEP_ALIVE_INTERVAL
}

fn default_keep_alive_timeout() -> Duration {
    DEFAULT_KEEP_ALIVE_TIMEOUT
}

fn default_max_query_depth() -> usize {
    DEFAULT_MAX_QUERY_DEPTH
}

fn default_user_agent() -> String {
    concat!("relaykit/", env!("CARGO_PKG_VERSION")).to_owned()
}

fn default_true() -> bool {
    true
}

/// Configuration shared by REST, gRPC and GraphQL clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL (REST, GraphQL) or server address (gRPC).
    target: String,

    /// TLS settings; `None` means plaintext.
    #[serde(default)]
    tls: Option<TlsConfig>,

    /// Per-attempt request timeout. Zero means "use the default".
    #[serde(default = "default_timeout", with = "humantime_serde")]
    timeout: Duration,

    /// Connection establishment timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    connect_timeout: Duration,

    /// Retry bounds for transient failures.
    #[serde(default)]
    retry: RetryPolicy,

    /// Headers attached to every request, keyed by lowercase name.
    #[serde(default, deserialize_with = "header_names::deserialize")]
    default_headers: HashMap<String, String>,

    /// `User-Agent` sent with every request.
    #[serde(default = "default_user_agent")]
    user_agent: String,

    /// Telemetry switch and endpoint.
    #[serde(default)]
    telemetry: TelemetryConfig,

    /// Keep-alive settings for pooled connections.
    #[serde(default)]
    keep_alive: KeepAliveConfig,

    /// Settings that only apply to gRPC bindings.
    #[serde(default)]
    grpc: GrpcOptions,

    /// Settings that only apply to GraphQL clients.
    #[serde(default)]
    graphql: GraphQlOptions,

    /// Explicit metrics sink; overrides the telemetry-derived default.
    #[serde(skip)]
    metrics: Option<Arc<dyn SdkMetrics>>,
}

impl ClientConfig {
    /// Creates a configuration for `target` with every other option defaulted.
    ///
    /// Defaults: 30s timeout, 3 retries, 1s retry delay, telemetry on, no TLS,
    /// 4 MiB message caps.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            tls: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryPolicy::default(),
            default_headers: HashMap::new(),
            user_agent: default_user_agent(),
            telemetry: TelemetryConfig::default(),
            keep_alive: KeepAliveConfig::default(),
            grpc: GrpcOptions::default(),
            graphql: GraphQlOptions::default(),
            metrics: None,
        }
    }

    /// Parses a configuration from a TOML document.
    ///
    /// Durations use humantime notation (`"250ms"`, `"30s"`). Keys that are
    /// absent take their defaults; `target` is required.
    ///
    /// # Example
    ///
    /// ```
    /// use relaykit_sdk::ClientConfig;
    ///
    /// let config = ClientConfig::from_toml_str(r#"
    ///     target = "https://api.example.com/v1"
    ///     timeout = "10s"
    ///
    ///     [retry]
    ///     max_retries = 5
    ///     retry_delay = "200ms"
    /// "#).unwrap();
    /// assert_eq!(config.retry_policy().max_retries, 5);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`](crate::SdkError::Config) if the document
    /// is not valid TOML or does not match the schema.
    pub fn from_toml_str(document: &str) -> Result<Self> {
        toml::from_str(document)
            .map_err(|e| ConfigSnafu { message: format!("invalid client config: {e}") }.build())
    }

    /// Returns the configured target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the TLS settings if TLS is enabled.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// Returns the per-attempt timeout, never zero.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        if self.timeout.is_zero() { DEFAULT_TIMEOUT } else { self.timeout }
    }

    /// Returns the connection timeout, never zero.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        if self.connect_timeout.is_zero() { DEFAULT_CONNECT_TIMEOUT } else { self.connect_timeout }
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the default headers.
    #[must_use]
    pub fn default_headers(&self) -> &HashMap<String, String> {
        &self.default_headers
    }

    /// Returns the `User-Agent` value.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Returns the telemetry settings.
    #[must_use]
    pub fn telemetry(&self) -> &TelemetryConfig {
        &self.telemetry
    }

    /// Returns the keep-alive settings.
    #[must_use]
    pub fn keep_alive(&self) -> &KeepAliveConfig {
        &self.keep_alive
    }

    /// Returns the gRPC-specific settings.
    #[must_use]
    pub fn grpc(&self) -> &GrpcOptions {
        &self.grpc
    }

    /// Returns the GraphQL-specific settings.
    #[must_use]
    pub fn graphql(&self) -> &GraphQlOptions {
        &self.graphql
    }

    /// Returns the explicitly configured metrics sink, if any.
    #[must_use]
    pub fn metrics(&self) -> Option<&Arc<dyn SdkMetrics>> {
        self.metrics.as_ref()
    }

    /// Enables TLS with the given settings.
    ///
    /// When TLS is enabled, REST and GraphQL targets must use `https://`.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Disables TLS.
    #[must_use]
    pub fn without_tls(mut self) -> Self {
        self.tls = None;
        self
    }

    /// Sets the per-attempt timeout. Zero restores the default.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connection establishment timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the retry count and fixed delay.
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.retry = RetryPolicy { max_retries, retry_delay };
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Adds a default header, replacing any previous value for the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(header_key(name), value.into());
        self
    }

    /// Merges several default headers (last write wins per name, ignoring
    /// case).
    #[must_use]
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.default_headers.extend(headers.into_iter().map(|(k, v)| (header_key(k), v.into())));
        self
    }

    /// Sets the `User-Agent` value.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Configures telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, enabled: bool, endpoint: Option<String>) -> Self {
        self.telemetry = TelemetryConfig { enabled, endpoint };
        self
    }

    /// Sets the maximum receive and send message sizes for binary transports.
    #[must_use]
    pub fn with_message_size(mut self, max_receive: usize, max_send: usize) -> Self {
        self.grpc.max_receive_message_size = max_receive;
        self.grpc.max_send_message_size = max_send;
        self
    }

    /// Configures keep-alive pings for connection-oriented transports.
    #[must_use]
    pub fn with_keep_alive(
        mut self,
        interval: Duration,
        timeout: Duration,
        permit_without_stream: bool,
    ) -> Self {
        self.keep_alive = KeepAliveConfig { interval, timeout, permit_without_stream };
        self
    }

    /// Sets the maximum GraphQL selection-set depth. Zero disables the check.
    #[must_use]
    pub fn with_max_query_depth(mut self, depth: usize) -> Self {
        self.graphql.max_query_depth = depth;
        self
    }

    /// Allows or forbids GraphQL introspection queries.
    #[must_use]
    pub fn with_introspection(mut self, enabled: bool) -> Self {
        self.graphql.introspection = enabled;
        self
    }

    /// Installs an explicit metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn SdkMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// TLS settings for secure connections.
///
/// # Example
///
/// ```
/// use relaykit_sdk::TlsConfig;
///
/// let tls = TlsConfig::new()
///     .with_server_name("api.internal")
///     .with_ca_cert_pem("-----BEGIN CERTIFICATE-----\n...");
/// assert_eq!(tls.server_name(), Some("api.internal"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Server name used for certificate verification, overriding the target host.
    #[serde(default)]
    server_name: Option<String>,

    /// Inline PEM bundle of trusted CA certificates.
    #[serde(default)]
    ca_cert_pem: Option<String>,

    /// Path to a PEM bundle of trusted CA certificates.
    #[serde(default)]
    ca_cert_path: Option<PathBuf>,
}

impl TlsConfig {
    /// Creates TLS settings that trust the bundled web PKI roots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the server name used for verification.
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    /// Trusts the CA certificates in the given PEM string.
    #[must_use]
    pub fn with_ca_cert_pem(mut self, pem: impl Into<String>) -> Self {
        self.ca_cert_pem = Some(pem.into());
        self
    }

    /// Trusts the CA certificates in the PEM file at `path`.
    #[must_use]
    pub fn with_ca_cert_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Returns the server name override.
    #[must_use]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Loads the configured CA bundle, if any. Inline PEM wins over a path.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Connection`](crate::SdkError::Connection) if the
    /// file cannot be read.
    pub fn ca_certificate(&self) -> Result<Option<Vec<u8>>> {
        if let Some(pem) = &self.ca_cert_pem {
            return Ok(Some(pem.as_bytes().to_vec()));
        }
        match &self.ca_cert_path {
            Some(path) => std::fs::read(path).map(Some).map_err(|e| {
                ConnectionSnafu {
                    message: format!("failed to read CA bundle {}: {e}", path.display()),
                }
                .build()
            }),
            None => Ok(None),
        }
    }
}

/// Retry bounds for transient failures.
///
/// The delay between attempts is fixed. With `max_retries = 3` a call makes
/// at most four attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Re-attempts permitted after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay before each re-attempt.
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES, retry_delay: DEFAULT_RETRY_DELAY }
    }
}

#[bon::bon]
impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use relaykit_sdk::RetryPolicy;
    ///
    /// let policy = RetryPolicy::builder()
    ///     .max_retries(5)
    ///     .retry_delay(Duration::from_millis(200))
    ///     .build();
    /// assert_eq!(policy.max_retries, 5);
    /// ```
    #[builder]
    #[must_use]
    pub fn new(
        #[builder(default = DEFAULT_MAX_RETRIES)] max_retries: u32,
        #[builder(default = DEFAULT_RETRY_DELAY)] retry_delay: Duration,
    ) -> Self {
        Self { max_retries, retry_delay }
    }
}

impl RetryPolicy {
    /// Creates a policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self { max_retries: 0, ..Default::default() }
    }
}

/// Telemetry switch and collector endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether metrics and trace propagation are active.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Collector endpoint advertised to exporters.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true, endpoint: None }
    }
}

/// Settings applied only to gRPC bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcOptions {
    /// Largest message accepted from the server, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_receive_message_size: usize,

    /// Largest message sent to the server, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_send_message_size: usize,

}

impl Default for GrpcOptions {
    fn default() -> Self {
        Self {
            max_receive_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_send_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// TCP and HTTP/2 keep-alive settings shared by the HTTP and gRPC bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAliveConfig {
    /// Interval between HTTP/2 keep-alive pings. Zero disables pings.
    #[serde(default = "default_keep_alive_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// How long to wait for a keep-alive acknowledgement.
    #[serde(default = "default_keep_alive_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Send keep-alive pings even when no call is in flight.
    #[serde(default = "default_true")]
    pub permit_without_stream: bool,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            timeout: DEFAULT_KEEP_ALIVE_TIMEOUT,
            permit_without_stream: true,
        }
    }
}

/// Settings applied only to GraphQL clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlOptions {
    /// Maximum selection-set nesting accepted before sending. Zero disables the check.
    #[serde(default = "default_max_query_depth")]
    pub max_query_depth: usize,

    /// Whether `__schema` / `__type` introspection documents may be sent.
    #[serde(default)]
    pub introspection: bool,
}

impl Default for GraphQlOptions {
    fn default() -> Self {
        Self { max_query_depth: DEFAULT_MAX_QUERY_DEPTH, introspection: false }
    }
}

/// Normalizes a header name so that names differing only in case share one
/// entry.
pub(crate) fn header_key(name: impl Into<String>) -> String {
    let mut name = name.into();
    name.make_ascii_lowercase();
    name
}

mod header_names {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let headers = HashMap::<String, String>::deserialize(deserializer)?;
        Ok(headers.into_iter().map(|(name, value)| (super::header_key(name), value)).collect())
    }
}

/// Duration serialization using humantime format.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
