//! Client configuration for the Danube Cloud API.
//!
//! This module provides the configuration structure consumed by
//! [`crate::client::DanubeClient`], covering the endpoint, credentials,
//! TLS behavior, timeouts, and the rate-limit/retry tuning knobs.

use crate::Error;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default API version header value sent with every request.
pub const DEFAULT_API_VERSION: &str = "~4.2";

/// Per-request socket timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// How many attempts to make before failing when throttled by the server.
pub const DEFAULT_MAX_SEND_ATTEMPTS: u32 = 20;

/// Server-advertised maximum request rate.
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 45;

/// How long to wait before the next attempt when throttled, in seconds.
pub const DEFAULT_THROTTLE_COOLDOWN_SECS: u64 = 5;

/// Configuration for a Danube Cloud client instance.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct DanubeConfig {
    /// API base URL (e.g. "https://danube.example.com/api")
    #[validate(url)]
    pub api_url: String,

    /// API key sent in the `es-api-key` header
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// API version sent in the `X-Api-Version` header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Initial virtual datacenter scope, applied to requests by default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virt_datacenter: Option<String>,

    /// Whether to verify TLS certificates.
    ///
    /// Defaults to `false`: Danube Cloud appliances commonly run with
    /// self-signed certificates, and the client favors working out of the
    /// box over strict verification. Enable this when the endpoint carries
    /// a trusted certificate.
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Per-request socket timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum send attempts while the server keeps throttling
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,

    /// Server-advertised maximum requests per minute (must leave room for
    /// the one-request slack in the spacing computation)
    #[validate(range(min = 2, max = 6000))]
    #[serde(default = "default_max_requests_per_minute")]
    pub max_requests_per_minute: u32,

    /// Cooldown between attempts after a throttled response, in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_throttle_cooldown_secs")]
    pub throttle_cooldown_secs: u64,

    /// Log request and response bodies at debug level
    #[serde(default)]
    pub trace: bool,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

const fn default_tls_verify() -> bool {
    false
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_max_send_attempts() -> u32 {
    DEFAULT_MAX_SEND_ATTEMPTS
}

const fn default_max_requests_per_minute() -> u32 {
    DEFAULT_MAX_REQUESTS_PER_MINUTE
}

const fn default_throttle_cooldown_secs() -> u64 {
    DEFAULT_THROTTLE_COOLDOWN_SECS
}

impl DanubeConfig {
    /// Create a configuration with required parameters and defaults for the
    /// rest.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            api_url: api_url.into(),
            api_key: SecretString::from(api_key.into()),
            api_version: default_api_version(),
            virt_datacenter: None,
            tls_verify: default_tls_verify(),
            request_timeout_secs: default_request_timeout_secs(),
            max_send_attempts: default_max_send_attempts(),
            max_requests_per_minute: default_max_requests_per_minute(),
            throttle_cooldown_secs: default_throttle_cooldown_secs(),
            trace: false,
        };

        config
            .validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;

        Ok(config)
    }

    /// Set the API version header value.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Set the initial virtual datacenter scope.
    #[must_use]
    pub fn with_datacenter(mut self, dc: impl Into<String>) -> Self {
        self.virt_datacenter = Some(dc.into());
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set the per-request socket timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the maximum send attempts under throttling.
    #[must_use]
    pub const fn with_max_send_attempts(mut self, attempts: u32) -> Self {
        self.max_send_attempts = attempts;
        self
    }

    /// Set the server-advertised maximum requests per minute.
    #[must_use]
    pub const fn with_max_requests_per_minute(mut self, rate: u32) -> Self {
        self.max_requests_per_minute = rate;
        self
    }

    /// Set the post-throttle cooldown in seconds.
    #[must_use]
    pub const fn with_throttle_cooldown(mut self, seconds: u64) -> Self {
        self.throttle_cooldown_secs = seconds;
        self
    }

    /// Enable or disable body tracing.
    #[must_use]
    pub const fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get the throttle cooldown as a Duration.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.throttle_cooldown_secs)
    }

    /// Parse and validate the API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse_api_url(&self) -> Result<Url, Error> {
        Url::parse(&self.api_url)
            .map_err(|e| Error::ConfigError(format!("Invalid API URL: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn new_applies_defaults() {
        let config = DanubeConfig::new("https://danube.example.com/api", "key").unwrap();
        assert_eq!(config.api_version, "~4.2");
        assert!(!config.tls_verify);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.max_send_attempts, 20);
        assert_eq!(config.max_requests_per_minute, 45);
        assert_eq!(config.throttle_cooldown_secs, 5);
        assert!(!config.trace);
        assert!(config.virt_datacenter.is_none());
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(DanubeConfig::new("not-a-url", "key").is_err());
    }

    #[test]
    fn builder_methods() {
        let config = DanubeConfig::new("https://danube.example.com/api", "key")
            .unwrap()
            .with_api_version("~4.3")
            .with_datacenter("main")
            .with_tls_verify(true)
            .with_timeout(30)
            .with_max_send_attempts(5)
            .with_max_requests_per_minute(120)
            .with_throttle_cooldown(1)
            .with_trace(true);

        assert_eq!(config.api_version, "~4.3");
        assert_eq!(config.virt_datacenter.as_deref(), Some("main"));
        assert!(config.tls_verify);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_send_attempts, 5);
        assert_eq!(config.max_requests_per_minute, 120);
        assert_eq!(config.cooldown(), Duration::from_secs(1));
        assert!(config.trace);
    }

    #[test]
    fn validation_rejects_out_of_range_rate() {
        let mut config = DanubeConfig::new("https://danube.example.com/api", "key").unwrap();
        config.max_requests_per_minute = 1;
        assert!(config.validate().is_err());

        config.max_requests_per_minute = 45;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_api_url() {
        let config = DanubeConfig::new("https://danube.example.com:8443/api", "key").unwrap();
        let url = config.parse_api_url().unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("danube.example.com"));
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn api_key_never_serialized() {
        let config = DanubeConfig::new("https://danube.example.com/api", "s3cret").unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("s3cret"));
        assert_eq!(config.api_key.expose_secret(), "s3cret");
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{"api_url": "https://danube.example.com/api", "api_key": "k"}"#;
        let config: DanubeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_send_attempts, 20);
        assert!(!config.tls_verify);
    }
}
