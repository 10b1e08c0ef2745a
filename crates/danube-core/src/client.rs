//! The generic request dispatcher.
//!
//! [`DanubeClient`] is the single integration point every resource operation
//! goes through: it injects the active datacenter scope into the request,
//! applies the rate limiter before each attempt, retries throttled attempts
//! up to a fixed budget, classifies the response status, and decodes the
//! body through the envelope fallbacks. No operation talks to the HTTP
//! stack directly.

use crate::config::DanubeConfig;
use crate::envelope::decode_body;
use crate::error::{Error, Result};
use crate::limiter::RateLimiter;
use crate::request::{ApiRequest, Filter, Scoped, DATACENTER_PARAM};
use crate::version;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, DATE};
use reqwest::{Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "es-api-key";

/// Header carrying the requested API version.
const API_VERSION_HEADER: &str = "X-Api-Version";

const CONTENT_TYPE_JSON: &str = "application/json";

/// Client for the Danube Cloud API.
///
/// Owns the HTTP transport, credentials, rate limiter, and the active
/// datacenter scope. The scope and the limiter's last-request timestamp are
/// shared mutable state: switching the datacenter affects all subsequent
/// calls on this instance, and both fields are guarded for concurrent use.
pub struct DanubeClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    api_version: String,
    limiter: RateLimiter,
    max_send_attempts: u32,
    throttle_cooldown: Duration,
    trace: bool,
    datacenter: RwLock<Option<String>>,
}

impl DanubeClient {
    /// Build a client from a validated configuration.
    ///
    /// Redirects are never followed; the caller sees the raw redirect
    /// response. TLS verification follows `config.tls_verify` (off by
    /// default for self-signed infrastructure certificates).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(config: DanubeConfig) -> Result<Self> {
        let base_url = config.parse_api_url()?;
        let throttle_cooldown = config.cooldown();

        let mut builder = reqwest::ClientBuilder::new()
            .user_agent(version::user_agent())
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none());

        if !config.tls_verify {
            warn!("TLS verification disabled for Danube client");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|err| Error::ConfigError(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key,
            api_version: config.api_version,
            limiter: RateLimiter::new(config.max_requests_per_minute),
            max_send_attempts: config.max_send_attempts,
            throttle_cooldown,
            trace: config.trace,
            datacenter: RwLock::new(config.virt_datacenter),
        })
    }

    /// The API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The active datacenter scope, if any.
    ///
    /// The scope outlives a panic in another caller: a poisoned lock is
    /// recovered, since the held value is a plain string with no
    /// invariant a panic could have broken.
    #[must_use]
    pub fn datacenter(&self) -> Option<String> {
        self.datacenter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|dc| !dc.is_empty())
    }

    /// Switch the active datacenter scope. Last write wins and applies to
    /// all subsequent calls on this instance.
    pub fn switch_datacenter(&self, dc: impl Into<String>) {
        *self
            .datacenter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(dc.into());
    }

    /// Dispatch a request descriptor and decode the response.
    ///
    /// When a datacenter scope is active it is injected into the query
    /// filter (GET) or the body (non-GET, through [`Scoped`]) unless the
    /// descriptor already carries one. An empty accepted-status set defaults
    /// to `{200}`. An empty body with an accepted status yields
    /// `T::default()`.
    ///
    /// # Errors
    ///
    /// A classified HTTP error for unexpected statuses (the body is
    /// discarded unread), [`Error::MaxAttempts`] when the throttle budget is
    /// exhausted, or a decode error after all envelope fallbacks fail.
    pub async fn execute<B, T>(&self, request: ApiRequest<B>) -> Result<T>
    where
        B: Serialize + Scoped,
        T: DeserializeOwned + Default,
    {
        let accepted = request.accepted_statuses();
        let ApiRequest {
            method,
            path,
            mut filter,
            mut body,
            headers,
            ..
        } = request;

        if let Some(dc) = self.datacenter() {
            if method == Method::GET {
                let filter = filter.get_or_insert_with(Filter::new);
                if filter.get(DATACENTER_PARAM).is_none() {
                    filter.set(DATACENTER_PARAM, dc);
                }
            } else if let Some(payload) = body.as_mut() {
                if payload.datacenter().is_none() {
                    payload.set_datacenter(&dc);
                }
            }
        }

        let mut url = self.endpoint(&path)?;
        if let Some(filter) = &filter {
            if !filter.is_empty() {
                url.query_pairs_mut().extend_pairs(
                    filter.pairs().iter().map(|(k, v)| (k.as_str(), v.as_str())),
                );
            }
        }

        let body_bytes = match &body {
            Some(payload) => {
                Some(serde_json::to_vec(payload).map_err(|err| Error::Encode(err.to_string()))?)
            }
            // Non-GET calls always carry a JSON object, even an empty one.
            None if method != Method::GET && method != Method::HEAD => Some(b"{}".to_vec()),
            None => None,
        };

        if self.trace {
            let body_text = body_bytes
                .as_deref()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            debug!(method = %method, url = %url, body = %body_text, "sending request");
        }

        let headers = self.build_headers(headers.as_ref())?;
        let response = self
            .send_with_retry(&method, &url, body_bytes.as_deref(), &headers)
            .await?;

        let status = response.status();
        if !accepted.contains(&status) {
            // Unexpected status: classify and discard the body unread.
            return Err(Error::from_status(status, url.as_str()));
        }

        let bytes = response.bytes().await.map_err(|err| {
            Error::from(err).with_context(format!("failed reading the response body from {url}"))
        })?;

        if self.trace {
            debug!(status = %status, body = %String::from_utf8_lossy(&bytes), "response data");
        }

        if bytes.is_empty() {
            return Ok(T::default());
        }
        decode_body(&bytes)
    }

    /// One rate-limited exchange per attempt, retrying only on 429.
    ///
    /// A throttled response consumes one of the fixed attempts, sleeps the
    /// cooldown, and loops; any other outcome ends the loop immediately.
    async fn send_with_retry(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response> {
        for attempt in 1..=self.max_send_attempts {
            self.limiter.pace().await;

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(bytes) = body {
                request = request.body(bytes.to_vec());
            }

            let response = request.send().await.map_err(|err| {
                Error::from(err).with_context(format!("failed executing the request {url}"))
            })?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            drop(response);

            warn!(
                url = %url,
                attempt,
                "request rate exceeded, waiting {:?} before next attempt",
                self.throttle_cooldown
            );
            sleep(self.throttle_cooldown).await;
        }

        Err(Error::MaxAttempts {
            attempts: self.max_send_attempts,
            url: url.to_string(),
        })
    }

    /// Join `path` onto the base URL, ensuring the trailing slash the
    /// server requires.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let mut url = base
            .join(path.trim_start_matches('/'))
            .map_err(|err| Error::InvalidEndpoint(format!("Invalid API path `{path}`: {err}")))?;
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }
        Ok(url)
    }

    fn build_headers(&self, extra: Option<&HeaderMap>) -> Result<HeaderMap> {
        let mut headers = extra.cloned().unwrap_or_default();

        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON));
        }
        if !headers.contains_key(DATE) {
            let now = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            headers.insert(
                DATE,
                HeaderValue::from_str(&now)
                    .map_err(|err| Error::ConfigError(format!("Invalid date header: {err}")))?,
            );
        }

        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(self.api_key.expose_secret())
                .map_err(|err| Error::ConfigError(format!("Invalid API key: {err}")))?,
        );
        headers.insert(
            API_VERSION_HEADER,
            HeaderValue::from_str(&self.api_version)
                .map_err(|err| Error::ConfigError(format!("Invalid API version: {err}")))?,
        );

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Envelope, ListEnvelope};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> DanubeConfig {
        let mut config = DanubeConfig::new(server.uri(), "test-key").unwrap();
        // Keep the gate and cooldown out of the way unless a test wants them.
        config.max_requests_per_minute = 6000;
        config.throttle_cooldown_secs = 0;
        config
    }

    fn test_client(server: &MockServer) -> DanubeClient {
        DanubeClient::new(test_config(server)).unwrap()
    }

    #[derive(Debug, Default, serde::Serialize)]
    struct ScopedBody {
        #[serde(skip_serializing_if = "Option::is_none")]
        dc: Option<String>,
    }

    impl Scoped for ScopedBody {
        fn datacenter(&self) -> Option<&str> {
            self.dc.as_deref()
        }

        fn set_datacenter(&mut self, dc: &str) {
            self.dc = Some(dc.to_string());
        }
    }

    #[tokio::test]
    async fn default_accepted_status_is_200_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"Status": "SUCCESS"})))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .execute::<(), ListEnvelope>(ApiRequest::get("vm"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::UnknownStatus {
                status: 201,
                url: format!("{}/vm/", server.uri()),
            }
        );
    }

    #[tokio::test]
    async fn standard_headers_are_applied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .and(header("es-api-key", "test-key"))
            .and(header("X-Api-Version", "~4.2"))
            .and(header("Content-Type", "application/json"))
            .and(header("Accept", "application/json"))
            .and(header_exists("Date"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Result": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let envelope: ListEnvelope = client.execute(ApiRequest::get("vm")).await.unwrap();
        assert_eq!(envelope.result, Some(vec![]));
    }

    #[tokio::test]
    async fn throttled_attempts_retry_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Result": ["a"]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let envelope: ListEnvelope = client.execute(ApiRequest::get("vm")).await.unwrap();
        assert_eq!(envelope.result, Some(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn throttle_budget_exhaustion_yields_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(ResponseTemplate::new(429))
            .expect(20)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .execute::<(), ListEnvelope>(ApiRequest::get("vm"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MaxAttempts { attempts: 20, .. }));
    }

    #[tokio::test]
    async fn active_scope_is_injected_into_get_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .and(query_param("dc", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Result": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.switch_datacenter("main");
        let _: ListEnvelope = client.execute(ApiRequest::get("vm")).await.unwrap();
    }

    #[tokio::test]
    async fn explicit_dc_filter_wins_over_scope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .and(query_param("dc", "edge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Result": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.switch_datacenter("main");

        let mut filter = Filter::new();
        filter.set("dc", "edge");
        let _: ListEnvelope = client
            .execute(ApiRequest::get("vm").with_filter(filter))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn active_scope_is_injected_into_mutating_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/vm/web01/"))
            .and(body_json(json!({"dc": "main"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Status": "SUCCESS"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.switch_datacenter("main");
        let _: Envelope<()> = client
            .execute(ApiRequest::put("vm/web01", ScopedBody::default()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn body_with_explicit_dc_is_left_alone() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/vm/web01/"))
            .and(body_json(json!({"dc": "edge"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Status": "SUCCESS"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.switch_datacenter("main");
        let body = ScopedBody {
            dc: Some("edge".to_string()),
        };
        let _: Envelope<()> = client
            .execute(ApiRequest::put("vm/web01", body))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bodyless_mutating_call_sends_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/vm/web01/"))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Status": "SUCCESS"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let request = ApiRequest::<()> {
            method: Method::PUT,
            path: "vm/web01".to_string(),
            filter: None,
            body: None,
            headers: None,
            accept: Vec::new(),
        };
        let _: Envelope<()> = client.execute(request).await.unwrap();
    }

    #[tokio::test]
    async fn unexpected_status_maps_to_typed_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/missing/"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .execute::<(), ListEnvelope>(ApiRequest::get("vm/missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "https://elsewhere/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client
            .execute::<(), ListEnvelope>(ApiRequest::get("vm"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownStatus { status: 302, .. }));
    }

    #[tokio::test]
    async fn empty_body_with_accepted_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let envelope: ListEnvelope = client.execute(ApiRequest::get("vm")).await.unwrap();
        assert_eq!(envelope, ListEnvelope::default());
    }

    #[tokio::test]
    async fn repeated_get_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"Status": "SUCCESS", "Result": ["a", "b"]})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let first: ListEnvelope = client.execute(ApiRequest::get("vm")).await.unwrap();
        let second: ListEnvelope = client.execute(ApiRequest::get("vm")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn scope_switching_is_last_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .and(query_param("dc", "second"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Result": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.switch_datacenter("first");
        client.switch_datacenter("second");
        assert_eq!(client.datacenter().as_deref(), Some("second"));
        let _: ListEnvelope = client.execute(ApiRequest::get("vm")).await.unwrap();
    }

    #[tokio::test]
    async fn scope_survives_a_poisoned_lock() {
        let server = MockServer::start().await;
        let client = test_client(&server);
        client.switch_datacenter("main");

        // Poison the scope lock by panicking while holding the write guard.
        let poisoner = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = client.datacenter.write().unwrap();
            panic!("poisoned on purpose");
        }));
        assert!(poisoner.is_err());
        assert!(client.datacenter.is_poisoned());

        // Reads still see the scope and writes still take effect.
        assert_eq!(client.datacenter().as_deref(), Some("main"));
        client.switch_datacenter("backup");
        assert_eq!(client.datacenter().as_deref(), Some("backup"));
    }

    #[tokio::test]
    async fn throttled_attempts_sleep_the_cooldown_each_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vm/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Result": []})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.throttle_cooldown_secs = 1;
        let client = DanubeClient::new(config).unwrap();

        let started = std::time::Instant::now();
        let envelope: ListEnvelope = client.execute(ApiRequest::get("vm")).await.unwrap();
        assert_eq!(envelope.result, Some(vec![]));
        // Two throttled attempts must each sit out the full cooldown.
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
