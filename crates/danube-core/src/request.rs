//! Request descriptors, query filters, and datacenter-scope injection.
//!
//! Resource operations describe a single API call with an [`ApiRequest`]:
//! method, path, optional query [`Filter`], optional body, optional extra
//! headers, and the set of HTTP statuses considered successful. The
//! descriptor is consumed exactly once by the dispatcher.

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};

/// Query key the dispatcher fills in with the active datacenter scope.
pub const DATACENTER_PARAM: &str = "dc";

/// Ordered string multimap applied to a request as URL query parameters.
///
/// Keys are repeatable and insertion order is preserved; encoding happens
/// when the request is built.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Filter {
    pairs: Vec<(String, String)>,
}

impl Filter {
    /// Create an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Replace all values for `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.pairs.retain(|(k, _)| *k != key);
        self.pairs.push((key, value.into()));
    }

    /// Append a value for `key`, keeping any existing ones.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Return the first value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if no parameters have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The collected key/value pairs, in insertion order.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Capability interface for request payloads that carry a datacenter field.
///
/// The dispatcher applies the active scope to non-GET bodies through this
/// trait. Payload types opt in explicitly (typically through an embedded
/// `dc` field); the defaults are no-ops, so payloads without a datacenter
/// field are left unmodified rather than failing.
pub trait Scoped {
    /// The datacenter already set on this payload, if any.
    fn datacenter(&self) -> Option<&str> {
        None
    }

    /// Apply a default datacenter to this payload.
    fn set_datacenter(&mut self, _dc: &str) {}
}

impl Scoped for () {}

/// Descriptor for a single API call.
///
/// Built by a resource operation and consumed exactly once by
/// [`crate::client::DanubeClient::execute`].
#[derive(Debug)]
pub struct ApiRequest<B = ()> {
    /// HTTP method (GET/POST/PUT/DELETE/HEAD)
    pub method: Method,
    /// API path relative to the base URL (a trailing slash is ensured)
    pub path: String,
    /// Optional query parameters
    pub filter: Option<Filter>,
    /// Optional request body, serialized as JSON
    pub body: Option<B>,
    /// Optional extra headers; `Date` here overrides the generated one
    pub headers: Option<HeaderMap>,
    /// HTTP statuses treated as success; empty means `{200}`
    pub accept: Vec<StatusCode>,
}

impl ApiRequest<()> {
    /// A GET request for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::bare(Method::GET, path)
    }

    /// A HEAD request for `path`.
    #[must_use]
    pub fn head(path: impl Into<String>) -> Self {
        Self::bare(Method::HEAD, path)
    }

    fn bare(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            filter: None,
            body: None,
            headers: None,
            accept: Vec::new(),
        }
    }
}

impl<B> ApiRequest<B> {
    /// A POST request carrying `body`.
    #[must_use]
    pub fn post(path: impl Into<String>, body: B) -> Self {
        Self::with_body(Method::POST, path, body)
    }

    /// A PUT request carrying `body`.
    #[must_use]
    pub fn put(path: impl Into<String>, body: B) -> Self {
        Self::with_body(Method::PUT, path, body)
    }

    /// A DELETE request carrying `body`.
    #[must_use]
    pub fn delete(path: impl Into<String>, body: B) -> Self {
        Self::with_body(Method::DELETE, path, body)
    }

    fn with_body(method: Method, path: impl Into<String>, body: B) -> Self {
        Self {
            method,
            path: path.into(),
            filter: None,
            body: Some(body),
            headers: None,
            accept: Vec::new(),
        }
    }

    /// Attach query parameters.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Attach extra headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set the statuses treated as success.
    #[must_use]
    pub fn with_accept(mut self, statuses: &[StatusCode]) -> Self {
        self.accept = statuses.to_vec();
        self
    }

    /// The accepted statuses, defaulting to `{200}` when none were set.
    #[must_use]
    pub fn accepted_statuses(&self) -> Vec<StatusCode> {
        if self.accept.is_empty() {
            vec![StatusCode::OK]
        } else {
            self.accept.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_set_replaces_add_appends() {
        let mut filter = Filter::new();
        filter.add("tag", "web");
        filter.add("tag", "db");
        assert_eq!(filter.get("tag"), Some("web"));
        assert_eq!(filter.pairs().len(), 2);

        filter.set("tag", "cache");
        assert_eq!(filter.get("tag"), Some("cache"));
        assert_eq!(filter.pairs().len(), 1);
    }

    #[test]
    fn filter_preserves_insertion_order() {
        let mut filter = Filter::new();
        filter.set("full", "true");
        filter.add("tag", "web");
        filter.add("tag", "db");

        let keys: Vec<&str> = filter.pairs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["full", "tag", "tag"]);
    }

    #[test]
    fn empty_accept_defaults_to_ok() {
        let req = ApiRequest::get("vm");
        assert_eq!(req.accepted_statuses(), vec![StatusCode::OK]);
    }

    #[test]
    fn explicit_accept_is_kept() {
        let req = ApiRequest::post("vm/web01/define", ()).with_accept(&[StatusCode::CREATED]);
        assert_eq!(req.accepted_statuses(), vec![StatusCode::CREATED]);
    }

    #[test]
    fn unit_body_is_unscoped() {
        let mut body = ();
        assert!(body.datacenter().is_none());
        body.set_datacenter("main");
        assert!(body.datacenter().is_none());
    }
}
