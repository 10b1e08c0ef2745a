//! Error types for Danube Cloud operations.
//!
//! This module maps the server's HTTP status codes onto a typed error
//! taxonomy and provides context-wrapping so call sites can name the
//! operation and resource without losing the original cause.

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for Danube Cloud operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Request was structurally invalid (HTTP 400)
    #[error("Bad request {url}")]
    BadRequest {
        /// Offending request URL
        url: String,
    },

    /// Credentials were missing or rejected (HTTP 401 or 403)
    #[error("Not authorized {url}")]
    NotAuthorized {
        /// Offending request URL
        url: String,
    },

    /// Resource does not exist (HTTP 404 or the plain-text sentinel body)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists (HTTP 406)
    #[error("Already exists {url}")]
    AlreadyExists {
        /// Offending request URL
        url: String,
    },

    /// Required parameter was missing (HTTP 409)
    #[error("Missing parameters {url}")]
    MissingParameter {
        /// Offending request URL
        url: String,
    },

    /// Request payload exceeded the server limit (HTTP 413)
    #[error("Request too large {url}")]
    RequestTooLarge {
        /// Offending request URL
        url: String,
    },

    /// Server asked the client to slow down (HTTP 420)
    #[error("Request throttled {url}")]
    Throttled {
        /// Offending request URL
        url: String,
    },

    /// Parameter values were rejected (HTTP 422)
    #[error("Invalid parameters {url}")]
    InvalidArgument {
        /// Offending request URL
        url: String,
    },

    /// Requested API version is not supported (HTTP 449)
    #[error("Invalid version {url}")]
    InvalidVersion {
        /// Offending request URL
        url: String,
    },

    /// Server-side failure (HTTP 503)
    #[error("Internal error {url}")]
    InternalError {
        /// Offending request URL
        url: String,
    },

    /// Response status had no dedicated mapping
    #[error("Unknown error {status} at {url}")]
    UnknownStatus {
        /// Raw HTTP status code
        status: u16,
        /// Offending request URL
        url: String,
    },

    /// Throttle retry budget exhausted without a non-429 response
    #[error("Maximum number of attempts ({attempts}) reached sending request to {url}")]
    MaxAttempts {
        /// Attempts performed before giving up
        attempts: u32,
        /// Offending request URL
        url: String,
    },

    /// Request body could not be serialized
    #[error("Failed marshalling the request body: {0}")]
    Encode(String),

    /// Response body could not be decoded after all fallbacks
    #[error("Failed unmarshaling the response body: {reason} (body: {excerpt})")]
    Decode {
        /// Underlying serde failure
        reason: String,
        /// Bounded excerpt of the offending body
        excerpt: String,
    },

    /// Server reported the task as failed
    #[error("Task \"{task_id}\" has failed")]
    TaskFailed {
        /// Identifier of the failed task
        task_id: String,
    },

    /// Polling budget elapsed before the task reached a terminal state
    #[error("Timed out waiting for task \"{task_id}\"")]
    TaskTimeout {
        /// Identifier of the task being polled
        task_id: String,
    },

    /// Machine is in a state the requested sequence cannot handle
    #[error("Cannot operate on machine \"{machine}\": invalid state \"{state}\"")]
    InvalidState {
        /// Machine identifier
        machine: String,
        /// Observed machine state
        state: String,
    },

    /// Request timed out at the socket level
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transport-level failure with no HTTP status
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Endpoint URL could not be constructed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Error wrapped with call-site context
    #[error("{context}")]
    Context {
        /// Operation description (what was being attempted, on what)
        context: String,
        /// Original cause
        #[source]
        source: Box<Error>,
    },
}

/// Specialized result type for Danube Cloud operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify an unexpected HTTP status into a typed error.
    ///
    /// Statuses 401 and 403 both map to not-authorized; anything without a
    /// dedicated mapping becomes [`Error::UnknownStatus`].
    #[must_use]
    pub fn from_status(status: StatusCode, url: &str) -> Self {
        let url = url.to_string();
        match status.as_u16() {
            400 => Self::BadRequest { url },
            401 | 403 => Self::NotAuthorized { url },
            404 => Self::NotFound(url),
            406 => Self::AlreadyExists { url },
            409 => Self::MissingParameter { url },
            413 => Self::RequestTooLarge { url },
            420 => Self::Throttled { url },
            422 => Self::InvalidArgument { url },
            449 => Self::InvalidVersion { url },
            503 => Self::InternalError { url },
            status => Self::UnknownStatus { status, url },
        }
    }

    /// Wrap this error with call-site context, preserving the cause.
    #[must_use]
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Walk the context chain down to the originating error.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns true if the root cause is a resource-not-found outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound(_))
    }
}

/// Extension trait for attaching operation context to results.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with context produced by `f`.
    fn op_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn op_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|err| err.with_context(f()))
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}
