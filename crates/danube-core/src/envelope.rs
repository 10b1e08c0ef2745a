//! Response envelope and decode fallback heuristics.
//!
//! Most server responses wrap their payload in a common envelope
//! (`{"Status", "Task_id", "Detail", "Result"}`), but not all endpoints do:
//! some return a bare list of strings, some a bare map, and a known
//! degenerate case returns the plain-text body `Resource not found`. The
//! decoder here tries the caller's target shape first and then applies the
//! fallbacks in a fixed order, so a naive single-shape decode failure on a
//! known-valid response never reaches the caller.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Plain-text body some endpoints return instead of a 404.
pub const NOT_FOUND_SENTINEL: &str = "Resource not found";

/// Longest body excerpt embedded in a decode error.
const EXCERPT_LEN: usize = 256;

/// Common wrapper shape for server responses.
///
/// Field names tolerate both the TitleCase and lowercase spellings the
/// server uses across endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Envelope<T> {
    /// Task state label ("SUCCESS", "FAILED", or an in-progress label)
    #[serde(rename = "Status", alias = "status", default)]
    pub status: Option<String>,

    /// Identifier of the asynchronous task started by this call, if any
    #[serde(rename = "Task_id", alias = "task_id", default)]
    pub task_id: Option<String>,

    /// Human-readable detail message
    #[serde(rename = "Detail", alias = "detail", default)]
    pub detail: Option<String>,

    /// Decoded result payload
    #[serde(rename = "Result", alias = "result", default)]
    pub result: Option<T>,
}

impl<T> Default for Envelope<T> {
    fn default() -> Self {
        Self {
            status: None,
            task_id: None,
            detail: None,
            result: None,
        }
    }
}

impl<T> Envelope<T> {
    /// Take the result payload, substituting the default when the server
    /// omitted it.
    #[must_use]
    pub fn into_result(self) -> T
    where
        T: Default,
    {
        self.result.unwrap_or_default()
    }
}

/// Envelope carrying a plain list of names.
pub type ListEnvelope = Envelope<Vec<String>>;

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut excerpt: String = text.chars().take(EXCERPT_LEN).collect();
    if text.chars().count() > EXCERPT_LEN {
        excerpt.push_str("...");
    }
    excerpt
}

/// Decode a response body into the caller's target shape.
///
/// Tries a direct unmarshal first, then the fallbacks in order: the
/// plain-text not-found sentinel, and a bare string list re-wrapped as
/// `{"Result": ...}`. When everything fails, the original decode error is
/// surfaced with a bounded body excerpt.
///
/// # Errors
///
/// [`Error::NotFound`] for the sentinel body, [`Error::Decode`] otherwise.
pub fn decode_body<T>(body: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    // Some listing endpoints omit the envelope and return a bare list.
    // This must run before the direct unmarshal: serde's derived struct
    // deserializer also accepts a JSON array positionally, which would
    // scatter the list elements across the envelope fields.
    if serde_json::from_slice::<Vec<String>>(body).is_ok() {
        let mut wrapped = Vec::with_capacity(body.len() + 13);
        wrapped.extend_from_slice(b"{\"Result\": ");
        wrapped.extend_from_slice(body);
        wrapped.push(b'}');
        if let Ok(value) = serde_json::from_slice::<T>(&wrapped) {
            return Ok(value);
        }
    }

    let direct_err = match serde_json::from_slice::<T>(body) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if body == NOT_FOUND_SENTINEL.as_bytes() {
        return Err(Error::NotFound(NOT_FOUND_SENTINEL.to_string()));
    }

    Err(Error::Decode {
        reason: direct_err.to_string(),
        excerpt: excerpt(body),
    })
}
