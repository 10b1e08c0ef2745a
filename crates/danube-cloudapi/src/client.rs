//! The top-level Cloud API client.

use crate::Result;
use danube_core::{DanubeClient, DanubeConfig, Error};

/// Client for the Danube Cloud management API.
///
/// Wraps the core dispatcher and exposes the resource operations as
/// inherent methods spread across the `machines`, `images`, `networks`,
/// `services`, and `tasks` modules.
pub struct CloudApi {
    core: DanubeClient,
}

impl CloudApi {
    /// Build a client from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: DanubeConfig) -> Result<Self> {
        Ok(Self {
            core: DanubeClient::new(config)?,
        })
    }

    /// Wrap an already-constructed core client.
    #[must_use]
    pub fn from_core(core: DanubeClient) -> Self {
        Self { core }
    }

    /// The underlying dispatcher.
    #[must_use]
    pub fn core(&self) -> &DanubeClient {
        &self.core
    }

    /// The active virtual datacenter, if any.
    #[must_use]
    pub fn datacenter(&self) -> Option<String> {
        self.core.datacenter()
    }

    /// Switch the active virtual datacenter for subsequent calls.
    pub fn switch_datacenter(&self, dc: impl Into<String>) {
        self.core.switch_datacenter(dc);
    }

    /// The active scope, or a config error for calls that cannot be
    /// expressed without one.
    pub(crate) fn scope_for(&self, what: &str) -> Result<String> {
        self.datacenter().ok_or_else(|| {
            Error::ConfigError(format!(
                "no active virtual datacenter: set one before listing attached {what}"
            ))
        })
    }
}
