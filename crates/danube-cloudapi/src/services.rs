//! Service inventory.

use crate::client::CloudApi;
use crate::Result;
use danube_core::error::ResultExt;
use danube_core::request::ApiRequest;
use std::collections::HashMap;

impl CloudApi {
    /// List the available services with their reported states.
    ///
    /// This endpoint returns a bare name-to-state map rather than the
    /// usual envelope.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_services(&self) -> Result<HashMap<String, String>> {
        self.core()
            .execute(ApiRequest::get("services"))
            .await
            .op_context(|| "failed to get list of services")
    }
}
