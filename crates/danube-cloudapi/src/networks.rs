//! Network operations.

use crate::client::CloudApi;
use crate::models::Network;
use crate::Result;
use danube_core::envelope::Envelope;
use danube_core::error::ResultExt;
use danube_core::request::{ApiRequest, Filter};

impl CloudApi {
    /// List the names of all networks.
    ///
    /// Needs SuperAdmin rights; with Admin rights use
    /// [`CloudApi::attached_networks`].
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    pub async fn list_networks(&self) -> Result<Vec<String>> {
        let envelope: Envelope<Vec<String>> = self
            .core()
            .execute(ApiRequest::get("network"))
            .await
            .op_context(|| "failed to get list of networks")?;
        Ok(envelope.into_result())
    }

    /// List full details of the networks attached to the active virtual
    /// datacenter.
    ///
    /// # Errors
    ///
    /// A config error when no datacenter scope is active; otherwise any
    /// request failure.
    pub async fn attached_networks(&self) -> Result<Vec<Network>> {
        let dc = self.scope_for("networks")?;
        let mut filter = Filter::new();
        filter.set("full", "true");

        let envelope: Envelope<Vec<Network>> = self
            .core()
            .execute(ApiRequest::get(format!("dc/{dc}/network")).with_filter(filter))
            .await
            .op_context(|| "failed to get attached networks")?;
        Ok(envelope.into_result())
    }

    /// Get the details of one network.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the network is unknown.
    pub async fn get_network(&self, network_name: &str) -> Result<Network> {
        let envelope: Envelope<Network> = self
            .core()
            .execute(ApiRequest::get(format!("network/{network_name}")))
            .await
            .op_context(|| format!("failed to get network info for \"{network_name}\""))?;
        Ok(envelope.into_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danube_core::{DanubeConfig, Error};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_api(server: &MockServer) -> CloudApi {
        let mut config = DanubeConfig::new(server.uri(), "test-key").unwrap();
        config.max_requests_per_minute = 6000;
        config.throttle_cooldown_secs = 0;
        CloudApi::new(config).unwrap()
    }

    #[tokio::test]
    async fn get_network_unwraps_the_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/network/internal/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Result": {
                    "name": "internal",
                    "network": "10.0.0.0",
                    "netmask": "255.255.255.0",
                    "gateway": "10.0.0.1",
                    "vlan_id": 12
                }
            })))
            .mount(&server)
            .await;

        let api = test_api(&server);
        let network = api.get_network("internal").await.unwrap();
        assert_eq!(network.entity.name.as_deref(), Some("internal"));
        assert_eq!(network.network.as_deref(), Some("10.0.0.0"));
        assert_eq!(network.vlan_id, Some(12));
    }

    #[tokio::test]
    async fn attached_networks_require_an_active_scope() {
        let server = MockServer::start().await;
        let api = test_api(&server);

        let err = api.attached_networks().await.unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn attached_networks_hit_the_scoped_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dc/edge/network/"))
            .and(query_param("full", "true"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"Result": [{"name": "internal"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = test_api(&server);
        api.switch_datacenter("edge");
        let networks = api.attached_networks().await.unwrap();
        assert_eq!(networks.len(), 1);
    }
}
