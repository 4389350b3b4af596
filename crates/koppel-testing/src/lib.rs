//! Test support for exercising the sync bridge against mock upstreams.
//!
//! [`TestEnv`] stands up one wiremock server per upstream and produces
//! configs and client factories aimed at them, all on a shared virtual
//! clock so retry waits are observable without real sleeping.
//! [`fixtures`] builds the XML and JSON bodies the upstreams return.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use koppel_core::{CredentialSet, TestClock};
use koppel_sync::{
    ClientConfig, DestinationConfig, Environment, HttpClientFactory, ResilientClient, SourceConfig,
};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

pub mod fixtures;

/// Mock upstreams plus configs that aim real clients at them.
pub struct TestEnv {
    /// Mock membership platform.
    pub source_mock: MockServer,
    /// Mock CRM.
    pub destination_mock: MockServer,
    /// Virtual clock shared by every client this env builds.
    pub clock: TestClock,
}

impl TestEnv {
    /// Starts both mock servers.
    pub async fn new() -> Self {
        Self {
            source_mock: MockServer::start().await,
            destination_mock: MockServer::start().await,
            clock: TestClock::new(),
        }
    }

    /// Source connection settings aimed at the mock platform.
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            base_url: self.source_mock.uri(),
            environment: Environment::Test,
            username: "vendor".to_string(),
            password: "vendor-secret".to_string(),
        }
    }

    /// Destination connection settings aimed at the mock CRM.
    pub fn destination_config(&self) -> DestinationConfig {
        DestinationConfig { base_url: self.destination_mock.uri() }
    }

    /// A factory that builds real clients wired to both mocks on the
    /// virtual clock.
    pub fn client_factory(&self, credentials: CredentialSet) -> HttpClientFactory {
        HttpClientFactory::new(self.source_config(), self.destination_config(), credentials)
            .with_clock(Arc::new(self.clock.clone()))
    }

    /// A bare resilient client on the virtual clock.
    pub fn resilient_client(&self, config: ClientConfig) -> koppel_sync::Result<ResilientClient> {
        ResilientClient::new(config, Arc::new(self.clock.clone()))
    }

    /// Path of a source service under the test environment segment.
    pub fn source_service_path(service: &str) -> String {
        format!("/{}/{service}", Environment::Test.path_segment())
    }

    /// Mounts a 200 XML response for one source service.
    pub async fn mount_source_service(&self, service: &str, body: impl Into<String>) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(Self::source_service_path(service)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.into()))
            .mount(&self.source_mock)
            .await;
    }

    /// Mounts a contact search response returning the given CRM IDs.
    pub async fn mount_contact_search(&self, ids: &[&str]) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(fixtures::search_results(ids)),
            )
            .mount(&self.destination_mock)
            .await;
    }

    /// Mounts a create-contact endpoint returning the given CRM ID.
    pub async fn mount_contact_create(&self, id: &str) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/contacts"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(fixtures::created_object(id)),
            )
            .mount(&self.destination_mock)
            .await;
    }

    /// Mounts an update endpoint for one contact ID.
    pub async fn mount_contact_update(&self, id: &str) {
        Mock::given(matchers::method("PATCH"))
            .and(matchers::path(format!("/crm/v3/objects/contacts/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::created_object(id)))
            .mount(&self.destination_mock)
            .await;
    }

    /// Mounts a create-deal endpoint plus its association endpoint.
    pub async fn mount_deal_create(&self, deal_id: &str, contact_id: &str) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/crm/v3/objects/deals"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(fixtures::created_object(deal_id)),
            )
            .mount(&self.destination_mock)
            .await;
        Mock::given(matchers::method("PUT"))
            .and(matchers::path(format!(
                "/crm/v3/objects/deals/{deal_id}/associations/contacts/{contact_id}/deal_to_contact"
            )))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.destination_mock)
            .await;
    }
}
