//! Per-task client construction.
//!
//! Every sync task gets freshly built source and destination clients so
//! tasks never share connection pools, and each object type resolves its
//! own destination key through [`CredentialSet`]. The factory is a trait
//! so orchestrator tests can hand tasks stub clients instead.

use std::sync::Arc;

use koppel_core::{Clock, CredentialSet, ObjectType, RealClock};

use crate::{
    client::{ClientConfig, ResilientClient},
    destination::{CrmClient, DestinationApi, DestinationConfig},
    error::Result,
    source::{SourceApi, SourceClient, SourceConfig},
};

/// The pair of clients one sync task works with.
#[derive(Debug, Clone)]
pub struct TaskClients {
    /// Membership platform client.
    pub source: Arc<dyn SourceApi>,
    /// CRM client authenticated for the task's object type.
    pub destination: Arc<dyn DestinationApi>,
}

/// Builds the clients for a sync task.
pub trait ClientFactory: Send + Sync + std::fmt::Debug {
    /// Builds source and destination clients for one object type.
    ///
    /// Fails when no destination key resolves for the type.
    fn build_clients(&self, object_type: ObjectType) -> Result<TaskClients>;
}

/// [`ClientFactory`] backed by real HTTP clients.
#[derive(Debug)]
pub struct HttpClientFactory {
    source_config: SourceConfig,
    destination_config: DestinationConfig,
    credentials: CredentialSet,
    client_config: ClientConfig,
    clock: Arc<dyn Clock>,
}

impl HttpClientFactory {
    /// Creates a factory with default transport settings.
    pub fn new(
        source_config: SourceConfig,
        destination_config: DestinationConfig,
        credentials: CredentialSet,
    ) -> Self {
        Self {
            source_config,
            destination_config,
            credentials,
            client_config: ClientConfig::default(),
            clock: Arc::new(RealClock),
        }
    }

    /// Overrides the retry and timeout settings used for built clients.
    #[must_use]
    pub fn with_client_config(mut self, client_config: ClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    /// Overrides the clock, letting tests drive waits virtually.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds a standalone source client, for queue access outside any
    /// sync task.
    pub fn source_client(&self) -> Result<SourceClient> {
        let http = ResilientClient::new(self.client_config.clone(), self.clock.clone())?;
        Ok(SourceClient::new(self.source_config.clone(), http))
    }
}

impl ClientFactory for HttpClientFactory {
    fn build_clients(&self, object_type: ObjectType) -> Result<TaskClients> {
        let api_key = self.credentials.resolve_key(object_type)?;

        // Separate transports so the two sides never contend for one pool.
        let source_http = ResilientClient::new(self.client_config.clone(), self.clock.clone())?;
        let destination_http =
            ResilientClient::new(self.client_config.clone(), self.clock.clone())?;

        let source = SourceClient::new(self.source_config.clone(), source_http);
        let destination =
            CrmClient::new(self.destination_config.clone(), api_key, destination_http);

        Ok(TaskClients { source: Arc::new(source), destination: Arc::new(destination) })
    }
}
