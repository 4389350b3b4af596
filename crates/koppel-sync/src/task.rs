//! One object type's fetch, map, and push unit of work.
//!
//! A task never returns an error: everything that goes wrong is degraded
//! into its [`SyncTaskResult`], so the orchestrator can always collect one
//! result per enabled type. Record failures are accumulated and the batch
//! keeps going.

use std::sync::Arc;

use koppel_core::{Clock, ObjectType, RealClock, SyncTaskResult, TaskError};
use tracing::Instrument;

use crate::{
    credentials::TaskClients,
    destination::SearchStrategy,
    error::{Result, SyncError},
    mapper,
};

/// A sync task for one object type over a batch of customer IDs.
#[derive(Debug)]
pub struct SyncTask {
    object_type: ObjectType,
    clients: TaskClients,
    customer_ids: Vec<String>,
    strategy: SearchStrategy,
    clock: Arc<dyn Clock>,
}

impl SyncTask {
    /// Creates a task over the given batch.
    pub fn new(
        object_type: ObjectType,
        clients: TaskClients,
        customer_ids: Vec<String>,
        strategy: SearchStrategy,
    ) -> Self {
        Self { object_type, clients, customer_ids, strategy, clock: Arc::new(RealClock) }
    }

    /// Overrides the clock used for duration measurement.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the task to completion and reports what happened.
    pub async fn run(self) -> SyncTaskResult {
        let span = tracing::info_span!("sync_task", object_type = %self.object_type);

        async move {
            let started = self.clock.now();
            let mut processed: u64 = 0;
            let mut errors: Vec<TaskError> = Vec::new();

            for customer_id in &self.customer_ids {
                self.sync_customer(customer_id, &mut processed, &mut errors).await;
            }

            let duration = self.clock.now().duration_since(started);
            tracing::info!(
                object_type = %self.object_type,
                processed,
                error_count = errors.len(),
                duration_ms = duration.as_millis() as u64,
                "sync task finished"
            );
            SyncTaskResult::from_outcome(self.object_type, processed, errors, duration)
        }
        .instrument(span)
        .await
    }

    async fn sync_customer(
        &self,
        customer_id: &str,
        processed: &mut u64,
        errors: &mut Vec<TaskError>,
    ) {
        match self.object_type {
            ObjectType::Contacts => self.sync_contact(customer_id, processed, errors).await,
            ObjectType::Memberships => self.sync_memberships(customer_id, processed, errors).await,
            ObjectType::Orders => self.sync_orders(customer_id, processed, errors).await,
            ObjectType::Events => self.sync_events(customer_id, processed, errors).await,
        }
    }

    async fn sync_contact(
        &self,
        customer_id: &str,
        processed: &mut u64,
        errors: &mut Vec<TaskError>,
    ) {
        let outcome: Result<()> = async {
            let customer = self.clients.source.fetch_customer(customer_id).await?;
            let contact = mapper::contact_properties(&customer);
            let pushed = self.clients.destination.upsert_contact(&contact, self.strategy).await?;
            tracing::debug!(customer_id, contact_id = %pushed.id, action = %pushed.action, "contact synced");
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => *processed += 1,
            Err(e) => record_failure(errors, customer_id, "contact sync failed", &e),
        }
    }

    async fn sync_memberships(
        &self,
        customer_id: &str,
        processed: &mut u64,
        errors: &mut Vec<TaskError>,
    ) {
        let memberships = match self.clients.source.fetch_memberships(customer_id).await {
            Ok(memberships) => memberships,
            Err(e) => {
                record_failure(errors, customer_id, "membership fetch failed", &e);
                return;
            },
        };

        for membership in &memberships {
            let properties = mapper::membership_properties(membership);
            match self
                .clients
                .destination
                .upsert_membership(&membership.customer_id, &properties)
                .await
            {
                Ok(pushed) => {
                    tracing::debug!(
                        customer_id,
                        subgroup = membership.subgroup_name.as_deref().unwrap_or("-"),
                        contact_id = %pushed.id,
                        "membership synced"
                    );
                    *processed += 1;
                },
                Err(e) => record_failure(errors, customer_id, "membership push failed", &e),
            }
        }
    }

    async fn sync_orders(
        &self,
        customer_id: &str,
        processed: &mut u64,
        errors: &mut Vec<TaskError>,
    ) {
        let orders = match self.clients.source.fetch_orders(customer_id).await {
            Ok(orders) => orders,
            Err(e) => {
                record_failure(errors, customer_id, "order fetch failed", &e);
                return;
            },
        };

        for order in &orders {
            let deal = mapper::order_deal(order);
            match self.clients.destination.create_deal(&deal, Some(customer_id)).await {
                Ok(deal_id) => {
                    tracing::debug!(customer_id, deal_id = %deal_id, "order synced as deal");
                    *processed += 1;
                },
                Err(e) => record_failure(errors, customer_id, "order push failed", &e),
            }
        }
    }

    async fn sync_events(
        &self,
        customer_id: &str,
        processed: &mut u64,
        errors: &mut Vec<TaskError>,
    ) {
        let events = match self.clients.source.fetch_events(customer_id).await {
            Ok(events) => events,
            Err(e) => {
                record_failure(errors, customer_id, "event fetch failed", &e);
                return;
            },
        };

        for event in &events {
            let deal = mapper::event_deal(event);
            match self.clients.destination.create_deal(&deal, Some(customer_id)).await {
                Ok(deal_id) => {
                    tracing::debug!(customer_id, deal_id = %deal_id, "event synced as deal");
                    *processed += 1;
                },
                Err(e) => record_failure(errors, customer_id, "event push failed", &e),
            }
        }
    }
}

fn record_failure(
    errors: &mut Vec<TaskError>,
    customer_id: &str,
    what: &str,
    error: &SyncError,
) {
    tracing::warn!(customer_id, error = %error, "{what}");
    errors.push(TaskError::with_cause(format!("{what} for customer {customer_id}"), error.to_string()));
}
