//! Concurrent execution of sync tasks and aggregation of their results.
//!
//! One run fans a task per enabled object type into a bounded worker pool
//! and blocks until every submitted task has a result. Task failures never
//! abort the run; only pre-launch configuration problems make [`run`]
//! itself fail.
//!
//! [`run`]: SyncOrchestrator::run

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::Utc;
use koppel_core::{
    AggregatedSyncReport, ObjectType, RunState, SchedulingConfig, SyncRunId, SyncTaskResult,
    TaskError,
};
use tokio::{sync::Semaphore, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    credentials::{ClientFactory, TaskClients},
    destination::SearchStrategy,
    error::{Result, SyncError},
    task::SyncTask,
    DEFAULT_POOL_SIZE,
};

/// Tuning knobs for a sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Number of tasks allowed to run concurrently.
    pub pool_size: usize,
    /// Wall-clock ceiling for the whole run; tasks still pending at the
    /// deadline are recorded as failed.
    pub run_timeout: Option<Duration>,
    /// How contact upserts look for existing contacts.
    pub search_strategy: SearchStrategy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            run_timeout: None,
            search_strategy: SearchStrategy::default(),
        }
    }
}

/// Runs sync tasks concurrently and aggregates their results.
///
/// The orchestrator is reusable: each [`run`](Self::run) call is an
/// independent sync run with its own run ID and report. Only one run may
/// be in flight at a time.
#[derive(Debug)]
pub struct SyncOrchestrator {
    factory: Arc<dyn ClientFactory>,
    options: SyncOptions,
    state: std::sync::Mutex<RunState>,
    stop: CancellationToken,
}

impl SyncOrchestrator {
    /// Creates an orchestrator around a client factory.
    pub fn new(factory: impl ClientFactory + 'static, options: SyncOptions) -> Self {
        Self {
            factory: Arc::new(factory),
            options,
            state: std::sync::Mutex::new(RunState::Idle),
            stop: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Requests a stop: tasks not yet started are not started, in-flight
    /// tasks finish.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    fn set_state(&self, next: RunState) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = next;
    }

    /// Moves to `Running`, refusing when a run is already in flight.
    fn begin_run(&self) -> Result<()> {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard == RunState::Running {
            return Err(SyncError::configuration("a sync run is already in progress"));
        }
        *guard = RunState::Running;
        Ok(())
    }

    /// Runs one sync over the enabled object types and returns the
    /// aggregated report.
    ///
    /// Fails only before launch: no enabled type, a zero-sized pool, or a
    /// credential that does not resolve. Everything after launch degrades
    /// into per-type failed results inside the report.
    pub async fn run(&self, config: &SchedulingConfig) -> Result<AggregatedSyncReport> {
        let run_id = SyncRunId::new();
        let span = tracing::info_span!("sync_run", run_id = %run_id);

        self.begin_run()?;
        match self.run_inner(run_id, config).instrument(span).await {
            Ok((report, final_state)) => {
                self.set_state(final_state);
                Ok(report)
            },
            Err(e) => {
                self.set_state(RunState::Failed);
                Err(e)
            },
        }
    }

    async fn run_inner(
        &self,
        run_id: SyncRunId,
        config: &SchedulingConfig,
    ) -> Result<(AggregatedSyncReport, RunState)> {
        let started_at = Utc::now();

        if self.options.pool_size == 0 {
            return Err(SyncError::configuration("worker pool size must be positive"));
        }

        let enabled = config.enabled_object_types();
        if enabled.is_empty() {
            return Err(SyncError::configuration("no object type is enabled for sync"));
        }

        // Resolve every credential and build every client pair before any
        // task starts, so credential problems fail the run as a whole.
        let mut prepared: Vec<(ObjectType, TaskClients)> = Vec::with_capacity(enabled.len());
        for object_type in &enabled {
            let clients = self.factory.build_clients(*object_type)?;
            prepared.push((*object_type, clients));
        }

        let customer_ids = config.customer_id_list();
        tracing::info!(
            enabled = enabled.len(),
            customers = customer_ids.len(),
            pool_size = self.options.pool_size,
            "sync run starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.pool_size));
        let mut handles: Vec<(ObjectType, JoinHandle<SyncTaskResult>)> =
            Vec::with_capacity(prepared.len());

        for (object_type, clients) in prepared {
            let task = SyncTask::new(
                object_type,
                clients,
                customer_ids.clone(),
                self.options.search_strategy,
            );
            let semaphore = Arc::clone(&semaphore);
            let stop = self.stop.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return SyncTaskResult::failed(
                            object_type,
                            TaskError::new("worker pool closed before task started"),
                            Duration::ZERO,
                        );
                    },
                };
                // A stop between submission and pool admission means the
                // task never starts.
                if stop.is_cancelled() {
                    return SyncTaskResult::failed(
                        object_type,
                        TaskError::new("stop requested before task started"),
                        Duration::ZERO,
                    );
                }
                task.run().await
            });
            handles.push((object_type, handle));
        }

        let deadline = self.options.run_timeout.map(|ceiling| tokio::time::Instant::now() + ceiling);
        let mut results: BTreeMap<ObjectType, SyncTaskResult> = BTreeMap::new();
        let mut hit_ceiling = false;

        for (object_type, mut handle) in handles {
            let joined = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, &mut handle).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            handle.abort();
                            hit_ceiling = true;
                            tracing::warn!(object_type = %object_type, "run ceiling reached, aborting task");
                            results.insert(
                                object_type,
                                SyncTaskResult::failed(
                                    object_type,
                                    TaskError::new("run ceiling reached before task completion"),
                                    Duration::ZERO,
                                ),
                            );
                            continue;
                        },
                    }
                },
                None => handle.await,
            };

            let result = match joined {
                Ok(result) => result,
                Err(join_error) => {
                    let what =
                        if join_error.is_panic() { "task panicked" } else { "task aborted" };
                    tracing::error!(object_type = %object_type, error = %join_error, "{what}");
                    SyncTaskResult::failed(
                        object_type,
                        TaskError::with_cause(what, join_error.to_string()),
                        Duration::ZERO,
                    )
                },
            };
            results.insert(object_type, result);
        }

        let finished_at = Utc::now();
        let report = AggregatedSyncReport::from_results(run_id, started_at, finished_at, results);
        tracing::info!(
            overall_success = report.overall_success,
            total_processed = report.total_processed(),
            "sync run finished"
        );

        let final_state = if hit_ceiling || self.stop.is_cancelled() {
            RunState::Failed
        } else {
            RunState::Completed
        };
        Ok((report, final_state))
    }
}
