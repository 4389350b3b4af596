//! Domain models for sync runs and their results.
//!
//! Defines the object types the bridge synchronizes, per-task result
//! records, and the aggregated report produced by one orchestrated run.
//! Everything here is immutable once constructed and safe to hand across
//! task boundaries.

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Strongly-typed identifier for one sync run.
///
/// Wraps a UUID so run identifiers cannot be confused with upstream record
/// IDs. A new ID is minted per `run_sync` invocation and carried through
/// every log line of that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(pub Uuid);

impl SyncRunId {
    /// Creates a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Object types the bridge can synchronize.
///
/// Each type is an independent unit of work: it gets its own credential
/// resolution, its own client pair, and its own task in the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// Customer records, pushed as CRM contacts.
    Contacts,
    /// Membership records, pushed as properties on the matching contact.
    Memberships,
    /// Purchased products, pushed as CRM deals.
    Orders,
    /// Event registrations, pushed as CRM deals.
    Events,
}

impl ObjectType {
    /// All object types, in stable order.
    pub const ALL: [ObjectType; 4] =
        [Self::Contacts, Self::Memberships, Self::Orders, Self::Events];

    /// Returns the lowercase wire/config name for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Memberships => "memberships",
            Self::Orders => "orders",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contacts" => Ok(Self::Contacts),
            "memberships" => Ok(Self::Memberships),
            "orders" => Ok(Self::Orders),
            "events" => Ok(Self::Events),
            other => Err(CoreError::invalid_input(format!("unknown object type: {other}"))),
        }
    }
}

/// Lifecycle of one orchestrated sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run in progress.
    Idle,
    /// Tasks are executing.
    Running,
    /// All enabled tasks ran to completion, regardless of individual
    /// success.
    Completed,
    /// Orchestration could not start, was stopped, or hit the run ceiling.
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One recorded failure inside a sync task.
///
/// Record-level errors accumulate in order; they never abort the rest of
/// the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Human-readable description of what failed.
    pub message: String,
    /// Underlying cause, when one exists.
    pub cause: Option<String>,
}

impl TaskError {
    /// Creates an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), cause: None }
    }

    /// Creates an error with a message and its underlying cause.
    pub fn with_cause(message: impl Into<String>, cause: impl Into<String>) -> Self {
        Self { message: message.into(), cause: Some(cause.into()) }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", self.message, cause),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of one object type's sync task.
///
/// Created exactly once when the task finishes (normally or degraded from
/// a failure) and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTaskResult {
    /// Object type this result belongs to.
    pub object_type: ObjectType,
    /// Whether the task completed without recording any errors.
    pub success: bool,
    /// Number of records successfully pushed to the destination.
    pub total_processed: u64,
    /// Record-level errors, in the order they occurred.
    pub errors: Vec<TaskError>,
    /// Wall-clock time the task took.
    pub duration: Duration,
}

impl SyncTaskResult {
    /// Builds a result from accumulated counts and errors.
    ///
    /// The task succeeded only if nothing was recorded in `errors`.
    pub fn from_outcome(
        object_type: ObjectType,
        total_processed: u64,
        errors: Vec<TaskError>,
        duration: Duration,
    ) -> Self {
        let success = errors.is_empty();
        Self { object_type, success, total_processed, errors, duration }
    }

    /// Builds a failed result from a single error.
    ///
    /// Used when the task could not run at all (panic, stop signal, run
    /// ceiling).
    pub fn failed(object_type: ObjectType, error: TaskError, duration: Duration) -> Self {
        Self { object_type, success: false, total_processed: 0, errors: vec![error], duration }
    }
}

/// Aggregated outcome of one orchestrated sync run.
///
/// Contains exactly one entry per object type that was enabled for the
/// run; a missing entry is a defect in the orchestrator, not a valid
/// report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedSyncReport {
    /// Identifier of the run this report describes.
    pub run_id: SyncRunId,
    /// When the orchestrator started submitting tasks.
    pub started_at: DateTime<Utc>,
    /// When the last task result was collected.
    pub finished_at: DateTime<Utc>,
    /// Per-object-type results, keyed by object type.
    pub per_object_results: BTreeMap<ObjectType, SyncTaskResult>,
    /// True only if every enabled type's task succeeded.
    pub overall_success: bool,
}

impl AggregatedSyncReport {
    /// Assembles a report from collected task results.
    ///
    /// `overall_success` is the logical AND of every result's `success`
    /// flag; an empty result set is never successful.
    pub fn from_results(
        run_id: SyncRunId,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        per_object_results: BTreeMap<ObjectType, SyncTaskResult>,
    ) -> Self {
        let overall_success = !per_object_results.is_empty()
            && per_object_results.values().all(|result| result.success);
        Self { run_id, started_at, finished_at, per_object_results, overall_success }
    }

    /// Returns the result for one object type, if it was enabled.
    pub fn result(&self, object_type: ObjectType) -> Option<&SyncTaskResult> {
        self.per_object_results.get(&object_type)
    }

    /// Total records pushed across every task.
    pub fn total_processed(&self) -> u64 {
        self.per_object_results.values().map(|result| result.total_processed).sum()
    }
}
