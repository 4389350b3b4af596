//! Core domain models for the membership-to-CRM sync bridge.
//!
//! Provides strongly-typed identifiers, object type definitions, run
//! reporting structures, scheduling configuration, and the clock
//! abstraction. All other crates depend on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod models;
pub mod time;

pub use config::{CredentialSet, SchedulingConfig};
pub use error::{CoreError, Result};
pub use models::{
    AggregatedSyncReport, ObjectType, RunState, SyncRunId, SyncTaskResult, TaskError,
};
pub use time::{Clock, RealClock, TestClock};
