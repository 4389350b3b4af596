//! Sync engine bridging the membership platform and the CRM.
//!
//! This crate implements the data-plane half of the bridge: a resilient
//! HTTP client with exponential backoff, typed clients for the XML
//! membership API and the JSON CRM API, the field mapper between the two,
//! per-object-type sync tasks, and the orchestrator that runs tasks
//! concurrently and aggregates their results.
//!
//! # Architecture
//!
//! A sync run fans out one task per enabled object type through a bounded
//! concurrency pool. Each task owns a fresh client pair and runs the same
//! three-phase pipeline:
//!
//! 1. **Fetch** - Pull records from the membership platform as XML
//! 2. **Map** - Translate platform fields into CRM properties
//! 3. **Push** - Upsert the mapped records into the CRM as JSON
//!
//! Tasks never abort the run. Per-record failures are collected into the
//! task's result, and the orchestrator aggregates all task results into a
//! single report for the run.
//!
//! # Example
//!
//! ```no_run
//! use koppel_core::{CredentialSet, SchedulingConfig};
//! use koppel_sync::{HttpClientFactory, SyncError, SyncOptions, SyncOrchestrator};
//!
//! # async fn example(factory: HttpClientFactory) -> std::result::Result<(), SyncError> {
//! let config = SchedulingConfig::default();
//! let orchestrator = SyncOrchestrator::new(factory, SyncOptions::default());
//!
//! let report = orchestrator.run(&config).await?;
//! println!("run {} ok={}", report.run_id, report.overall_success);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod client;
pub mod credentials;
pub mod destination;
pub mod error;
pub mod mapper;
pub mod orchestrator;
pub mod source;
pub mod task;

// Re-export main public API
pub use backoff::BackoffPolicy;
pub use client::{ApiResponse, ClientConfig, RequestBody, RequestOptions, ResilientClient};
pub use credentials::{ClientFactory, HttpClientFactory, TaskClients};
pub use destination::{DestinationApi, DestinationConfig, PushOutcome, SearchStrategy};
pub use error::{Result, SyncError};
pub use orchestrator::{SyncOptions, SyncOrchestrator};
pub use source::{Environment, SourceApi, SourceConfig};
pub use task::SyncTask;

/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Default number of concurrently running sync tasks.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default base HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
