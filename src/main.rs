//! Koppel membership-to-CRM sync bridge.
//!
//! Main entry point for the bridge binary. Loads configuration from the
//! environment, decides which customers to sync (an explicit ID list or
//! the platform's pending-changes queue), and runs the orchestrator once
//! or on a fixed cadence. The process exit code reflects the last run's
//! overall success.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use koppel_core::{AggregatedSyncReport, CredentialSet, ObjectType, SchedulingConfig};
use koppel_sync::{
    source::SourceClient, ClientConfig, DestinationConfig, Environment, HttpClientFactory,
    SearchStrategy, SourceApi, SourceConfig, SyncOptions, SyncOrchestrator,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting koppel sync bridge");

    let config = Config::from_env()?;
    info!(
        source_url = %config.source.base_url,
        environment = %config.source.environment,
        destination_url = %config.destination.base_url,
        frequency_minutes = config.scheduling.frequency_minutes,
        pool_size = config.options.pool_size,
        "Configuration loaded"
    );

    let factory = HttpClientFactory::new(
        config.source.clone(),
        config.destination.clone(),
        config.credentials.clone(),
    )
    .with_client_config(config.client.clone());

    // Standalone source client for queue reads and purges; the factory
    // moves into the orchestrator next.
    let queue = factory.source_client().context("Failed to build source client")?;
    let orchestrator = Arc::new(SyncOrchestrator::new(factory, config.options.clone()));

    // Signals stop new work from being submitted; in-flight tasks finish.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, finishing in-flight work");
            orchestrator.stop();
            shutdown.cancel();
        }
    });

    let periodic = config.scheduling.enabled && config.scheduling.frequency_minutes > 0;
    let interval = Duration::from_secs(u64::from(config.scheduling.frequency_minutes) * 60);

    let mut last_run_succeeded = run_cycle(&orchestrator, &queue, &config.scheduling).await?;
    while periodic && !shutdown.is_cancelled() {
        info!(minutes = config.scheduling.frequency_minutes, "Sleeping until next sync pass");
        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = shutdown.cancelled() => break,
        }
        last_run_succeeded = run_cycle(&orchestrator, &queue, &config.scheduling).await?;
    }

    if !last_run_succeeded {
        anyhow::bail!("last sync run finished with failures");
    }
    info!("Koppel sync bridge stopped");
    Ok(())
}

/// Executes one sync pass and reports whether it fully succeeded.
///
/// With an explicit customer ID list the pass syncs exactly those IDs.
/// With an empty list it drains the platform's pending-changes queue:
/// queued IDs drive the run, and a fully successful run purges them so
/// the next pass starts clean. A failed run leaves the queue untouched.
async fn run_cycle(
    orchestrator: &SyncOrchestrator,
    queue: &SourceClient,
    scheduling: &SchedulingConfig,
) -> Result<bool> {
    let explicit = scheduling.customer_id_list();
    let queued: Vec<String> = if explicit.is_empty() {
        queue
            .fetch_queued_customers()
            .await
            .context("Failed to read the pending-changes queue")?
            .into_iter()
            .map(|entry| entry.customer_id)
            .collect()
    } else {
        Vec::new()
    };

    if explicit.is_empty() && queued.is_empty() {
        info!("Queue is empty, nothing to sync");
        return Ok(true);
    }

    let mut pass = scheduling.clone();
    if !queued.is_empty() {
        pass.customer_ids = queued.join(",");
    }

    let report = orchestrator.run(&pass).await.context("Sync run could not be started")?;
    log_report(&report);

    if report.overall_success && !queued.is_empty() {
        match queue.purge_queue(&queued).await {
            Ok(()) => info!(count = queued.len(), "Purged synced entries from the queue"),
            Err(error) => {
                warn!(error = %error, "Queue purge failed, entries will be retried next pass");
            }
        }
    }

    Ok(report.overall_success)
}

fn log_report(report: &AggregatedSyncReport) {
    for (object_type, result) in &report.per_object_results {
        info!(
            object_type = %object_type,
            success = result.success,
            processed = result.total_processed,
            errors = result.errors.len(),
            duration_ms = result.duration.as_millis() as u64,
            "Task finished"
        );
        for error in &result.errors {
            warn!(object_type = %object_type, error = %error, "Record failed to sync");
        }
    }
    info!(
        run_id = %report.run_id,
        overall_success = report.overall_success,
        total_processed = report.total_processed(),
        "Sync run report"
    );
}

/// Runtime configuration assembled from environment variables.
#[derive(Debug, Clone)]
struct Config {
    source: SourceConfig,
    destination: DestinationConfig,
    credentials: CredentialSet,
    scheduling: SchedulingConfig,
    client: ClientConfig,
    options: SyncOptions,
}

impl Config {
    fn from_env() -> Result<Self> {
        let source = SourceConfig {
            base_url: require_env("KOPPEL_SOURCE_URL")?,
            environment: optional_env("KOPPEL_SOURCE_ENVIRONMENT")
                .as_deref()
                .unwrap_or("test")
                .parse::<Environment>()
                .context("KOPPEL_SOURCE_ENVIRONMENT must be 'test' or 'production'")?,
            username: require_env("KOPPEL_SOURCE_USERNAME")?,
            password: require_env("KOPPEL_SOURCE_PASSWORD")?,
        };

        let destination = DestinationConfig {
            base_url: optional_env("KOPPEL_DESTINATION_URL")
                .unwrap_or_else(|| DestinationConfig::default().base_url),
        };

        let mut credentials = CredentialSet::new(require_env("KOPPEL_DESTINATION_API_KEY")?);
        for object_type in ObjectType::ALL {
            let name =
                format!("KOPPEL_DESTINATION_API_KEY_{}", object_type.as_str().to_ascii_uppercase());
            if let Some(key) = optional_env(&name) {
                credentials = credentials.with_override(object_type, key);
            }
        }

        let scheduling = SchedulingConfig {
            frequency_minutes: parse_env("KOPPEL_FREQUENCY_MINUTES", 15u32)?,
            enabled: parse_env("KOPPEL_SYNC_ENABLED", false)?,
            customer_ids: optional_env("KOPPEL_CUSTOMER_IDS").unwrap_or_default(),
            sync_contacts: parse_env("KOPPEL_SYNC_CONTACTS", true)?,
            sync_memberships: parse_env("KOPPEL_SYNC_MEMBERSHIPS", true)?,
            sync_orders: parse_env("KOPPEL_SYNC_ORDERS", false)?,
            sync_events: parse_env("KOPPEL_SYNC_EVENTS", false)?,
        };

        let client_defaults = ClientConfig::default();
        let client = ClientConfig {
            base_timeout: Duration::from_secs(parse_env(
                "KOPPEL_BASE_TIMEOUT_SECONDS",
                client_defaults.base_timeout.as_secs(),
            )?),
            max_retries: parse_env("KOPPEL_MAX_RETRIES", client_defaults.max_retries)?,
            ..client_defaults
        };

        let options = SyncOptions {
            pool_size: parse_env("KOPPEL_POOL_SIZE", SyncOptions::default().pool_size)?,
            run_timeout: optional_env("KOPPEL_RUN_TIMEOUT_SECONDS")
                .map(|raw| raw.parse::<u64>().map(Duration::from_secs))
                .transpose()
                .context("KOPPEL_RUN_TIMEOUT_SECONDS must be a whole number of seconds")?,
            search_strategy: optional_env("KOPPEL_SEARCH_STRATEGY")
                .map(|raw| raw.parse::<SearchStrategy>())
                .transpose()
                .context("KOPPEL_SEARCH_STRATEGY is not a recognized strategy")?
                .unwrap_or_default(),
        };

        Ok(Self { source, destination, credentials, scheduling, client, options })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(name) {
        Some(raw) => {
            raw.parse::<T>().with_context(|| format!("invalid value for {name}: '{raw}'"))
        }
        None => Ok(default),
    }
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,koppel=debug,koppel_sync=debug"))
        .expect("Invalid RUST_LOG environment variable");

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
