//! Dependency initialization and wiring for the migrator.

use listings_migrator_pipeline::{
    MigrationOptions, Orchestrator, Preflight, PreflightReport, Validator, ValidatorConfig,
};
use listings_migrator_repository::{
    BatchLoader, OpenSearchBatchLoader, PostgresBatchLoader, PostgresCheckpointRepository,
    PostgresSourceReader, PostgresTargetInspector,
};
use listings_migrator_shared::{listings_catalog, EntityType, SchemaCatalog};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::cli::{DatabaseArgs, OpenSearchArgs, TargetKind};
use crate::errors::MigratorError;

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// Default number of connection attempts in retry mode.
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;

/// Time allowed to acquire a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection mode for the source and target stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry a bounded number of times before giving up.
    Retry,
}

impl ConnectionMode {
    /// Parse connection mode from environment variable.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive)
    /// Defaults to "retry" if not set or invalid.
    fn from_env() -> Self {
        match env::var("MIGRATOR_CONNECTION_MODE")
            .unwrap_or_else(|_| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid MIGRATOR_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// How store connections are retried at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub mode: ConnectionMode,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Read the policy from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `MIGRATOR_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `MIGRATOR_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 5)
    /// - `MIGRATOR_RETRY_ATTEMPTS`: Attempts before giving up (default: 5)
    pub fn from_env() -> Self {
        let interval = env::var("MIGRATOR_RETRY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS);
        let max_attempts = env::var("MIGRATOR_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|attempts| *attempts > 0)
            .unwrap_or(DEFAULT_RETRY_ATTEMPTS);

        Self {
            mode: ConnectionMode::from_env(),
            interval: Duration::from_secs(interval),
            max_attempts,
        }
    }

    fn attempts(&self) -> u32 {
        match self.mode {
            ConnectionMode::FailFast => 1,
            ConnectionMode::Retry => self.max_attempts,
        }
    }
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub catalog: Arc<SchemaCatalog>,
    pub source: Arc<PostgresSourceReader>,
    pub inspector: Arc<PostgresTargetInspector>,
    pub checkpoints: Arc<PostgresCheckpointRepository>,
    target_pool: PgPool,
    retry: RetryPolicy,
}

impl Dependencies {
    /// Connect to both stores and build the shared components.
    ///
    /// # Arguments
    ///
    /// * `database` - Source and target connection parameters
    /// * `retry` - Startup connection policy
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(MigratorError)` - If either store stays unreachable
    pub async fn connect(database: &DatabaseArgs, retry: RetryPolicy) -> Result<Self, MigratorError> {
        let catalog = listings_catalog()
            .map_err(|e| MigratorError::config(format!("Invalid schema catalog: {}", e)))?;

        let source_options = source_connect_options(database)?;
        let target_options = target_connect_options(database)?;

        info!(
            source_host = %source_options.get_host(),
            source_database = ?source_options.get_database(),
            target_host = %target_options.get_host(),
            target_database = ?target_options.get_database(),
            max_connections = database.max_connections,
            connection_mode = ?retry.mode,
            "Initializing dependencies"
        );

        let source_pool = connect_pool("source", source_options, database.max_connections, retry)
            .await
            .map_err(|e| MigratorError::source_unavailable(e.to_string()))?;
        let source = PostgresSourceReader::new(source_pool)
            .await
            .map_err(|e| MigratorError::source_unavailable(e.to_string()))?;

        info!("Source connection established");

        let target_pool = connect_pool("target", target_options, database.max_connections, retry)
            .await
            .map_err(|e| MigratorError::target_unavailable(e.to_string()))?;
        let inspector = PostgresTargetInspector::new(target_pool.clone())
            .await
            .map_err(|e| MigratorError::target_unavailable(e.to_string()))?;
        let checkpoints = PostgresCheckpointRepository::new(target_pool.clone()).await?;

        info!("Target connection established");

        Ok(Self {
            catalog: Arc::new(catalog),
            source: Arc::new(source),
            inspector: Arc::new(inspector),
            checkpoints: Arc::new(checkpoints),
            target_pool,
            retry,
        })
    }

    /// Make sure the checkpoint table exists. A dry run never writes, so it
    /// only reads whatever checkpoints are already there.
    pub async fn prepare_checkpoints(&self, dry_run: bool) -> Result<(), MigratorError> {
        if dry_run {
            info!("Dry run, skipping checkpoint table migrations");
            return Ok(());
        }
        self.checkpoints.run_migrations().await?;
        Ok(())
    }

    /// Build the writer for the selected target.
    pub async fn batch_loader(
        &self,
        target: TargetKind,
        opensearch: &OpenSearchArgs,
    ) -> Result<Arc<dyn BatchLoader>, MigratorError> {
        match target {
            TargetKind::Postgres => {
                let loader = PostgresBatchLoader::new(self.target_pool.clone())
                    .await
                    .map_err(|e| MigratorError::target_unavailable(e.to_string()))?;
                Ok(Arc::new(loader))
            }
            TargetKind::Opensearch => {
                let loader =
                    OpenSearchBatchLoader::new(&opensearch.opensearch_url, &opensearch.opensearch_index)
                        .await
                        .map_err(|e| MigratorError::target_unavailable(e.to_string()))?;
                self.ping_opensearch(&loader, &opensearch.opensearch_url).await?;
                Ok(Arc::new(loader))
            }
        }
    }

    /// Check that every table the selected entity types touch exists, and warn
    /// about target rows the migrator did not write.
    ///
    /// Target tables are only checked when the target is the inspected
    /// PostgreSQL store.
    pub async fn preflight(
        &self,
        target: TargetKind,
        only: &[EntityType],
    ) -> Result<PreflightReport, MigratorError> {
        let preflight = Preflight::new(
            Arc::clone(&self.catalog),
            self.source.clone(),
            self.inspector.clone(),
        );
        let preflight = match target {
            TargetKind::Postgres => preflight,
            TargetKind::Opensearch => preflight.source_only(),
        };
        let report = preflight.run(only).await?;
        info!(
            tables_checked = report.tables_checked,
            conflicts = report.has_conflicts(),
            "Preflight passed"
        );
        Ok(report)
    }

    pub fn orchestrator(&self, loader: Arc<dyn BatchLoader>, options: MigrationOptions) -> Orchestrator {
        Orchestrator::new(
            Arc::clone(&self.catalog),
            self.source.clone(),
            loader,
            self.inspector.clone(),
            self.checkpoints.clone(),
            options,
        )
    }

    pub fn validator(&self, config: ValidatorConfig) -> Validator {
        Validator::new(
            Arc::clone(&self.catalog),
            self.source.clone(),
            self.inspector.clone(),
            config,
        )
    }

    async fn ping_opensearch(&self, loader: &OpenSearchBatchLoader, url: &str) -> Result<(), MigratorError> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            match loader.ping().await {
                Ok(()) => {
                    info!(opensearch_url = %url, "OpenSearch connection established");
                    return Ok(());
                }
                Err(e) if attempt >= attempts => {
                    return Err(MigratorError::target_unavailable(format!(
                        "Failed to connect to OpenSearch: {}",
                        e
                    )));
                }
                Err(e) => {
                    warn!(
                        opensearch_url = %url,
                        error = %e,
                        attempt,
                        retry_interval_secs = self.retry.interval.as_secs(),
                        "Failed to connect to OpenSearch, retrying..."
                    );
                    attempt += 1;
                    sleep(self.retry.interval).await;
                }
            }
        }
    }
}

/// Connect a pool, retrying according to the policy.
async fn connect_pool(
    label: &str,
    options: PgConnectOptions,
    max_connections: u32,
    retry: RetryPolicy,
) -> Result<PgPool, sqlx::Error> {
    let attempts = retry.attempts();
    let mut attempt = 1;
    loop {
        let result = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options.clone())
            .await;

        match result {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(
                    store = label,
                    error = %e,
                    attempt,
                    retry_interval_secs = retry.interval.as_secs(),
                    "Failed to connect, retrying..."
                );
                attempt += 1;
                sleep(retry.interval).await;
            }
        }
    }
}

fn source_connect_options(database: &DatabaseArgs) -> Result<PgConnectOptions, MigratorError> {
    connect_options(
        "source",
        database.source_url.as_deref(),
        &database.source_host,
        database.source_port,
        &database.source_database,
        &database.source_user,
        database.source_password.as_deref(),
    )
}

fn target_connect_options(database: &DatabaseArgs) -> Result<PgConnectOptions, MigratorError> {
    connect_options(
        "target",
        database.target_url.as_deref(),
        &database.target_host,
        database.target_port,
        &database.target_database,
        &database.target_user,
        database.target_password.as_deref(),
    )
}

/// A URL wins over the individual parameters.
fn connect_options(
    label: &str,
    url: Option<&str>,
    host: &str,
    port: u16,
    database: &str,
    user: &str,
    password: Option<&str>,
) -> Result<PgConnectOptions, MigratorError> {
    if let Some(url) = url {
        return PgConnectOptions::from_str(url)
            .map_err(|e| MigratorError::config(format!("Invalid {} database URL: {}", label, e)));
    }

    let options = PgConnectOptions::new()
        .host(host)
        .port(port)
        .database(database)
        .username(user);

    Ok(match password {
        Some(password) => options.password(password),
        None => options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_retry_env() {
        env::remove_var("MIGRATOR_CONNECTION_MODE");
        env::remove_var("MIGRATOR_RETRY_INTERVAL_SECS");
        env::remove_var("MIGRATOR_RETRY_ATTEMPTS");
    }

    // ========================================
    // Retry policy
    // ========================================

    #[test]
    #[serial]
    fn test_retry_policy_defaults() {
        clear_retry_env();

        let policy = RetryPolicy::from_env();

        assert_eq!(policy.mode, ConnectionMode::Retry);
        assert_eq!(policy.interval, Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS));
        assert_eq!(policy.max_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(policy.attempts(), DEFAULT_RETRY_ATTEMPTS);
    }

    #[test]
    #[serial]
    fn test_fail_fast_makes_a_single_attempt() {
        clear_retry_env();
        env::set_var("MIGRATOR_CONNECTION_MODE", "Fail-Fast");
        env::set_var("MIGRATOR_RETRY_ATTEMPTS", "9");

        let policy = RetryPolicy::from_env();
        clear_retry_env();

        assert_eq!(policy.mode, ConnectionMode::FailFast);
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back_to_defaults() {
        clear_retry_env();
        env::set_var("MIGRATOR_CONNECTION_MODE", "sometimes");
        env::set_var("MIGRATOR_RETRY_INTERVAL_SECS", "soon");
        env::set_var("MIGRATOR_RETRY_ATTEMPTS", "0");

        let policy = RetryPolicy::from_env();
        clear_retry_env();

        assert_eq!(policy.mode, ConnectionMode::Retry);
        assert_eq!(policy.interval, Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS));
        assert_eq!(policy.max_attempts, DEFAULT_RETRY_ATTEMPTS);
    }

    // ========================================
    // Connect options
    // ========================================

    #[test]
    fn test_connect_options_from_parameters() {
        let options = connect_options(
            "source",
            None,
            "db.internal",
            5433,
            "svetubd",
            "postgres",
            Some("secret"),
        )
        .unwrap();

        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("svetubd"));
        assert_eq!(options.get_username(), "postgres");
    }

    #[test]
    fn test_url_takes_precedence() {
        let options = connect_options(
            "target",
            Some("postgres://listings_user:pw@target.internal:6543/listings"),
            "localhost",
            35434,
            "listings_dev_db",
            "listings_user",
            None,
        )
        .unwrap();

        assert_eq!(options.get_host(), "target.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("listings"));
    }

    #[test]
    fn test_invalid_url_is_a_config_error() {
        let result = connect_options("target", Some("not a url"), "localhost", 1, "db", "u", None);

        assert!(matches!(result, Err(MigratorError::ConfigError(_))));
    }
}
