//! Command-line interface.
//!
//! Every connection parameter can also come from the environment (or a `.env`
//! file), so credentials never need to appear on the command line.

use clap::{Args, Parser, Subcommand, ValueEnum};
use listings_migrator_shared::EntityType;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "listings-migrator", version)]
#[command(about = "Migrate legacy marketplace listings into the unified listings schema")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy every selected entity type from the source store to the target store
    Migrate(MigrateArgs),

    /// Compare source and target and report integrity findings
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Records fetched, transformed and committed per transaction
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(i64).range(1..))]
    pub batch_size: i64,

    /// Run the whole pipeline without writing to the target
    #[arg(long)]
    pub dry_run: bool,

    /// Start every selected entity type at this source offset, ignoring stored checkpoints
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    pub resume_from: Option<i64>,

    /// Abort an entity type on the first record that cannot be transformed
    #[arg(long)]
    pub strict: bool,

    /// Pause between batches, in milliseconds
    #[arg(long, env = "MIGRATOR_PACE_MS")]
    pub pace_ms: Option<u64>,

    /// Entity type to migrate (repeatable); defaults to the whole catalog
    #[arg(long = "entity")]
    pub entities: Vec<String>,

    /// Where transformed records are written
    #[arg(long, value_enum, default_value_t = TargetKind::Postgres, env = "MIGRATOR_TARGET")]
    pub target: TargetKind,

    #[command(flatten)]
    pub opensearch: OpenSearchArgs,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl MigrateArgs {
    pub fn pace(&self) -> Option<Duration> {
        self.pace_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    pub fn entity_types(&self) -> Vec<EntityType> {
        self.entities.iter().map(|name| EntityType::from(name.as_str())).collect()
    }
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Rows sampled per entity type for field-level comparison
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(i64).range(0..))]
    pub sample_size: i64,

    /// Absolute tolerance for numeric comparisons
    #[arg(long, default_value_t = 0.01)]
    pub tolerance: f64,

    /// Mismatched sample rows reported as a warning instead of a failure
    #[arg(long, default_value_t = 0)]
    pub max_mismatches: u64,

    /// Entity type to validate (repeatable); defaults to the whole catalog
    #[arg(long = "entity")]
    pub entities: Vec<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    pub fn entity_types(&self) -> Vec<EntityType> {
        self.entities.iter().map(|name| EntityType::from(name.as_str())).collect()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TargetKind {
    Postgres,
    Opensearch,
}

/// Connection parameters for the source and target stores.
///
/// A URL takes precedence over the individual parameters of the same store.
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    #[arg(long, env = "SOURCE_DATABASE_URL", hide_env_values = true)]
    pub source_url: Option<String>,

    #[arg(long, env = "SOURCE_DB_HOST", default_value = "localhost")]
    pub source_host: String,

    #[arg(long, env = "SOURCE_DB_PORT", default_value_t = 5433)]
    pub source_port: u16,

    #[arg(long, env = "SOURCE_DB_NAME", default_value = "svetubd")]
    pub source_database: String,

    #[arg(long, env = "SOURCE_DB_USER", default_value = "postgres")]
    pub source_user: String,

    #[arg(long, env = "SOURCE_DB_PASSWORD", hide_env_values = true)]
    pub source_password: Option<String>,

    #[arg(long, env = "TARGET_DATABASE_URL", hide_env_values = true)]
    pub target_url: Option<String>,

    #[arg(long, env = "TARGET_DB_HOST", default_value = "localhost")]
    pub target_host: String,

    #[arg(long, env = "TARGET_DB_PORT", default_value_t = 35434)]
    pub target_port: u16,

    #[arg(long, env = "TARGET_DB_NAME", default_value = "listings_dev_db")]
    pub target_database: String,

    #[arg(long, env = "TARGET_DB_USER", default_value = "listings_user")]
    pub target_user: String,

    #[arg(long, env = "TARGET_DB_PASSWORD", hide_env_values = true)]
    pub target_password: Option<String>,

    /// Connections per pool
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

#[derive(Args, Debug, Clone)]
pub struct OpenSearchArgs {
    #[arg(long, env = "OPENSEARCH_URL", default_value = "http://localhost:9200")]
    pub opensearch_url: String,

    #[arg(long, env = "OPENSEARCH_INDEX", default_value = "marketplace_listings")]
    pub opensearch_index: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::try_parse_from([
            "listings-migrator",
            "migrate",
            "--batch-size",
            "50",
            "--dry-run",
            "--resume-from",
            "100",
            "--entity",
            "listing",
            "--entity",
            "image",
            "--pace-ms",
            "250",
            "--target",
            "opensearch",
        ])
        .unwrap();

        let Command::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert_eq!(args.batch_size, 50);
        assert!(args.dry_run);
        assert!(!args.strict);
        assert_eq!(args.resume_from, Some(100));
        assert_eq!(
            args.entity_types(),
            vec![EntityType::from("listing"), EntityType::from("image")]
        );
        assert_eq!(args.pace(), Some(Duration::from_millis(250)));
        assert_eq!(args.target, TargetKind::Opensearch);
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from([
            "listings-migrator",
            "validate",
            "--sample-size",
            "25",
            "--max-mismatches",
            "2",
        ])
        .unwrap();

        let Command::Validate(args) = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.sample_size, 25);
        assert_eq!(args.max_mismatches, 2);
        assert_eq!(args.tolerance, 0.01);
        assert!(args.entity_types().is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        assert!(Cli::try_parse_from(["listings-migrator", "migrate", "--batch-size", "0"]).is_err());
    }
}
