use anyhow::bail;
use clap::{Parser, Subcommand};
use refseq_core::{
    EntityId, EntityKind, LoggingConfig, ProjectId, RefseqConfig, ReferenceConfig, RetryPolicy,
    StoreConfig,
};
use std::path::PathBuf;

/// Command-line arguments for the `refseq` binary.
///
/// Every global flag can also come from the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "refseq",
    version,
    about = "Per-project reference numbering for user stories, issues and tasks"
)]
pub struct CliArgs {
    /// SQLite database file.
    ///
    /// Environment variable: `REFSEQ_DB`
    #[arg(long, env = "REFSEQ_DB", default_value = "refseq.sqlite3")]
    pub db: PathBuf,

    /// Log level: trace, debug, info, warn or error.
    ///
    /// Environment variable: `REFSEQ_LOG_LEVEL`
    #[arg(long, env = "REFSEQ_LOG_LEVEL", default_value_t = String::from("warn"))]
    pub log_level: String,

    /// Absolute directory for rolling log files. Logs go to stderr when unset.
    ///
    /// Environment variable: `REFSEQ_LOG_DIR`
    #[arg(long, env = "REFSEQ_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Milliseconds a connection waits on a locked database.
    ///
    /// Environment variable: `REFSEQ_BUSY_TIMEOUT_MS`
    #[arg(long, env = "REFSEQ_BUSY_TIMEOUT_MS", default_value_t = 5_000)]
    pub busy_timeout_ms: u64,

    /// Attempts per sequence operation while the store is unavailable.
    ///
    /// Environment variable: `REFSEQ_RETRY_ATTEMPTS`
    #[arg(long, env = "REFSEQ_RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    /// Linear backoff step between retries, in milliseconds.
    ///
    /// Environment variable: `REFSEQ_RETRY_BACKOFF_MS`
    #[arg(long, env = "REFSEQ_RETRY_BACKOFF_MS", default_value_t = 10)]
    pub retry_backoff_ms: u64,

    /// Create a missing project sequence on first item instead of failing.
    ///
    /// Environment variable: `REFSEQ_LAZY_SEQUENCES`
    #[arg(long, env = "REFSEQ_LAZY_SEQUENCES", default_value_t = false)]
    pub lazy_sequences: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create or delete projects.
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Create a user story, issue or task.
    Item {
        #[arg(long)]
        project: ProjectId,
        /// userstory, issue or task.
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        subject: String,
        /// Keep this number instead of allocating one (bulk import).
        #[arg(long)]
        import_ref: Option<i64>,
    },
    /// List a project's work items.
    Items { project: ProjectId },
    /// Print a project's reference records as JSON.
    References { project: ProjectId },
    /// Find the entity behind `#ref` in a project.
    Resolve { project: ProjectId, reference: i64 },
    /// Print the reference record held by one entity.
    ReferenceOf {
        /// userstory, issue or task.
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: EntityId,
    },
    /// List all sequences and their current values.
    Sequences,
    /// Move a project's sequence past numbers written by an import.
    FinishImport { project: ProjectId },
    /// Delete reference records kept for a removed project.
    PurgeReferences { project: ProjectId },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProjectCommand {
    Create { name: String },
    Delete { id: ProjectId },
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub db: PathBuf,
    pub logging: LoggingConfig,
    pub core: RefseqConfig,
}

impl TryFrom<&CliArgs> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CliArgs) -> Result<Self, Self::Error> {
        if args.retry_attempts == 0 {
            bail!("REFSEQ_RETRY_ATTEMPTS must be greater than 0");
        }
        if args.db.as_os_str().is_empty() {
            bail!("REFSEQ_DB cannot be empty");
        }

        Ok(Self {
            db: args.db.clone(),
            logging: LoggingConfig {
                level: args.log_level.clone(),
                log_dir: args.log_dir.clone(),
                duplicate_to_stderr: args.log_dir.is_some(),
                ..LoggingConfig::default()
            },
            core: RefseqConfig {
                store: StoreConfig {
                    busy_timeout_ms: args.busy_timeout_ms,
                },
                reference: ReferenceConfig {
                    lazy_sequence_creation: args.lazy_sequences,
                    retry: RetryPolicy {
                        max_attempts: args.retry_attempts,
                        backoff_ms: args.retry_backoff_ms,
                    },
                },
            },
        })
    }
}
