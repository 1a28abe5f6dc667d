use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "bucket-migrator",
    version,
    about = "Continuously migrate one object-storage bucket into another"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the migration loop in the background (default)
    Start,
    /// Stop the background migration loop
    Stop,
    /// Report whether the migration loop is running
    Status,
    /// Run the migration loop attached to this terminal
    Foreground,
    /// Detached control loop spawned by `start`
    #[command(hide = true)]
    Daemon,
}

impl Cli {
    /// The subcommand to run; a bare invocation means `start`.
    pub fn effective_command(&self) -> Command {
        self.command.unwrap_or(Command::Start)
    }
}

/// Operational parameters. Every flag also reads the named environment
/// variable, which is the documented configuration surface.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Source endpoint (engine remote name)
    #[arg(long, global = true, env = "MIGRATE_SOURCE_REMOTE", default_value = "source")]
    pub source_remote: String,

    /// Source bucket
    #[arg(long, global = true, env = "MIGRATE_SOURCE_BUCKET", default_value = "source-bucket")]
    pub source_bucket: String,

    /// Destination endpoint (engine remote name)
    #[arg(long, global = true, env = "MIGRATE_DEST_REMOTE", default_value = "dest")]
    pub dest_remote: String,

    /// Destination bucket
    #[arg(long, global = true, env = "MIGRATE_DEST_BUCKET", default_value = "dest-bucket")]
    pub dest_bucket: String,

    /// Seconds to sleep between rounds
    #[arg(long, global = true, env = "MIGRATE_SYNC_INTERVAL", default_value_t = 300)]
    pub sync_interval: u64,

    /// Skip objects modified less than N seconds ago
    #[arg(long, global = true, env = "MIGRATE_MIN_AGE", default_value_t = 60)]
    pub min_age: u64,

    /// Engine transfer parallelism
    #[arg(long, global = true, env = "MIGRATE_TRANSFERS", default_value_t = 16)]
    pub transfers: u32,

    /// Engine checker parallelism (doubled for verification)
    #[arg(long, global = true, env = "MIGRATE_CHECKERS", default_value_t = 32)]
    pub checkers: u32,

    /// Multipart upload concurrency
    #[arg(long, global = true, env = "MIGRATE_UPLOAD_CONCURRENCY", default_value_t = 8)]
    pub upload_concurrency: u32,

    /// Bandwidth ceiling in engine syntax ("0" disables)
    #[arg(long, global = true, env = "MIGRATE_BWLIMIT", default_value = "0")]
    pub bwlimit: String,

    /// Requests-per-second ceiling (0 disables)
    #[arg(long, global = true, env = "MIGRATE_TPS_LIMIT", default_value_t = 0)]
    pub tps_limit: u32,

    /// Multipart chunk size
    #[arg(long, global = true, env = "MIGRATE_CHUNK_SIZE", default_value = "64M")]
    pub chunk_size: String,

    /// Size above which uploads switch to multipart
    #[arg(long, global = true, env = "MIGRATE_UPLOAD_CUTOFF", default_value = "200M")]
    pub upload_cutoff: String,

    /// Retries performed inside the engine itself
    #[arg(long, global = true, env = "MIGRATE_ENGINE_RETRIES", default_value_t = 3)]
    pub engine_retries: u32,

    /// Low-level retries performed inside the engine itself
    #[arg(long, global = true, env = "MIGRATE_LOW_LEVEL_RETRIES", default_value_t = 10)]
    pub low_level_retries: u32,

    /// Backoff retries after a failed round
    #[arg(long, global = true, env = "MIGRATE_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Backoff base delay in seconds
    #[arg(long, global = true, env = "MIGRATE_RETRY_BASE", default_value_t = 30)]
    pub retry_base: u64,

    /// Backoff delay cap in seconds
    #[arg(long, global = true, env = "MIGRATE_RETRY_MAX", default_value_t = 600)]
    pub retry_max: u64,

    /// Run a one-way consistency check every N rounds (0 disables)
    #[arg(long, global = true, env = "MIGRATE_VERIFY_EVERY", default_value_t = 10)]
    pub verify_every: u64,

    /// Run a dry-run preview once before the first round
    #[arg(long, global = true, env = "MIGRATE_DRY_RUN_PREVIEW", default_value_t = false, action = clap::ArgAction::Set)]
    pub dry_run_preview: bool,

    /// Transfer engine program
    #[arg(long, global = true, env = "MIGRATE_ENGINE_BIN", default_value = "rclone")]
    pub engine_bin: String,

    /// Directory holding the pid and lock files
    #[arg(long, global = true, env = "MIGRATE_RUN_DIR", default_value = "./run")]
    pub run_dir: String,

    /// Directory holding the operational log
    #[arg(long, global = true, env = "MIGRATE_LOG_DIR", default_value = "./logs")]
    pub log_dir: String,

    /// Process identifier record (default: <run-dir>/migrate.pid)
    #[arg(long, global = true, env = "MIGRATE_PID_FILE")]
    pub pid_file: Option<PathBuf>,

    /// Exclusive lock file (default: <run-dir>/migrate.lock)
    #[arg(long, global = true, env = "MIGRATE_LOCK_FILE")]
    pub lock_file: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, value_enum, env = "MIGRATE_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Seconds `start` waits for the background loop to report readiness
    #[arg(long, global = true, env = "MIGRATE_START_TIMEOUT", default_value_t = 15)]
    pub start_timeout: u64,

    /// One-second liveness polls `stop` makes before forcing termination
    #[arg(long, global = true, env = "MIGRATE_STOP_TIMEOUT", default_value_t = 30)]
    pub stop_timeout: u32,

    /// Send sd_notify readiness and status messages
    #[arg(long, global = true, env = "MIGRATE_NOTIFY_SYSTEMD", default_value_t = false, action = clap::ArgAction::Set)]
    pub notify_systemd: bool,
}
