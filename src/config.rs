use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cli::ConfigArgs;
use crate::retry::RetryConfig;
use crate::types::LogLevel;

/// Rejected parameter combinations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("sync interval must be at least one second")]
    ZeroInterval,

    #[error("retry cap ({max}s) is below the retry base ({base}s)")]
    RetryCapBelowBase { base: u64, max: u64 },
}

/// One side of the migration: an engine remote plus a bucket on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub remote: String,
    pub bucket: String,
}

impl Endpoint {
    /// `remote:bucket`, the engine's path syntax.
    pub fn path(&self) -> String {
        format!("{}:{}", self.remote, self.bucket)
    }
}

/// Application configuration, resolved once at startup and shared read-only
/// as `Arc<Config>` by every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source: Endpoint,
    pub dest: Endpoint,
    pub engine_bin: String,
    pub bwlimit: String,
    pub chunk_size: String,
    pub upload_cutoff: String,

    pub run_dir: PathBuf,
    pub log_dir: PathBuf,
    pub pid_file: PathBuf,
    pub lock_file: PathBuf,

    pub sync_interval_secs: u64,
    pub min_age_secs: u64,
    pub retry_base_secs: u64,
    pub retry_max_secs: u64,
    pub verify_every: u64,
    pub start_timeout_secs: u64,

    pub transfers: u32,
    pub checkers: u32,
    pub upload_concurrency: u32,
    pub tps_limit: u32,
    pub engine_retries: u32,
    pub low_level_retries: u32,
    pub max_retries: u32,
    pub stop_timeout_polls: u32,

    pub log_level: LogLevel,

    pub dry_run_preview: bool,
    pub notify_systemd: bool,
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn non_empty(value: String, name: &'static str) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty(name))
    } else {
        Ok(value)
    }
}

impl Config {
    pub fn from_args(args: ConfigArgs) -> Result<Self, ConfigError> {
        let run_dir = expand_tilde(&args.run_dir);
        let log_dir = expand_tilde(&args.log_dir);
        let pid_file = args
            .pid_file
            .unwrap_or_else(|| run_dir.join("migrate.pid"));
        let lock_file = args
            .lock_file
            .unwrap_or_else(|| run_dir.join("migrate.lock"));

        let config = Self {
            source: Endpoint {
                remote: non_empty(args.source_remote, "source remote")?,
                bucket: non_empty(args.source_bucket, "source bucket")?,
            },
            dest: Endpoint {
                remote: non_empty(args.dest_remote, "destination remote")?,
                bucket: non_empty(args.dest_bucket, "destination bucket")?,
            },
            engine_bin: non_empty(args.engine_bin, "engine program")?,
            bwlimit: args.bwlimit,
            chunk_size: args.chunk_size,
            upload_cutoff: args.upload_cutoff,
            run_dir,
            log_dir,
            pid_file,
            lock_file,
            sync_interval_secs: args.sync_interval,
            min_age_secs: args.min_age,
            retry_base_secs: args.retry_base,
            retry_max_secs: args.retry_max,
            verify_every: args.verify_every,
            start_timeout_secs: args.start_timeout,
            transfers: args.transfers,
            checkers: args.checkers,
            upload_concurrency: args.upload_concurrency,
            tps_limit: args.tps_limit,
            engine_retries: args.engine_retries,
            low_level_retries: args.low_level_retries,
            max_retries: args.max_retries,
            stop_timeout_polls: args.stop_timeout,
            log_level: args.log_level,
            dry_run_preview: args.dry_run_preview,
            notify_systemd: args.notify_systemd,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.retry_max_secs < self.retry_base_secs {
            return Err(ConfigError::RetryCapBelowBase {
                base: self.retry_base_secs,
                max: self.retry_max_secs,
            });
        }
        Ok(())
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay_secs: self.retry_base_secs,
            max_delay_secs: self.retry_max_secs,
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Render the resolved snapshot back into the environment variables the
    /// CLI reads, so a spawned control loop resolves the identical config.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        vec![
            ("MIGRATE_SOURCE_REMOTE", self.source.remote.clone()),
            ("MIGRATE_SOURCE_BUCKET", self.source.bucket.clone()),
            ("MIGRATE_DEST_REMOTE", self.dest.remote.clone()),
            ("MIGRATE_DEST_BUCKET", self.dest.bucket.clone()),
            ("MIGRATE_SYNC_INTERVAL", self.sync_interval_secs.to_string()),
            ("MIGRATE_MIN_AGE", self.min_age_secs.to_string()),
            ("MIGRATE_TRANSFERS", self.transfers.to_string()),
            ("MIGRATE_CHECKERS", self.checkers.to_string()),
            ("MIGRATE_UPLOAD_CONCURRENCY", self.upload_concurrency.to_string()),
            ("MIGRATE_BWLIMIT", self.bwlimit.clone()),
            ("MIGRATE_TPS_LIMIT", self.tps_limit.to_string()),
            ("MIGRATE_CHUNK_SIZE", self.chunk_size.clone()),
            ("MIGRATE_UPLOAD_CUTOFF", self.upload_cutoff.clone()),
            ("MIGRATE_ENGINE_RETRIES", self.engine_retries.to_string()),
            ("MIGRATE_LOW_LEVEL_RETRIES", self.low_level_retries.to_string()),
            ("MIGRATE_MAX_RETRIES", self.max_retries.to_string()),
            ("MIGRATE_RETRY_BASE", self.retry_base_secs.to_string()),
            ("MIGRATE_RETRY_MAX", self.retry_max_secs.to_string()),
            ("MIGRATE_VERIFY_EVERY", self.verify_every.to_string()),
            ("MIGRATE_DRY_RUN_PREVIEW", self.dry_run_preview.to_string()),
            ("MIGRATE_ENGINE_BIN", self.engine_bin.clone()),
            ("MIGRATE_RUN_DIR", self.run_dir.display().to_string()),
            ("MIGRATE_LOG_DIR", self.log_dir.display().to_string()),
            ("MIGRATE_PID_FILE", self.pid_file.display().to_string()),
            ("MIGRATE_LOCK_FILE", self.lock_file.display().to_string()),
            ("MIGRATE_LOG_LEVEL", self.log_level.as_str().to_string()),
            ("MIGRATE_START_TIMEOUT", self.start_timeout_secs.to_string()),
            ("MIGRATE_STOP_TIMEOUT", self.stop_timeout_polls.to_string()),
            ("MIGRATE_NOTIFY_SYSTEMD", self.notify_systemd.to_string()),
        ]
    }
}
