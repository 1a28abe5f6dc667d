//! rclone-compatible command-line engine.
//!
//! Builds the argument vector for each operation from the shared [`Config`]
//! and runs the program as a child process, re-emitting every output line on
//! the `engine` tracing target so it lands in the operational log.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use super::error::EngineError;
use super::{Operation, TransferEngine};
use crate::config::Config;

pub struct RcloneEngine {
    config: Arc<Config>,
}

impl RcloneEngine {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

/// Path of the discrepancy report written by the check for `round`.
pub(crate) fn check_report_path(config: &Config, round: u64, now: &DateTime<Local>) -> PathBuf {
    config.log_dir.join(format!(
        "verify-round-{}-{}.txt",
        round,
        now.format("%Y%m%d-%H%M%S")
    ))
}

fn min_age_arg(config: &Config) -> String {
    format!("{}s", config.min_age_secs)
}

/// Arguments for a copy pass. `copy` never deletes destination-only objects.
pub(crate) fn sync_args(config: &Config, dry_run: bool) -> Vec<String> {
    let mut args = vec![
        "copy".to_string(),
        config.source.path(),
        config.dest.path(),
        "--size-only".to_string(),
        "--metadata".to_string(),
        "--min-age".to_string(),
        min_age_arg(config),
        "--transfers".to_string(),
        config.transfers.to_string(),
        "--checkers".to_string(),
        config.checkers.to_string(),
        "--s3-upload-concurrency".to_string(),
        config.upload_concurrency.to_string(),
        "--bwlimit".to_string(),
        config.bwlimit.clone(),
        "--tpslimit".to_string(),
        config.tps_limit.to_string(),
        "--s3-chunk-size".to_string(),
        config.chunk_size.clone(),
        "--s3-upload-cutoff".to_string(),
        config.upload_cutoff.clone(),
        "--retries".to_string(),
        config.engine_retries.to_string(),
        "--low-level-retries".to_string(),
        config.low_level_retries.to_string(),
        "--stats".to_string(),
        "60s".to_string(),
        "--stats-one-line".to_string(),
    ];
    if dry_run {
        args.push("--dry-run".to_string());
    }
    args
}

/// Arguments for a one-way, read-only consistency check.
pub(crate) fn check_args(config: &Config, round: u64, now: &DateTime<Local>) -> Vec<String> {
    vec![
        "check".to_string(),
        config.source.path(),
        config.dest.path(),
        "--one-way".to_string(),
        "--size-only".to_string(),
        "--min-age".to_string(),
        min_age_arg(config),
        "--checkers".to_string(),
        config.checkers.saturating_mul(2).to_string(),
        "--tpslimit".to_string(),
        config.tps_limit.to_string(),
        "--combined".to_string(),
        check_report_path(config, round, now).display().to_string(),
    ]
}

pub(crate) fn build_args(config: &Config, operation: &Operation, now: &DateTime<Local>) -> Vec<String> {
    match operation {
        Operation::Sync => sync_args(config, false),
        Operation::Preview => sync_args(config, true),
        Operation::Check { round } => check_args(config, *round, now),
    }
}

async fn forward_lines<R>(reader: Option<R>)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "engine", "{}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Engine output stream closed");
                break;
            }
        }
    }
}

#[async_trait]
impl TransferEngine for RcloneEngine {
    async fn execute(&self, operation: &Operation) -> Result<(), EngineError> {
        let program = self.config.engine_bin.clone();
        let args = build_args(&self.config, operation, &Local::now());
        tracing::debug!(%program, ?args, "Invoking engine");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (_, _, status) = tokio::join!(
            forward_lines(stdout),
            forward_lines(stderr),
            child.wait()
        );

        let status = status.map_err(|source| EngineError::Io {
            program: program.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Exit {
                program,
                code: status.code(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use chrono::TimeZone;
    use clap::Parser;

    fn config(overrides: impl FnOnce(&mut crate::cli::ConfigArgs)) -> Config {
        let mut args = Cli::try_parse_from(["bucket-migrator"]).unwrap().config;
        overrides(&mut args);
        Config::from_args(args).unwrap()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap()
    }

    #[test]
    fn sync_uses_copy_with_stability_filter() {
        let cfg = config(|a| {
            a.source_remote = "ceph".into();
            a.source_bucket = "raw".into();
            a.dest_remote = "s3".into();
            a.dest_bucket = "archive".into();
            a.min_age = 90;
        });
        let args = sync_args(&cfg, false);
        assert_eq!(&args[..3], &["copy", "ceph:raw", "s3:archive"]);
        assert!(args.contains(&"--size-only".to_string()));
        assert!(args.contains(&"--metadata".to_string()));
        assert!(!args.contains(&"--checksum".to_string()));
        assert_eq!(value_after(&args, "--min-age"), Some("90s"));
        assert!(!args.contains(&"--dry-run".to_string()));
    }

    #[test]
    fn sync_passes_limits_through_unchanged() {
        let cfg = config(|a| {
            a.transfers = 7;
            a.checkers = 9;
            a.upload_concurrency = 3;
            a.bwlimit = "50M".into();
            a.tps_limit = 25;
            a.chunk_size = "128M".into();
            a.upload_cutoff = "1G".into();
            a.engine_retries = 4;
            a.low_level_retries = 20;
        });
        let args = sync_args(&cfg, false);
        assert_eq!(value_after(&args, "--transfers"), Some("7"));
        assert_eq!(value_after(&args, "--checkers"), Some("9"));
        assert_eq!(value_after(&args, "--s3-upload-concurrency"), Some("3"));
        assert_eq!(value_after(&args, "--bwlimit"), Some("50M"));
        assert_eq!(value_after(&args, "--tpslimit"), Some("25"));
        assert_eq!(value_after(&args, "--s3-chunk-size"), Some("128M"));
        assert_eq!(value_after(&args, "--s3-upload-cutoff"), Some("1G"));
        assert_eq!(value_after(&args, "--retries"), Some("4"));
        assert_eq!(value_after(&args, "--low-level-retries"), Some("20"));
    }

    #[test]
    fn preview_is_sync_plus_dry_run() {
        let cfg = config(|_| {});
        let preview = build_args(&cfg, &Operation::Preview, &fixed_now());
        let sync = build_args(&cfg, &Operation::Sync, &fixed_now());
        assert_eq!(preview.last().map(String::as_str), Some("--dry-run"));
        assert_eq!(&preview[..preview.len() - 1], sync.as_slice());
    }

    #[test]
    fn check_is_one_way_with_doubled_checkers() {
        let cfg = config(|a| {
            a.checkers = 12;
            a.log_dir = "/var/log/migrate".into();
        });
        let args = build_args(&cfg, &Operation::Check { round: 20 }, &fixed_now());
        assert_eq!(args[0], "check");
        assert!(args.contains(&"--one-way".to_string()));
        assert!(args.contains(&"--size-only".to_string()));
        assert_eq!(value_after(&args, "--checkers"), Some("24"));
        assert_eq!(
            value_after(&args, "--combined"),
            Some("/var/log/migrate/verify-round-20-20250304-050607.txt")
        );
        for destructive in ["copy", "sync", "--delete-after", "--dry-run"] {
            assert!(!args.contains(&destructive.to_string()));
        }
    }

    #[tokio::test]
    async fn execute_reports_success() {
        let cfg = Arc::new(config(|a| a.engine_bin = "true".into()));
        let engine = RcloneEngine::new(cfg);
        engine.execute(&Operation::Sync).await.unwrap();
    }

    #[tokio::test]
    async fn execute_reports_nonzero_exit() {
        let cfg = Arc::new(config(|a| a.engine_bin = "false".into()));
        let engine = RcloneEngine::new(cfg);
        match engine.execute(&Operation::Sync).await {
            Err(EngineError::Exit { code, .. }) => assert_eq!(code, Some(1)),
            other => panic!("expected exit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn execute_reports_missing_program() {
        let cfg = Arc::new(config(|a| {
            a.engine_bin = "/nonexistent/bucket-migrator-engine".into()
        }));
        let engine = RcloneEngine::new(cfg);
        assert!(matches!(
            engine.execute(&Operation::Sync).await,
            Err(EngineError::Spawn { .. })
        ));
    }
}
