//! Round scheduler: the top-level migration loop.
//!
//! Each round runs one sync attempt, falls back to bounded backoff on
//! failure, optionally verifies, then sleeps a fixed interval. Rounds are
//! strictly sequential and the loop only ends on cancellation.

pub mod verify;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::{SyncExecutor, TransferEngine};
use crate::retry::{retry_with_backoff, RetryConfig, RetryOutcome};
use crate::systemd::SystemdNotifier;

pub use verify::{VerificationScheduler, VerifyOutcome};

/// How a round's sync resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResolution {
    FirstAttempt,
    Retried { attempt: u32 },
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u64,
    pub sync: SyncResolution,
    pub verification: Option<VerifyOutcome>,
}

impl RoundReport {
    fn summary(&self) -> String {
        let sync = match self.sync {
            SyncResolution::FirstAttempt => "sync ok".to_string(),
            SyncResolution::Retried { attempt } => format!("sync ok after retry {attempt}"),
            SyncResolution::Exhausted { attempts } => {
                format!("sync failed after {attempts} retries")
            }
        };
        match &self.verification {
            Some(VerifyOutcome::Consistent) => format!("round {}: {sync}, verified", self.round),
            Some(VerifyOutcome::Discrepancies(_)) => {
                format!("round {}: {sync}, verification found discrepancies", self.round)
            }
            None => format!("round {}: {sync}", self.round),
        }
    }
}

pub struct RoundScheduler {
    executor: SyncExecutor,
    verifier: VerificationScheduler,
    retry: RetryConfig,
    interval: Duration,
    preview: bool,
    notifier: SystemdNotifier,
    /// Owned exclusively by this scheduler; starts at 0 so the first round is 1.
    round: u64,
}

impl RoundScheduler {
    pub fn new(
        executor: SyncExecutor,
        verifier: VerificationScheduler,
        retry: RetryConfig,
        interval: Duration,
    ) -> Self {
        Self {
            executor,
            verifier,
            retry,
            interval,
            preview: false,
            notifier: SystemdNotifier::disabled(),
            round: 0,
        }
    }

    pub(crate) fn from_config(
        config: &Config,
        engine: Arc<dyn TransferEngine>,
        notifier: SystemdNotifier,
    ) -> Self {
        let verifier = VerificationScheduler::new(engine.clone(), config.verify_every);
        Self::new(
            SyncExecutor::new(engine),
            verifier,
            config.retry(),
            config.sync_interval(),
        )
        .with_preview(config.dry_run_preview)
        .with_notifier(notifier)
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub(crate) fn with_notifier(mut self, notifier: SystemdNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Number of rounds started so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Run one full round: sync, backoff fallback, optional verification.
    pub async fn run_round(&mut self) -> RoundReport {
        self.round += 1;
        let round = self.round;
        let started = Instant::now();
        tracing::info!(round, "Round {} started", round);

        let sync = match self.executor.attempt_sync().await {
            Ok(()) => {
                tracing::info!(round, "Round {} sync succeeded", round);
                SyncResolution::FirstAttempt
            }
            Err(e) => {
                tracing::warn!(round, "Round {} sync failed, entering backoff", round);
                let executor = &self.executor;
                match retry_with_backoff(&self.retry, e, move || executor.attempt_sync()).await {
                    RetryOutcome::Resolved { attempt, .. } => {
                        tracing::info!(round, attempt, "Round {} resolved on retry {}", round, attempt);
                        SyncResolution::Retried { attempt }
                    }
                    RetryOutcome::Exhausted {
                        last_error,
                        attempts,
                    } => {
                        tracing::error!(
                            round,
                            attempts,
                            "Round {} retries exhausted, continuing with next round: {}",
                            round,
                            last_error
                        );
                        SyncResolution::Exhausted { attempts }
                    }
                }
            }
        };

        let verification = self.verifier.maybe_verify(round).await;

        let report = RoundReport {
            round,
            sync,
            verification,
        };
        tracing::info!(
            round,
            "Round {} finished in {}s",
            round,
            started.elapsed().as_secs()
        );
        self.notifier.notify_round(&report.summary());
        report
    }

    /// Loop until `shutdown` is cancelled.
    ///
    /// Cancellation is observed between rounds, during the inter-round sleep,
    /// and around the in-flight round; an in-flight round is abandoned rather
    /// than finished, which drops (and kills) any running engine child.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        if self.preview {
            let executor = self.executor.clone();
            tokio::select! {
                _ = executor.preview() => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested during dry-run preview");
                    return;
                }
            }
        }

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = self.run_round() => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, abandoning in-flight round");
                    break;
                }
            }

            tracing::info!("Sleeping {}s until next round", self.interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested while waiting for next round");
                    break;
                }
            }
        }

        tracing::info!(rounds = self.round, "Round scheduler stopped");
    }
}
