//! Periodic one-way consistency audit.

use std::sync::Arc;

use crate::engine::{Operation, TransferEngine};

/// What a verification pass found. Neither outcome changes the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Consistent,
    /// The check reported differences or could not run; the message is the
    /// engine error as logged.
    Discrepancies(String),
}

pub struct VerificationScheduler {
    engine: Arc<dyn TransferEngine>,
    every: u64,
}

impl VerificationScheduler {
    /// `every == 0` disables verification entirely.
    pub fn new(engine: Arc<dyn TransferEngine>, every: u64) -> Self {
        Self { engine, every }
    }

    pub fn is_due(&self, round: u64) -> bool {
        self.every != 0 && round % self.every == 0
    }

    /// Run the check if `round` falls on the cadence. Failures are logged and
    /// absorbed here.
    pub async fn maybe_verify(&self, round: u64) -> Option<VerifyOutcome> {
        if !self.is_due(round) {
            return None;
        }

        tracing::info!(round, "Round {} verification: one-way check started", round);
        let outcome = match self.engine.execute(&Operation::Check { round }).await {
            Ok(()) => {
                tracing::info!(round, "Round {} verification: source and destination consistent", round);
                VerifyOutcome::Consistent
            }
            Err(e) => {
                tracing::warn!(
                    round,
                    "Round {} verification reported discrepancies or failed: {}",
                    round,
                    e
                );
                VerifyOutcome::Discrepancies(e.to_string())
            }
        };
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedEngine;

    #[test]
    fn fires_exactly_on_multiples() {
        let v = VerificationScheduler::new(Arc::new(ScriptedEngine::new([], true)), 10);
        let due: Vec<u64> = (1..=35).filter(|r| v.is_due(*r)).collect();
        assert_eq!(due, vec![10, 20, 30]);
        assert!(!v.is_due(9));
        assert!(!v.is_due(11));
    }

    #[test]
    fn every_round_when_cadence_is_one() {
        let v = VerificationScheduler::new(Arc::new(ScriptedEngine::new([], true)), 1);
        assert!((1..=5).all(|r| v.is_due(r)));
    }

    #[test]
    fn zero_cadence_disables() {
        let v = VerificationScheduler::new(Arc::new(ScriptedEngine::new([], true)), 0);
        assert!((1..=100).all(|r| !v.is_due(r)));
    }

    #[tokio::test]
    async fn skipped_rounds_do_not_touch_engine() {
        let engine = Arc::new(ScriptedEngine::new([], true));
        let v = VerificationScheduler::new(engine.clone(), 4);
        assert_eq!(v.maybe_verify(3).await, None);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn due_round_runs_check_for_that_round() {
        let engine = Arc::new(ScriptedEngine::new([], true));
        let v = VerificationScheduler::new(engine.clone(), 4);
        assert_eq!(v.maybe_verify(8).await, Some(VerifyOutcome::Consistent));
        assert_eq!(engine.calls(), vec![Operation::Check { round: 8 }]);
    }

    #[tokio::test]
    async fn check_failure_is_absorbed() {
        let engine = Arc::new(ScriptedEngine::new([], false));
        let v = VerificationScheduler::new(engine, 2);
        match v.maybe_verify(2).await {
            Some(VerifyOutcome::Discrepancies(msg)) => assert!(msg.contains("exited")),
            other => panic!("expected discrepancies, got {:?}", other),
        }
    }
}
