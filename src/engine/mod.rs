//! Transfer engine seam and the Sync Executor built on it.
//!
//! The engine is an external black box that copies, filters by age, enforces
//! rate limits, and reports success or failure. The controller only ever sees
//! `Ok(())` or an [`EngineError`].

pub mod error;
pub mod rclone;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

pub use error::EngineError;
pub use rclone::RcloneEngine;

/// A single stateless request to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Copy source to destination.
    Sync,
    /// Same filters as `Sync`, but nothing is transferred.
    Preview,
    /// One-way, read-only comparison of source against destination.
    Check { round: u64 },
}

/// Object-safe engine handle, shared as `Arc<dyn TransferEngine>`.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn execute(&self, operation: &Operation) -> Result<(), EngineError>;
}

/// Runs one copy pass through the engine.
///
/// Error subtypes are not distinguished here; any failure is handed to the
/// retry controller as-is.
#[derive(Clone)]
pub struct SyncExecutor {
    engine: Arc<dyn TransferEngine>,
}

impl SyncExecutor {
    pub fn new(engine: Arc<dyn TransferEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn TransferEngine> {
        &self.engine
    }

    pub async fn attempt_sync(&self) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.engine.execute(&Operation::Sync).await;
        match &result {
            Ok(()) => tracing::debug!(
                elapsed_secs = started.elapsed().as_secs(),
                "Sync pass completed"
            ),
            Err(e) => tracing::warn!(
                elapsed_secs = started.elapsed().as_secs(),
                "Sync pass failed: {}",
                e
            ),
        }
        result
    }

    /// One-time dry run for operator visibility. The outcome never affects
    /// the schedule.
    pub async fn preview(&self) {
        tracing::info!("Running dry-run preview (no data will be transferred)");
        match self.engine.execute(&Operation::Preview).await {
            Ok(()) => tracing::info!("Dry-run preview finished"),
            Err(e) => tracing::warn!("Dry-run preview failed: {}", e),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedEngine;
    use super::*;

    #[tokio::test]
    async fn attempt_sync_maps_engine_result() {
        let engine = Arc::new(ScriptedEngine::new([false, true], true));
        let executor = SyncExecutor::new(engine.clone());
        assert!(executor.attempt_sync().await.is_err());
        assert!(executor.attempt_sync().await.is_ok());
        assert_eq!(engine.calls(), vec![Operation::Sync, Operation::Sync]);
    }

    #[tokio::test]
    async fn preview_issues_preview_operation_only() {
        let engine = Arc::new(ScriptedEngine::new([], true));
        let executor = SyncExecutor::new(engine.clone());
        executor.preview().await;
        assert_eq!(engine.calls(), vec![Operation::Preview]);
    }
}
