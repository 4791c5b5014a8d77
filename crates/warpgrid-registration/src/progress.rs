//! Progress reporting and cancellation for long-running solves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use crate::error::{RegistrationError, Result};

/// Cooperative cancellation flag, shared by cloning.
///
/// Solvers poll it between iterations; the λ sweep and barrier backoff poll
/// it between rounds.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RegistrationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Progress information for one λ-sweep round.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Round number, starting at 1.
    pub round: usize,
    /// Total number of rounds, when known in advance.
    pub total_rounds: Option<usize>,
    /// Regularization weight used in this round.
    pub lambda: f64,
    /// Total penalty of the round winner.
    pub penalty: f64,
    /// Data-only part of `penalty`.
    pub data_penalty: f64,
    /// Time elapsed since the sweep started.
    pub elapsed: Duration,
}

impl ProgressInfo {
    /// Calculate progress percentage.
    pub fn progress_percent(&self) -> Option<f64> {
        self.total_rounds
            .map(|total| (self.round as f64 / total as f64) * 100.0)
    }
}

/// Progress callback trait for monitoring registration progress.
pub trait ProgressCallback: Send + Sync {
    /// Called after every completed round.
    fn on_progress(&self, info: &ProgressInfo);

    fn on_start(&self) {}

    /// Called with the round that was finally selected.
    fn on_complete(&self, _info: &ProgressInfo) {}

    fn on_error(&self, _error: &str) {}
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (rounds).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 1 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.round % self.log_interval == 0 || info.total_rounds == Some(info.round) {
            tracing::info!(
                "Round {}/{} | λ: {:.3e} | Penalty: {:.6} | Data: {:.6} | Elapsed: {:.2}s",
                info.round,
                info.total_rounds.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
                info.lambda,
                info.penalty,
                info.data_penalty,
                info.elapsed.as_secs_f64()
            );
        }
    }

    fn on_start(&self) {
        tracing::info!("λ sweep started");
    }

    fn on_complete(&self, info: &ProgressInfo) {
        tracing::info!(
            "λ sweep selected round {} (λ = {:.3e}, penalty {:.6}) after {:.2}s",
            info.round,
            info.lambda,
            info.penalty,
            info.elapsed.as_secs_f64()
        );
    }

    fn on_error(&self, error: &str) {
        tracing::error!("λ sweep failed: {}", error);
    }
}

/// History callback that records all progress information.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(info.clone());
    }
}
