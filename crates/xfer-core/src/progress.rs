//! Progress reporting and cancellation shared by every streaming path.

use crate::error::{OperationResult, TransferError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// One progress sample handed to the caller's callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
    pub rate_bytes_per_sec: f64,
}

impl TransferProgress {
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some(self.bytes_transferred as f64 / total as f64 * 100.0),
            None => None,
        }
    }
}

/// Caller-supplied progress sink.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Wrap a callback so that it never observes a smaller byte count than it
/// already saw, even across orchestrator retries of the same operation.
pub fn monotonic(callback: ProgressCallback) -> ProgressCallback {
    let high_water = Arc::new(AtomicU64::new(0));
    Arc::new(move |p: TransferProgress| {
        let prev = high_water.fetch_max(p.bytes_transferred, Ordering::SeqCst);
        if p.bytes_transferred >= prev {
            callback(p);
        }
    })
}

// ─── Reporter ───────────────────────────────────────────────────────────────

/// How raw byte counts of the current stream map onto the caller's view.
///
/// Staged transfers run two streams over the same file: the download maps
/// onto the first half of the logical range, the upload onto the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Direct,
    FirstHalf,
    SecondHalf,
}

/// Per-operation, throttled, monotonic progress emitter.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    interval: Duration,
    phase: Phase,
    started: Instant,
    last_emit: Option<Instant>,
    emitted: Option<u64>,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, interval: Duration) -> Self {
        Self {
            callback,
            interval,
            phase: Phase::Direct,
            started: Instant::now(),
            last_emit: None,
            emitted: None,
        }
    }

    /// Reporter that tracks nothing and calls nobody.
    pub fn silent() -> Self {
        Self::new(None, Duration::from_millis(100))
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Largest logical byte count emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.unwrap_or(0)
    }

    /// Record `bytes` of the current stream. Emits at most once per interval,
    /// plus once when the logical total is reached.
    pub fn update(&mut self, bytes: u64, total: Option<u64>) {
        let (logical, logical_total) = self.map(bytes, total);
        let reached_total = logical_total == Some(logical);
        let due = match self.last_emit {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        };
        if due || (reached_total && self.emitted != Some(logical)) {
            self.emit(logical, logical_total);
        }
    }

    /// Force a final emission for the current stream.
    pub fn finish(&mut self, bytes: u64, total: Option<u64>) {
        let (logical, logical_total) = self.map(bytes, total);
        if self.emitted != Some(logical) || self.last_emit.is_none() {
            self.emit(logical, logical_total);
        }
    }

    fn map(&self, bytes: u64, total: Option<u64>) -> (u64, Option<u64>) {
        match (self.phase, total) {
            (Phase::Direct, _) => (bytes, total),
            (Phase::FirstHalf, _) => (bytes / 2, total),
            (Phase::SecondHalf, Some(t)) => {
                let done = bytes.min(t);
                (t - (t - done) / 2, Some(t))
            }
            (Phase::SecondHalf, None) => (self.emitted().max(bytes), None),
        }
    }

    fn emit(&mut self, logical: u64, total: Option<u64>) {
        let logical = logical.max(self.emitted());
        self.emitted = Some(logical);
        self.last_emit = Some(Instant::now());
        if let Some(cb) = &self.callback {
            let secs = self.started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 { logical as f64 / secs } else { 0.0 };
            cb(TransferProgress {
                bytes_transferred: logical,
                total_bytes: total,
                rate_bytes_per_sec: rate,
            });
        }
    }
}

// ─── Cancellation ───────────────────────────────────────────────────────────

/// Cloneable cancellation token checked between buffer-sized chunks.
#[derive(Clone)]
pub struct TransferControl {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl Default for TransferControl {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransferControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferControl")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl TransferControl {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            cancel_tx: Arc::new(cancel_tx),
        }
    }

    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// `Err(CANCELLED)` once cancellation has been requested.
    pub fn checkpoint(&self) -> OperationResult<()> {
        if self.is_cancelled() {
            Err(TransferError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|c| *c).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn collector() -> (ProgressCallback, Arc<Mutex<Vec<TransferProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));
        (cb, seen)
    }

    #[test]
    fn throttles_but_always_reports_total() {
        let (cb, seen) = collector();
        let mut r = ProgressReporter::new(Some(cb), Duration::from_secs(60));
        for i in 1..=10u64 {
            r.update(i * 10, Some(100));
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2, "first sample and the final one");
        assert_eq!(seen.last().unwrap().bytes_transferred, 100);
    }

    #[test]
    fn staged_phases_are_continuous() {
        let (cb, seen) = collector();
        let mut r = ProgressReporter::new(Some(cb), Duration::ZERO);
        r.set_phase(Phase::FirstHalf);
        for b in [0u64, 33, 66, 101] {
            r.update(b, Some(101));
        }
        r.set_phase(Phase::SecondHalf);
        for b in [0u64, 50, 101] {
            r.update(b, Some(101));
        }
        let values: Vec<u64> = seen.lock().unwrap().iter().map(|p| p.bytes_transferred).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
        assert_eq!(*values.last().unwrap(), 101);
        assert!(values.contains(&50), "download ends at half: {values:?}");
    }

    #[test]
    fn reporter_never_goes_backwards() {
        let (cb, seen) = collector();
        let mut r = ProgressReporter::new(Some(cb), Duration::ZERO);
        r.update(50, None);
        r.update(10, None);
        let values: Vec<u64> = seen.lock().unwrap().iter().map(|p| p.bytes_transferred).collect();
        assert_eq!(values, vec![50, 50]);
    }

    #[test]
    fn monotonic_wrapper_drops_regressions() {
        let (cb, seen) = collector();
        let wrapped = monotonic(cb);
        for b in [10u64, 20, 5, 30] {
            wrapped(TransferProgress {
                bytes_transferred: b,
                total_bytes: None,
                rate_bytes_per_sec: 0.0,
            });
        }
        let values: Vec<u64> = seen.lock().unwrap().iter().map(|p| p.bytes_transferred).collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn control_cancels_clones() {
        let control = TransferControl::new();
        let other = control.clone();
        assert!(control.checkpoint().is_ok());
        let waiter = tokio::spawn(async move { other.cancelled().await });
        control.cancel();
        waiter.await.unwrap();
        assert!(control.checkpoint().unwrap_err().is_cancelled());
    }
}
