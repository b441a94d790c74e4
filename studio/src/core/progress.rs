//! Progress Reporting
//!
//! Human-readable progress for long-running operations. Messages are for
//! display only and never affect control flow.
//!
//! [`ProgressSlot`] is a single display slot with two possible writers: a
//! cosmetic rotating ticker and the real operation. Ownership moves to the
//! real writer on its first report and never moves back, so the ticker can
//! not overwrite real progress.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Rotation period of the reassurance ticker
pub const DEFAULT_TICKER_PERIOD: Duration = Duration::from_secs(5);

/// Reassurance messages shown while a video is being generated
pub const DEFAULT_TICKER_MESSAGES: [&str; 6] = [
    "Warming up the cameras...",
    "Setting the scene...",
    "Directing the actors...",
    "Rolling film...",
    "Adding the final touches...",
    "Almost there, good things take time...",
];

/// Receiver of progress messages
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, message: &str) {
        self(message)
    }
}

/// Sink that drops every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _message: &str) {}
}

/// Who currently owns the display slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOwner {
    /// Nothing has been written yet
    Idle,
    /// The reassurance ticker
    Ticker,
    /// The operation itself
    Real,
}

/// Current content of the display slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    pub message: Option<String>,
    pub owner: ProgressOwner,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            message: None,
            owner: ProgressOwner::Idle,
        }
    }
}

/// Single-owner progress mailbox
#[derive(Debug, Clone)]
pub struct ProgressSlot {
    tx: Arc<watch::Sender<ProgressState>>,
}

impl Default for ProgressSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to slot updates (for display)
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.tx.subscribe()
    }

    /// Snapshot of the current slot content
    pub fn current(&self) -> ProgressState {
        self.tx.borrow().clone()
    }

    /// Sink for real progress. Its first write takes the slot from the ticker.
    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter {
            tx: Arc::clone(&self.tx),
        }
    }

    /// Start the rotating reassurance ticker
    ///
    /// The first message is shown immediately, then the next one every
    /// `period`. The ticker stops for good once real progress is reported,
    /// when the slot is dropped, or when the returned guard is dropped.
    pub fn start_ticker(&self, messages: Vec<String>, period: Duration) -> TickerGuard {
        if messages.is_empty() || !ticker_write(&self.tx, &messages[0]) {
            return TickerGuard { handle: None };
        }

        let weak = Arc::downgrade(&self.tx);
        let handle = tokio::spawn(run_ticker(weak, messages, period));
        TickerGuard {
            handle: Some(handle),
        }
    }
}

async fn run_ticker(
    weak: Weak<watch::Sender<ProgressState>>,
    messages: Vec<String>,
    period: Duration,
) {
    let mut next = 1usize;
    loop {
        tokio::time::sleep(period).await;

        let Some(tx) = weak.upgrade() else {
            break;
        };
        let message = &messages[next % messages.len()];
        if !ticker_write(&tx, message) {
            debug!("Reassurance ticker stopped: real progress took over");
            break;
        }
        next += 1;
    }
}

/// Write a ticker message unless real progress owns the slot.
/// Check and write happen under the same lock.
fn ticker_write(tx: &watch::Sender<ProgressState>, message: &str) -> bool {
    let mut written = false;
    tx.send_if_modified(|state| {
        if state.owner == ProgressOwner::Real {
            return false;
        }
        state.owner = ProgressOwner::Ticker;
        state.message = Some(message.to_string());
        written = true;
        true
    });
    written
}

/// Real-progress writer for a [`ProgressSlot`]
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<ProgressState>>,
}

impl ProgressSink for ProgressReporter {
    fn report(&self, message: &str) {
        self.tx.send_modify(|state| {
            state.owner = ProgressOwner::Real;
            state.message = Some(message.to_string());
        });
    }
}

/// Aborts the ticker task when dropped
#[derive(Debug)]
pub struct TickerGuard {
    handle: Option<JoinHandle<()>>,
}

impl TickerGuard {
    /// Whether the ticker is no longer running
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn messages() -> Vec<String> {
        vec!["first".to_string(), "second".to_string()]
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |m: &str| seen.lock().unwrap().push(m.to_string());
        sink.report("hello");
        drop(sink);
        assert_eq!(seen.into_inner().unwrap(), vec!["hello".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_rotates_messages() {
        let slot = ProgressSlot::new();
        let _guard = slot.start_ticker(messages(), Duration::from_secs(5));

        assert_eq!(slot.current().message.as_deref(), Some("first"));
        assert_eq!(slot.current().owner, ProgressOwner::Ticker);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(slot.current().message.as_deref(), Some("second"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(slot.current().message.as_deref(), Some("first"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_progress_wins_over_ticker() {
        let slot = ProgressSlot::new();
        let guard = slot.start_ticker(messages(), Duration::from_secs(5));

        slot.reporter().report("Starting");
        assert_eq!(slot.current().owner, ProgressOwner::Real);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(slot.current().message.as_deref(), Some("Starting"));
        assert!(guard.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_does_not_start_after_real_progress() {
        let slot = ProgressSlot::new();
        slot.reporter().report("Downloading");

        let guard = slot.start_ticker(messages(), Duration::from_secs(1));
        assert!(guard.is_finished());
        assert_eq!(slot.current().message.as_deref(), Some("Downloading"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_guard_stops_ticker() {
        let slot = ProgressSlot::new();
        let guard = slot.start_ticker(messages(), Duration::from_secs(5));
        drop(guard);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(slot.current().message.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_subscriber_sees_updates() {
        let slot = ProgressSlot::new();
        let mut rx = slot.subscribe();

        slot.reporter().report("Checking status");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().message.as_deref(), Some("Checking status"));
    }

    #[test]
    fn test_empty_ticker_is_noop() {
        let slot = ProgressSlot::new();
        let guard = slot.start_ticker(Vec::new(), Duration::from_secs(1));
        assert!(guard.is_finished());
        assert_eq!(slot.current(), ProgressState::default());
    }
}
