//! Debounced "diagnostics changed" signal.
//!
//! A compile usually makes the backend push many files back to back. Each
//! push marks the notifier dirty; the tick then announces the whole burst
//! once the stream has been quiet for the debounce window.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::types::{ChangeReason, DiagnosticsChanged};

/// Capacity of the broadcast channel. Slow subscribers only ever need the
/// latest signal, so lagging is harmless.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

pub struct ChangeNotifier {
    tx: broadcast::Sender<DiagnosticsChanged>,
    debounce: Duration,
    /// Time of the most recent mutation, while a signal is pending.
    dirty_since: Option<Instant>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            tx,
            debounce,
            dirty_since: None,
        }
    }

    /// New subscription. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticsChanged> {
        self.tx.subscribe()
    }

    /// Sender handle so a facade can hand out subscriptions without the notifier.
    pub(crate) fn sender(&self) -> broadcast::Sender<DiagnosticsChanged> {
        self.tx.clone()
    }

    /// Record a mutation. Restarts the quiet window.
    pub fn mark_dirty(&mut self) {
        self.dirty_since = Some(Instant::now());
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty_since.is_some()
    }

    /// Fire the pending signal if the quiet window has passed.
    ///
    /// Returns whether a signal was sent.
    pub fn poll(&mut self) -> bool {
        match self.dirty_since {
            Some(marked) if marked.elapsed() >= self.debounce => {
                self.dirty_since = None;
                self.emit(ChangeReason::Updated);
                true
            }
            _ => false,
        }
    }

    /// Drop any pending signal without sending it.
    pub fn reset(&mut self) {
        self.dirty_since = None;
    }

    /// Send immediately, bypassing the debounce.
    pub fn notify_now(&self, reason: ChangeReason) {
        self.emit(reason);
    }

    fn emit(&self, reason: ChangeReason) {
        // No subscribers is not an error: nobody is looking yet.
        let receivers = self.tx.send(DiagnosticsChanged { reason }).unwrap_or(0);
        tracing::debug!(?reason, receivers, "Diagnostics changed");
    }
}
