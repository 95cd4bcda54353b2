//! Progress notifications and cooperative cancellation.
//!
//! The fitting core never assumes a UI thread. Callers observe long-running
//! operations through a [`FitListener`] and stop them with a
//! [`CancellationToken`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

use crate::optimizer::Convergence;

/// Shared flag checked at the start of every bootstrap iteration and inside
/// optimizer loops.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Observer for fit progress.
///
/// Implementations are called from worker threads and must return quickly.
pub trait FitListener: Send + Sync {
    /// A bootstrap iteration finished (`current` of `total`).
    fn on_iteration_progress(&self, _current: usize, _total: usize) {}

    /// A primary fit finished.
    fn on_fit_finished(&self, _convergence: &Convergence) {}
}

/// Listener that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl FitListener for NoopListener {}

/// Notification forwarded by [`ChannelListener`].
#[derive(Debug, Clone, PartialEq)]
pub enum FitEvent {
    /// See [`FitListener::on_iteration_progress`]
    IterationProgress { current: usize, total: usize },
    /// See [`FitListener::on_fit_finished`]
    FitFinished(Convergence),
}

/// Listener that forwards events over a bounded channel.
///
/// Events are dropped rather than waited on when the channel is full, so a
/// slow consumer never stalls the workers.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    sender: SyncSender<FitEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel.
    pub fn bounded(capacity: usize) -> (Self, Receiver<FitEvent>) {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        (Self { sender }, receiver)
    }

    fn send(&self, event: FitEvent) {
        match self.sender.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!("progress channel full, dropping event");
            }
        }
    }
}

impl FitListener for ChannelListener {
    fn on_iteration_progress(&self, current: usize, total: usize) {
        self.send(FitEvent::IterationProgress { current, total });
    }

    fn on_fit_finished(&self, convergence: &Convergence) {
        self.send(FitEvent::FitFinished(convergence.clone()));
    }
}
