use std::time::Duration;

use log::info;
use tokio::sync::watch;

/// Questions never stay open for less than this, however slow the poll send was.
pub const MIN_QUESTION_WINDOW: Duration = Duration::from_millis(100);

/// Owner side of a session's cancellation signal. Stopping a quiz and a
/// quiz running to completion both end at the same select in the session
/// loop, so a question timer can never fire twice.
#[derive(Debug)]
pub struct CancelHandle {
    cancel_tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct CancelListener {
    cancel_rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelListener) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (Self { cancel_tx }, CancelListener { cancel_rx })
    }

    pub fn cancel(&self) {
        if !self.cancel_tx.is_closed() {
            info!("Cancelling question timer...");
            // Only fails when every listener is gone, which means nothing is left to cancel
            let _ = self.cancel_tx.send(true);
        }
    }
}

impl CancelListener {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once cancelled, or once the handle has been dropped.
    pub async fn cancelled(&mut self) {
        let _ = self.cancel_rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleeps for `duration`. Returns `false` if cancelled first.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// How long a question stays open once its poll is out: the configured time
/// minus what sending the poll already used up.
pub fn question_window(timer: Duration, send_latency: Duration) -> Duration {
    timer.saturating_sub(send_latency).max(MIN_QUESTION_WINDOW)
}
