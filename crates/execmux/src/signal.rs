//! Single-fire completion notifications
//!
//! A [`Completion`] is held by the task doing the work and a
//! [`CompletionSignal`] by whoever waits for it. Firing is idempotent, and a
//! `Completion` that is dropped without being fired fires on drop, so a
//! pump that returns early or panics still completes.

use tokio::sync::watch;

/// Firing side of a completion notification
#[derive(Debug)]
pub struct Completion {
    tx: watch::Sender<bool>,
}

/// Waiting side of a completion notification
///
/// Clone it to give several tasks the same signal.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked completion and signal
pub fn completion() -> (Completion, CompletionSignal) {
    let (tx, rx) = watch::channel(false);
    (Completion { tx }, CompletionSignal { rx })
}

impl Completion {
    /// Fire the completion; later calls do nothing
    pub fn fire(&self) {
        self.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        });
    }

    /// Check if the completion has fired
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get another signal for this completion
    pub fn signal(&self) -> CompletionSignal {
        CompletionSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.fire();
    }
}

impl CompletionSignal {
    /// A signal that has already fired
    pub fn done() -> Self {
        let (completion, signal) = completion();
        completion.fire();
        signal
    }

    /// Check if the completion has fired
    pub fn is_done(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the completion fires
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // The sender fires before it is dropped, so a closed channel is done too
        let _ = rx.wait_for(|done| *done).await;
    }
}
