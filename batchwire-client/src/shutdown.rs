//! Cancellation signal.
//!
//! Process-level termination requests are delivered to the runner through a
//! [`Shutdown`] handle instead of global state, so tests can raise a synthetic
//! cancellation at any point.

use tokio::sync::watch;

/// Raises the cancellation signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observes the cancellation signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Creates a connected trigger/handle pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Raises the signal. Later calls are no-ops.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns a new handle observing this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    /// A handle that is never cancelled.
    pub fn never() -> Self {
        let (_trigger, shutdown) = channel();
        shutdown
    }

    /// Non-blocking check.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal is raised.
    ///
    /// If the trigger is dropped without firing this never resolves.
    pub async fn cancelled(&mut self) {
        let closed = self.rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}
