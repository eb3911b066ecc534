//! Two-stage shutdown signal.
//!
//! The first interrupt asks the running transfer to stop reading, close the
//! relay and let the sink commit what is already queued. A second interrupt
//! stops immediately; whatever is still in the relay is reported as lost.

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cooperative stop signal shared by the pipeline and the signal handlers.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    interrupt: CancellationToken,
    terminate: CancellationToken,
}

impl Shutdown {
    /// Creates a signal that has not fired yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one interrupt: the first one starts draining, the next one
    /// forces termination.
    pub fn trigger(&self) {
        if self.interrupt.is_cancelled() {
            self.terminate.cancel();
        } else {
            self.interrupt.cancel();
        }
    }

    /// Whether at least one interrupt has been received.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Whether a second interrupt has been received.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminate.is_cancelled()
    }

    /// Completes once the first interrupt has been received.
    pub async fn interrupted(&self) {
        self.interrupt.cancelled().await;
    }

    /// Completes once the second interrupt has been received.
    pub async fn terminated(&self) {
        self.terminate.cancelled().await;
    }

    /// Spawns handlers turning SIGINT (Ctrl-C) and SIGTERM into triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handlers cannot be installed.
    #[cfg(unix)]
    pub fn listen_for_signals(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let shutdown = self.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    received = sigint.recv() => received,
                    received = sigterm.recv() => received,
                };
                if received.is_none() {
                    break;
                }
                shutdown.notify();
            }
        });

        Ok(())
    }

    /// Spawns a handler turning Ctrl-C into triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler cannot be installed.
    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) -> std::io::Result<()> {
        let shutdown = self.clone();

        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                shutdown.notify();
            }
        });

        Ok(())
    }

    fn notify(&self) {
        if self.is_interrupted() {
            warn!("Second interrupt received, stopping now");
        } else {
            warn!("Interrupt received, draining queued items before exiting (interrupt again to force)");
        }
        self.trigger();
    }
}
