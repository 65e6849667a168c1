//! Stops long-running commands on Ctrl-C or SIGTERM.
//!
//! A [`SigDown`] listens for the signals in a background task and cancels its
//! [`CancellationToken`] on the first one. Commands that run until
//! interrupted, such as `prices --watch`, hand the token to their tasks.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cancels a token when the process is asked to stop.
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct SigDown {
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)] // Result needed on Unix for signal registration
    pub fn try_new() -> Result<Self, std::io::Error> {
        let cancellation_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            let token = cancellation_token.clone();
            task_tracker.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                    () = token.cancelled() => return,
                }
                #[cfg(feature = "telemetry")]
                tracing::info!("Received shutdown signal");
                token.cancel();
            });
        }

        #[cfg(not(unix))]
        {
            let token = cancellation_token.clone();
            task_tracker.spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => token.cancel(),
                    () = token.cancelled() => {},
                }
            });
        }

        task_tracker.close();
        Ok(Self {
            task_tracker,
            cancellation_token,
        })
    }

    /// Returns a clone of the token; all clones are cancelled together.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Cancels the token and stops listening.
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        self.task_tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_cancels_every_token_clone() {
        let sig_down = SigDown::try_new().unwrap();
        let token = sig_down.cancellation_token();
        assert!(!token.is_cancelled());
        sig_down.shutdown().await;
        assert!(token.is_cancelled());
    }
}
