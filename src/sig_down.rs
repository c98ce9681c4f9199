//! SIGINT/SIGTERM handling for graceful shutdown.
//!
//! [`SigDown`] installs the signal handlers up front, so a failure to register them is
//! reported at startup, and cancels a [`CancellationToken`] on the first signal. The
//! server stops accepting connections and drains in-flight requests once it fires.

use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct SigDown {
    token: CancellationToken,
}

impl SigDown {
    pub fn try_new() -> std::io::Result<Self> {
        #[cfg(unix)]
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            let terminate = terminate.recv();
            #[cfg(not(unix))]
            let terminate = std::future::pending::<Option<()>>();

            tokio::select! {
                _ = signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
                _ = terminate => tracing::info!("received SIGTERM, shutting down"),
                _ = cancel.cancelled() => return,
            }
            cancel.cancel();
        });
        Ok(Self { token })
    }

    /// Token cancelled when the process is asked to stop.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown without a signal.
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}
