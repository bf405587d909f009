use tokio::sync::watch;

/// Sender half of the pipeline cancellation signal.
///
/// Multiple components can hold clones of the sender; the first successful
/// [`ShutdownTx::shutdown`] call notifies every subscriber. The channel
/// carries unit values because subscribers only care that shutdown was
/// requested, not about any payload.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver half of the pipeline cancellation signal.
///
/// Cancellation is checked between units of work (one page, one batch, one
/// stage); a unit that is already in flight runs to completion.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<()>);

impl ShutdownRx {
    /// Returns `true` once shutdown has been signalled.
    ///
    /// The change flag is intentionally never acknowledged, so a cancelled
    /// receiver stays cancelled for the rest of the run.
    pub fn is_shutdown(&self) -> bool {
        self.0.has_changed().unwrap_or(false)
    }

    /// Waits until shutdown is signalled.
    pub async fn signalled(&mut self) {
        // An error means the sender was dropped, which only happens when the
        // pipeline itself is gone; treat it the same as a signal.
        let _ = self.0.changed().await;
    }
}

/// Creates a connected shutdown channel pair.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), ShutdownRx(rx))
}
