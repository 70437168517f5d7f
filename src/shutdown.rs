use std::time::Duration;

use tokio::sync::watch;

/// Triggers cooperative shutdown of every loop holding a [`Shutdown`].
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

#[derive(Clone, Debug)]
pub struct Shutdown(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), Shutdown(rx))
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown was requested, or the trigger was dropped.
    pub async fn wait(&mut self) {
        // Cancel safe, used as a tokio::select! branch in every loop
        let _ = self.0.wait_for(|triggered| *triggered).await;
    }

    /// Sleeps for `duration` unless shutdown comes first. Returns true if the
    /// caller should stop.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.wait() => true,
            _ = tokio::time::sleep(duration) => self.is_triggered(),
        }
    }
}
