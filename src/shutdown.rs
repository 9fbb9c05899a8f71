//! Run-wide cancellation signal shared by every in-flight send.

use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone, Debug)]
pub struct ShutdownTx(watch::Sender<bool>);

#[derive(Clone, Debug)]
pub struct ShutdownRx(watch::Receiver<bool>);

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    pub fn shutdown(&self) {
        // send_replace never fails, even with no receivers left
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }

    /// Fire the signal once `after` has elapsed.
    pub fn shutdown_after(&self, after: Duration) -> tokio::task::JoinHandle<()> {
        let tx = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tx.shutdown();
        })
    }
}

impl ShutdownRx {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown was requested, or the sender is gone.
    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}
