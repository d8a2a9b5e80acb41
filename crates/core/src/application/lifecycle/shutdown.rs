// Stop signal for background tasks (janitor, usage ledger)

use tokio::sync::watch;

/// Receiving side, one clone per background task
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested or the sender is gone
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owning side, held by the service
#[derive(Debug)]
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal every token, current and future
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Hand out another token
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_late_token_sees_shutdown() {
        let (tx, token) = shutdown_channel();
        assert!(!token.is_shutdown());

        tx.shutdown();
        let mut late = tx.token();
        assert!(late.is_shutdown());
        // Must not hang
        late.wait().await;
    }

    #[tokio::test]
    async fn test_wait_returns_when_sender_dropped() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);
        token.wait().await;
    }
}
