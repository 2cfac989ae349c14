//! A single root cancellation token, derived from the CLI invocation and
//! observed by every suspension point (spec §5).

use tokio::sync::watch;

#[derive(Clone)]
pub struct CancelToken(watch::Receiver<bool>);

pub struct CancelHandle(watch::Sender<bool>);

pub fn channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the handle calls `cancel()`. Safe to await from
    /// multiple clones concurrently.
    pub async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|v| *v).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (handle, mut token) = channel();
        assert!(!token.is_cancelled());
        let waiter = tokio::spawn(async move {
            token.cancelled().await;
        });
        handle.cancel();
        waiter.await.unwrap();
    }
}
