//! One-shot barrier

use tokio::sync::watch;

/// A barrier that opens once and stays open
///
/// Any number of tasks may wait, before or after it fires.
#[derive(Debug)]
pub struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    /// Create a closed latch
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Open the latch, returning whether this call was the one that did
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            let first = !*fired;
            *fired = true;
            first
        })
    }

    /// Whether the latch has fired
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the latch fires
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_once() {
        let latch = Latch::new();
        assert!(!latch.is_fired());
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.is_fired());
    }

    #[tokio::test]
    async fn wait_after_fire_returns() {
        let latch = Latch::new();
        latch.fire();
        tokio::time::timeout(Duration::from_secs(1), latch.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn releases_all_waiters() {
        let latch = Arc::new(Latch::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let latch = latch.clone();
                tokio::spawn(async move { latch.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        latch.fire();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
