//! Run-wide cancellation
//!
//! Every suspension point in the engine (throttle waits, pacing sleeps, the
//! measurement loop's warm-up and ticker) races its timer against a
//! [`Shutdown`] handle and returns early once the handle fires.

use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable cancellation handle backed by a `watch` channel
///
/// A handle made with [`Shutdown::child`] fires when it is triggered itself or
/// when any of its ancestors fires. Triggering a child leaves the parent alone.
#[derive(Clone, Debug)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    ancestors: Vec<watch::Receiver<bool>>,
}

impl Shutdown {
    /// Create a new, untriggered handle
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            ancestors: Vec::new(),
        }
    }

    /// Create a handle that also fires whenever `self` fires
    pub fn child(&self) -> Self {
        let (tx, rx) = watch::channel(false);
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.rx.clone());
        Self {
            tx: Arc::new(tx),
            rx,
            ancestors,
        }
    }

    /// Fire this handle and every child made from it
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Whether this handle or one of its ancestors has fired
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.ancestors.iter().any(|rx| *rx.borrow())
    }

    /// Resolves once this handle or one of its ancestors fires
    pub async fn cancelled(&self) {
        let waits = std::iter::once(&self.rx)
            .chain(self.ancestors.iter())
            .map(|rx| {
                let mut rx = rx.clone();
                Box::pin(async move {
                    // An ancestor whose handles are all gone can never fire.
                    if rx.wait_for(|fired| *fired).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
            });
        select_all(waits).await;
    }

    /// Sleep for `duration` unless cancelled first
    ///
    /// Returns `true` if the full duration elapsed. A duration past the
    /// range of [`Instant`] never elapses and only cancellation ends it.
    pub async fn sleep(&self, duration: Duration) -> bool {
        match Instant::now().checked_add(duration) {
            Some(deadline) => self.sleep_until(deadline).await,
            None => {
                self.cancelled().await;
                false
            }
        }
    }

    /// Sleep until `deadline` unless cancelled first
    ///
    /// Returns `true` if the deadline was reached.
    pub async fn sleep_until(&self, deadline: Instant) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = tokio::time::sleep_until(deadline) => true,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        let clone = shutdown.clone();
        clone.trigger();
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = Shutdown::new();
        let child = parent.child();
        let grandchild = child.child();

        parent.trigger();
        assert!(child.is_triggered());
        assert!(grandchild.is_triggered());
    }

    #[test]
    fn test_child_does_not_fire_parent() {
        let parent = Shutdown::new();
        let child = parent.child();

        child.trigger();
        assert!(child.is_triggered());
        assert!(!parent.is_triggered());
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_sleep_interrupted() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let start = std::time::Instant::now();
        let completed = shutdown.sleep(Duration::from_secs(60)).await;
        assert!(!completed);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sleep_returns_immediately_when_already_triggered() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(!shutdown.sleep(Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_unrepresentable_sleep_waits_for_cancel() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.trigger();
        });

        let completed = tokio::time::timeout(Duration::from_secs(5), shutdown.sleep(Duration::MAX))
            .await
            .expect("sleep did not observe cancellation");
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_child_wakes_on_parent() {
        let parent = Shutdown::new();
        let child = parent.child();
        let handle = tokio::spawn(async move { child.sleep(Duration::from_secs(60)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        parent.trigger();

        let completed = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("child sleep did not observe parent cancellation")
            .unwrap();
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_child_outlives_dropped_parent() {
        let parent = Shutdown::new();
        let child = parent.child();
        drop(parent);

        assert!(!child.is_triggered());
        assert!(child.sleep(Duration::from_millis(5)).await);
    }
}
