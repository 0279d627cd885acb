//! One-shot completion signal shared between a handle's watcher and its consumers.
//!
//! The watcher owns the single [`Completion`]; publishing consumes it, so a second
//! outcome cannot be produced. Consumers hold any number of [`WaitCh`] clones and all of
//! them observe the same value, before or after it was published.
use tokio::sync::watch;

use crate::ExitError;

/// Final outcome of a supervised task.
pub type ExitResult = Result<(), ExitError>;

/// Creates a linked publisher/receiver pair.
pub fn completion() -> (Completion, WaitCh) {
    let (tx, rx) = watch::channel(None);
    (Completion { tx }, WaitCh { rx })
}

/// Publishing side, owned by the watcher.
#[derive(Debug)]
pub struct Completion {
    tx: watch::Sender<Option<ExitResult>>,
}

impl Completion {
    /// Publishes the outcome. Never blocks, whether or not anyone is listening.
    pub fn publish(self, result: ExitResult) {
        self.tx.send_replace(Some(result));
    }
}

/// Receiving side of the completion signal.
#[derive(Debug, Clone)]
pub struct WaitCh {
    rx: watch::Receiver<Option<ExitResult>>,
}

impl WaitCh {
    /// Waits for the outcome.
    ///
    /// Resolves immediately if it was already published. If the watcher goes away
    /// without publishing, a [`ExitError::Wait`] is returned.
    pub async fn wait(&mut self) -> ExitResult {
        loop {
            if let Some(res) = self.rx.borrow_and_update().clone() {
                return res;
            }
            if self.rx.changed().await.is_err() {
                return self.try_result().unwrap_or_else(|| {
                    Err(ExitError::Wait("watcher exited without a result".into()))
                });
            }
        }
    }

    /// Returns the outcome if it has been published.
    pub fn try_result(&self) -> Option<ExitResult> {
        self.rx.borrow().clone()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_publish() {
        let (tx, mut rx) = completion();
        assert!(rx.try_result().is_none());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.publish(Ok(()));
        });

        assert_eq!(rx.wait().await, Ok(()));
        assert!(rx.is_done());
    }

    #[tokio::test]
    async fn repeated_reads_return_same_outcome() {
        let (tx, mut rx) = completion();
        let mut other = rx.clone();
        let failure = ExitError::ExitFailure {
            code: Some(3),
            signal: None,
        };
        tx.publish(Err(failure.clone()));

        assert_eq!(rx.wait().await, Err(failure.clone()));
        assert_eq!(rx.wait().await, Err(failure.clone()));
        assert_eq!(other.wait().await, Err(failure.clone()));
        assert_eq!(rx.try_result(), Some(Err(failure)));
    }

    #[tokio::test]
    async fn clone_taken_after_publish_sees_result() {
        let (tx, rx) = completion();
        tx.publish(Ok(()));

        let mut late = rx.clone();
        assert_eq!(late.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn dropped_publisher_is_a_wait_error() {
        let (tx, mut rx) = completion();
        drop(tx);

        let res = rx.wait().await;
        assert!(matches!(res, Err(ExitError::Wait(_))));
    }
}
