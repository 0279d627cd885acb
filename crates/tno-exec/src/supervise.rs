//! Watcher task and kill protocol shared by both drivers.
//!
//! The watcher waits once, fires the `done` token, runs cleanup and then publishes the
//! outcome. `kill` only ever waits on `done`, so it is released before cleanup runs and
//! never depends on anyone reading the completion signal.
use std::{future::Future, time::Duration};

use tno_core::{DriverError, ExitResult, WaitCh, completion};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Supervision {
    done: CancellationToken,
    wait_ch: WaitCh,
    kill_timeout: Duration,
}

impl Supervision {
    /// Spawns the watcher for `wait`. `cleanup` runs after `done` fires and before the
    /// outcome is published.
    pub fn spawn<W, C>(kill_timeout: Duration, wait: W, cleanup: C) -> Self
    where
        W: Future<Output = ExitResult> + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let (publisher, wait_ch) = completion();
        let done = CancellationToken::new();

        let token = done.clone();
        tokio::spawn(async move {
            let result = wait.await;
            token.cancel();
            cleanup();
            debug!(target: "tno.exec.supervise", ?result, "task finished");
            publisher.publish(result);
        });

        Self {
            done,
            wait_ch,
            kill_timeout,
        }
    }

    #[inline]
    pub fn wait_ch(&self) -> WaitCh {
        self.wait_ch.clone()
    }

    /// Whether the watched process has exited.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Runs the kill protocol.
    ///
    /// Does nothing once the process has exited. Otherwise `graceful` is attempted (its
    /// failure is logged), and `force` runs if the process is still alive when the grace
    /// period ends. The result of `force` is returned.
    pub async fn kill_with<G, F>(&self, graceful: G, force: F) -> Result<(), DriverError>
    where
        G: FnOnce() -> Result<(), DriverError>,
        F: FnOnce() -> Result<(), DriverError>,
    {
        if self.is_done() {
            return Ok(());
        }

        if let Err(e) = graceful() {
            warn!(target: "tno.exec.supervise", error = %e, "graceful termination request failed");
        }

        tokio::select! {
            biased;
            _ = self.done.cancelled() => Ok(()),
            _ = tokio::time::sleep(self.kill_timeout) => {
                if self.is_done() {
                    return Ok(());
                }
                debug!(target: "tno.exec.supervise", timeout = ?self.kill_timeout, "grace period expired; forcing");
                match force() {
                    // The process may exit between the timer firing and the signal.
                    Err(_) if self.is_done() => Ok(()),
                    other => other,
                }
            }
        }
    }
}
