//! OS processes observed by a handle's watcher.
use std::{process::ExitStatus, time::Duration};

use tno_core::{ExitError, ExitResult};
use tokio::process::Child;
use tracing::{debug, trace};

use crate::util;

/// Liveness poll period for processes that are not our children.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
enum Source {
    /// Spawned by this client; the exit status is observable.
    Child(Child),
    /// Reattached by pid; only liveness is observable.
    Detached,
}

/// A process whose exit a watcher waits for.
#[derive(Debug)]
pub struct Process {
    pid: u32,
    source: Source,
}

impl Process {
    /// Wraps a freshly spawned child.
    ///
    /// Returns `None` if the child has already been reaped and has no pid.
    pub fn spawned(child: Child) -> Option<Self> {
        let pid = child.id()?;
        Some(Self {
            pid,
            source: Source::Child(child),
        })
    }

    /// Refers to a process started by an earlier client instance.
    pub fn detached(pid: u32) -> Self {
        Self {
            pid,
            source: Source::Detached,
        }
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Waits for the process to exit.
    ///
    /// A detached process cannot be reaped, so its exit is reported as `Ok(())`.
    pub async fn wait(self) -> ExitResult {
        match self.source {
            Source::Child(mut child) => match child.wait().await {
                Ok(status) => exit_result(status),
                Err(e) => Err(ExitError::Wait(format!("wait for pid {}: {e}", self.pid))),
            },
            Source::Detached => {
                while util::process_alive(self.pid) {
                    trace!(target: "tno.exec.proc", pid = self.pid, "still alive");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                debug!(target: "tno.exec.proc", pid = self.pid, "detached process gone");
                Ok(())
            }
        }
    }
}

/// Maps an exit status to the published outcome.
pub fn exit_result(status: ExitStatus) -> ExitResult {
    if status.success() {
        return Ok(());
    }

    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::process::ExitStatusExt;
            let signal = status.signal();
        } else {
            let signal = None;
        }
    }
    Err(ExitError::ExitFailure {
        code: status.code(),
        signal,
    })
}
