use thiserror::Error;

use tno_model::ConfigError;

/// Errors returned synchronously by drivers and handles.
///
/// Nothing here is retried internally; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("artifact fetch failed: {0}")]
    Fetch(String),
    #[error("failed to constrain resources: {0}")]
    ResourceConstraint(String),
    #[error("failed to start command: {0}")]
    Launch(String),
    #[error("failed to open handle: {0}")]
    Lookup(String),
    #[error("executor session not found: {0}")]
    NotFound(String),
    #[error("kill failed: {0}")]
    Kill(String),
    #[error("unknown driver: {0}")]
    UnknownDriver(String),
}

impl From<ConfigError> for DriverError {
    fn from(e: ConfigError) -> Self {
        DriverError::Config(e.to_string())
    }
}

/// Outcome published once through a handle's [`WaitCh`](crate::WaitCh) when the task did
/// not exit cleanly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExitError {
    /// Waiting on the process failed at the OS level.
    #[error("wait failed: {0}")]
    Wait(String),
    /// The process exited with a non-zero status or was killed by a signal.
    #[error("task exited with error (code: {code:?}, signal: {signal:?})")]
    ExitFailure {
        code: Option<i32>,
        signal: Option<i32>,
    },
}
