use thiserror::Error;

use tno_core::DriverError;

/// Errors of the constrained executor.
///
/// Converted into [`DriverError`] at the driver boundary.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("resource limit: {0}")]
    Limit(String),
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),
    #[error("failed to configure task directory: {0}")]
    Confine(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("invalid executor session: {0}")]
    Decode(String),
    #[error("no process for executor session (pid {0})")]
    SessionNotFound(u32),
    #[error("signal failed: {0}")]
    Signal(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for DriverError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Limit(_) | ExecError::Unsupported(_) => {
                DriverError::ResourceConstraint(e.to_string())
            }
            ExecError::Confine(_) | ExecError::Spawn(_) | ExecError::Io(_) => {
                DriverError::Launch(e.to_string())
            }
            ExecError::Decode(_) => DriverError::Lookup(e.to_string()),
            ExecError::SessionNotFound(_) => DriverError::NotFound(e.to_string()),
            ExecError::Signal(_) => DriverError::Kill(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_driver_error_kinds() {
        assert!(matches!(
            DriverError::from(ExecError::Unsupported("cgroups".into())),
            DriverError::ResourceConstraint(_)
        ));
        assert!(matches!(
            DriverError::from(ExecError::Decode("eof".into())),
            DriverError::Lookup(_)
        ));
        assert!(matches!(
            DriverError::from(ExecError::SessionNotFound(42)),
            DriverError::NotFound(_)
        ));
        assert!(matches!(
            DriverError::from(ExecError::Spawn("ENOENT".into())),
            DriverError::Launch(_)
        ));
    }
}
