//! Process drivers: `raw_exec` runs tasks unconstrained, `exec` runs them through a
//! constrained executor with resource limits and a confined task directory.
//!
//! [`builtin_drivers`] returns a router with both registered.
use tno_core::DriverRouter;

mod error;
pub use error::ExecError;

pub mod artifact;
pub use artifact::{ArtifactFetcher, DefaultFetcher};
pub mod command;
pub use command::{ResolvedCommand, resolve_command};
pub mod exec;
pub use exec::{ExecDriver, ExecHandle};
pub mod executor;
pub mod proc;
pub mod raw_exec;
pub use raw_exec::{PID_PREFIX, RAW_EXEC_CONFIG_OPTION, RawExecDriver, RawExecHandle};
pub mod supervise;
pub mod util;
pub mod utils;

/// Router with every driver of this crate registered under its name.
pub fn builtin_drivers() -> DriverRouter {
    let mut router = DriverRouter::new();
    router.register(RawExecDriver::NAME, RawExecDriver::factory);
    router.register(ExecDriver::NAME, ExecDriver::factory);
    router
}

pub mod prelude {
    pub use crate::builtin_drivers;
    pub use crate::error::ExecError;
    pub use crate::{ExecDriver, RAW_EXEC_CONFIG_OPTION, RawExecDriver};
    pub use tno_core::{Driver, DriverContext, DriverError, DriverHandle, ExecContext, WaitCh};
}
