//! Driver contracts for running tasks as OS processes.
//!
//! A [`Driver`] decides whether it can run on this node, starts tasks and reattaches
//! to tasks started by a previous client process. Each running task is represented by
//! a [`DriverHandle`] whose completion is observed through a [`WaitCh`].

pub mod alloc_dir;
pub use alloc_dir::AllocDir;
pub mod context;
pub use context::{DEFAULT_KILL_TIMEOUT, DriverContext, ExecContext};
pub mod driver;
pub use driver::{Driver, DriverHandle};
pub mod env;
pub mod error;
pub use error::{DriverError, ExitError};
pub mod router;
pub use router::{DriverFactory, DriverRouter};
pub mod wait;
pub use wait::{Completion, ExitResult, WaitCh, completion};
