use async_trait::async_trait;

use tno_model::{ClientConfig, Node, Task};

use crate::{DriverError, ExecContext, WaitCh};

/// An execution mechanism for tasks.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name used in node attributes and task specs (e.g. `"raw_exec"`).
    fn name(&self) -> &'static str;

    /// Probes whether the driver can run on this node.
    ///
    /// On success the driver records `driver.<name> = "1"` in `node`.
    /// An ineligible node is `Ok(false)`, not an error.
    fn fingerprint(&self, config: &ClientConfig, node: &mut Node) -> Result<bool, DriverError>;

    /// Launches `task` and returns a handle whose watcher is already running.
    async fn start(
        &self,
        ctx: &ExecContext,
        task: &Task,
    ) -> Result<Box<dyn DriverHandle>, DriverError>;

    /// Reattaches to a task from the id of a previous handle.
    async fn open(
        &self,
        ctx: &ExecContext,
        handle_id: &str,
    ) -> Result<Box<dyn DriverHandle>, DriverError>;
}

/// Supervision contract for one running task.
#[async_trait]
pub trait DriverHandle: Send + Sync {
    /// Opaque id, stable for the handle's lifetime and accepted by [`Driver::open`].
    fn id(&self) -> String;

    /// Completion signal. Every clone observes the same single outcome.
    fn wait_ch(&self) -> WaitCh;

    /// Live updates are not supported; the call is accepted and has no effect.
    fn update(&self, task: &Task) -> Result<(), DriverError>;

    /// Requests graceful termination and escalates to a forced kill after the grace period.
    async fn kill(&self) -> Result<(), DriverError>;
}
