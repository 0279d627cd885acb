//! Constrained driver: the task runs through a [`ExecutorCommand`] with resource limits
//! and, on Linux, chrooted into its own task directory.
use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tno_core::{
    Driver, DriverContext, DriverError, DriverHandle, ExecContext, WaitCh,
    env::{ENV_ALLOC_DIR, ENV_TASK_DIR, task_environment},
};
use tno_model::{ClientConfig, Node, Task};
use tracing::{debug, info, instrument, warn};

use crate::{
    artifact::{ArtifactFetcher, DefaultFetcher},
    command::resolve_command,
    executor::{ExecutorCommand, ProcessExecutor},
    proc::Process,
    supervise::Supervision,
    util,
    utils::{CGROUP_ROOT_OPTION, DEFAULT_CGROUP_ROOT, parse_and_replace},
};

pub struct ExecDriver {
    ctx: DriverContext,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl ExecDriver {
    pub const NAME: &'static str = "exec";

    pub fn new(ctx: DriverContext) -> Self {
        Self {
            ctx,
            fetcher: Arc::new(DefaultFetcher),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn factory(ctx: DriverContext) -> Arc<dyn Driver> {
        Arc::new(Self::new(ctx))
    }

    fn task_name<'a>(&'a self, task: &'a Task) -> &'a str {
        match self.ctx.task_name() {
            "" => &task.name,
            name => name,
        }
    }

    fn cgroup_root(&self) -> PathBuf {
        PathBuf::from(
            self.ctx
                .config()
                .read_default(CGROUP_ROOT_OPTION, DEFAULT_CGROUP_ROOT),
        )
    }
}

#[async_trait]
impl Driver for ExecDriver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fingerprint(&self, _config: &ClientConfig, node: &mut Node) -> Result<bool, DriverError> {
        if !util::is_privileged() {
            debug!(target: "tno.exec.exec", "must run as root user, disabling");
            return Ok(false);
        }
        node.set_attribute(format!("driver.{}", Self::NAME), "1");
        Ok(true)
    }

    #[instrument(level = "debug", skip_all, fields(task = %task.name, alloc = %ctx.alloc_id))]
    async fn start(
        &self,
        ctx: &ExecContext,
        task: &Task,
    ) -> Result<Box<dyn DriverHandle>, DriverError> {
        let task_name = self.task_name(task);
        let task_dir = ctx
            .alloc_dir
            .task_dir(task_name)
            .ok_or_else(|| {
                DriverError::Config(format!(
                    "could not find task directory for task {task_name:?}"
                ))
            })?
            .to_path_buf();

        let command = resolve_command(task, &task_dir, self.fetcher.as_ref()).await?;

        let mut executor = ExecutorCommand::new(command, self.cgroup_root());
        executor.limit(task.resources.as_ref())?;
        executor.configure_task_dir(task_name, &ctx.alloc_dir)?;

        let mut env = task_environment(ctx, task);
        if executor.is_confined() {
            // Paths as seen from inside the chroot, unless the task chose its own.
            if !task.env.contains_key(ENV_TASK_DIR) {
                env.push(ENV_TASK_DIR, "/local");
            }
            if !task.env.contains_key(ENV_ALLOC_DIR) {
                env.push(ENV_ALLOC_DIR, "/alloc");
            }
        }
        let env_map = env.to_map();
        let args = match task.args() {
            Some(raw) => parse_and_replace(raw, &env_map)?,
            None => Vec::new(),
        };
        executor.args(args).envs(env_map);

        let (executor, process) = executor.start()?;
        info!(target: "tno.exec.exec", pid = executor.pid(), "task started");
        Ok(Box::new(ExecHandle::supervise(executor, process, &self.ctx)))
    }

    #[instrument(level = "debug", skip_all, fields(alloc = %ctx.alloc_id))]
    async fn open(
        &self,
        ctx: &ExecContext,
        handle_id: &str,
    ) -> Result<Box<dyn DriverHandle>, DriverError> {
        let (executor, process) = ProcessExecutor::open(handle_id)?;
        info!(target: "tno.exec.exec", pid = executor.pid(), "reattached");
        Ok(Box::new(ExecHandle::supervise(executor, process, &self.ctx)))
    }
}

/// Handle of a task run by [`ExecDriver`]. Its id is the executor session token.
pub struct ExecHandle {
    executor: ProcessExecutor,
    supervision: Supervision,
}

impl ExecHandle {
    fn supervise(executor: ProcessExecutor, process: Process, ctx: &DriverContext) -> Self {
        let cleanup = executor.clone();
        let supervision = Supervision::spawn(ctx.kill_timeout(), process.wait(), move || {
            if let Err(e) = cleanup.cleanup() {
                warn!(target: "tno.exec.exec", pid = cleanup.pid(), error = %e, "failed to clean up task confinement");
            }
        });
        Self {
            executor,
            supervision,
        }
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        self.executor.pid()
    }
}

#[async_trait]
impl DriverHandle for ExecHandle {
    fn id(&self) -> String {
        self.executor.id().to_string()
    }

    fn wait_ch(&self) -> WaitCh {
        self.supervision.wait_ch()
    }

    fn update(&self, _task: &Task) -> Result<(), DriverError> {
        Ok(())
    }

    async fn kill(&self) -> Result<(), DriverError> {
        self.supervision
            .kill_with(
                || self.executor.shutdown().map_err(DriverError::from),
                || self.executor.force_stop().map_err(DriverError::from),
            )
            .await
    }
}
