//! Unconstrained driver: plain fork/exec with output redirected to log files.
//!
//! It offers no isolation at all, so it only fingerprints when the operator opts in
//! through [`RAW_EXEC_CONFIG_OPTION`].
use std::{
    fs::{File, OpenOptions},
    path::Path,
    process::Stdio,
    sync::Arc,
};

use async_trait::async_trait;
use tno_core::{
    Driver, DriverContext, DriverError, DriverHandle, ExecContext, WaitCh, alloc_dir::TASK_LOCAL,
    env::task_environment,
};
use tno_model::{ClientConfig, Node, Task};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::{
    artifact::{ArtifactFetcher, DefaultFetcher},
    command::resolve_command,
    proc::Process,
    supervise::Supervision,
    util,
    utils::parse_and_replace,
};

/// Client option that enables the driver.
pub const RAW_EXEC_CONFIG_OPTION: &str = "driver.raw_exec.enable";
/// Prefix of raw handle ids.
pub const PID_PREFIX: &str = "PID:";

pub struct RawExecDriver {
    ctx: DriverContext,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl RawExecDriver {
    pub const NAME: &'static str = "raw_exec";

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

    /// [`tno_core::DriverFactory`] for the router.
    pub fn factory(ctx: DriverContext) -> Arc<dyn Driver> {
        Arc::new(Self::new(ctx))
    }

    /// Name of the task this driver was built for, falling back to the task's own.
    fn task_name<'a>(&'a self, task: &'a Task) -> &'a str {
        match self.ctx.task_name() {
            "" => &task.name,
            name => name,
        }
    }
}

#[async_trait]
impl Driver for RawExecDriver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fingerprint(&self, config: &ClientConfig, node: &mut Node) -> Result<bool, DriverError> {
        if !config.read_bool_default(RAW_EXEC_CONFIG_OPTION, false)? {
            debug!(target: "tno.exec.raw", "raw exec is disabled");
            return Ok(false);
        }
        warn!(target: "tno.exec.raw", "raw exec is enabled. Only enable if needed");
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

        let env = task_environment(ctx, task);
        let env_map = env.to_map();
        let args = match task.args() {
            Some(raw) => parse_and_replace(raw, &env_map)?,
            None => Vec::new(),
        };

        let local = task_dir.join(TASK_LOCAL);
        let stdout = open_log(&local.join(format!("{task_name}.stdout")))?;
        let stderr = open_log(&local.join(format!("{task_name}.stderr")))?;
        let stdin = File::open(util::NULL_DEVICE).map_err(|e| {
            DriverError::Launch(format!("failed to open {}: {e}", util::NULL_DEVICE))
        })?;

        let program = command.host_path(&task_dir);
        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .current_dir(&task_dir)
            .env_clear()
            .envs(&env_map)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        if !env_map.contains_key("PATH") {
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
        }

        let child = cmd.spawn().map_err(|e| {
            DriverError::Launch(format!(
                "failed to start command {}: {e}",
                program.display()
            ))
        })?;
        let process = Process::spawned(child).ok_or_else(|| {
            DriverError::Launch("process exited before its pid was known".into())
        })?;

        info!(target: "tno.exec.raw", pid = process.pid(), program = %program.display(), "task started");
        Ok(Box::new(RawExecHandle::supervise(process, &self.ctx)))
    }

    #[instrument(level = "debug", skip_all, fields(handle_id = %handle_id, alloc = %ctx.alloc_id))]
    async fn open(
        &self,
        ctx: &ExecContext,
        handle_id: &str,
    ) -> Result<Box<dyn DriverHandle>, DriverError> {
        let pid = parse_handle_id(handle_id)?;

        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                if !util::process_alive(pid) {
                    return Err(DriverError::Lookup(format!("failed to find PID {pid}")));
                }
                info!(target: "tno.exec.raw", pid, "reattached");
                Ok(Box::new(RawExecHandle::supervise(Process::detached(pid), &self.ctx)))
            } else {
                Err(DriverError::Lookup(format!(
                    "reattaching to PID {pid} is unsupported on this platform"
                )))
            }
        }
    }
}

/// Parses `PID:<n>` (the prefix is optional) into a positive pid.
pub fn parse_handle_id(handle_id: &str) -> Result<u32, DriverError> {
    let raw = handle_id.strip_prefix(PID_PREFIX).unwrap_or(handle_id);
    let pid: i64 = raw.trim().parse().map_err(|e| {
        DriverError::Lookup(format!("failed to parse handle {handle_id:?}: {e}"))
    })?;
    if pid <= 0 || pid > i64::from(i32::MAX) {
        return Err(DriverError::Lookup(format!(
            "handle {handle_id:?} does not name a valid pid"
        )));
    }
    Ok(pid as u32)
}

fn open_log(path: &Path) -> Result<File, DriverError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| DriverError::Launch(format!("failed to open {}: {e}", path.display())))
}

/// Handle of a process run by [`RawExecDriver`].
pub struct RawExecHandle {
    pid: u32,
    supervision: Supervision,
}

impl RawExecHandle {
    fn supervise(process: Process, ctx: &DriverContext) -> Self {
        let pid = process.pid();
        let supervision = Supervision::spawn(ctx.kill_timeout(), process.wait(), || {});
        Self { pid, supervision }
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

#[async_trait]
impl DriverHandle for RawExecHandle {
    fn id(&self) -> String {
        format!("{PID_PREFIX}{}", self.pid)
    }

    fn wait_ch(&self) -> WaitCh {
        self.supervision.wait_ch()
    }

    fn update(&self, _task: &Task) -> Result<(), DriverError> {
        Ok(())
    }

    async fn kill(&self) -> Result<(), DriverError> {
        let pid = self.pid;
        let force = move || {
            util::terminate(pid)
                .map_err(|e| DriverError::Kill(format!("failed to kill pid {pid}: {e}")))
        };

        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                self.supervision
                    .kill_with(
                        || {
                            util::interrupt(pid).map_err(|e| {
                                DriverError::Kill(format!("failed to interrupt pid {pid}: {e}"))
                            })
                        },
                        force,
                    )
                    .await
            } else {
                if self.supervision.is_done() {
                    return Ok(());
                }
                force()
            }
        }
    }
}
