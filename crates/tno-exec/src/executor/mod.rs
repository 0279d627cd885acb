//! Constrained process executor.
//!
//! An [`ExecutorCommand`] collects limits and filesystem confinement before the process
//! exists; [`ExecutorCommand::start`] turns it into a running [`ProcessExecutor`]. Every
//! resource the executor creates (cgroup, bind mounts) is recorded in a [`Confinement`]
//! and in the session token, so it can be released after the process exits, even by a
//! later client that reattached through [`ProcessExecutor::open`].
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex},
};

use tno_core::AllocDir;
use tno_model::Resources;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{
    command::ResolvedCommand,
    error::ExecError,
    proc::Process,
    util,
    utils::{Cgroup, RlimitConfig, attach_rlimits},
};

mod session;
pub use session::Session;

/// `PATH` given to constrained tasks that do not set their own.
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Host directories bind-mounted read-only into a confined task directory.
#[cfg(target_os = "linux")]
const CHROOT_DIRS: &[&str] = &["/bin", "/etc", "/lib", "/lib32", "/lib64", "/sbin", "/usr"];

/// Resources created for one task that must be released once it is gone.
#[derive(Debug, Default)]
pub struct Confinement {
    cgroup: Option<Cgroup>,
    mounts: Vec<PathBuf>,
}

impl Confinement {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cgroup.is_none() && self.mounts.is_empty()
    }

    #[inline]
    pub fn cgroup(&self) -> Option<&Cgroup> {
        self.cgroup.as_ref()
    }

    #[inline]
    pub fn mounts(&self) -> &[PathBuf] {
        &self.mounts
    }

    /// Unmounts in reverse order and removes the cgroup.
    ///
    /// Whatever fails stays recorded so a later call can retry it; the first error is
    /// returned.
    pub fn release(&mut self) -> Result<(), ExecError> {
        let mut first_err = None;

        let mut kept = Vec::new();
        for mount in self.mounts.drain(..).rev() {
            if let Err(e) = unmount(&mount) {
                warn!(target: "tno.exec.executor", mount = %mount.display(), error = %e, "unmount failed");
                first_err.get_or_insert(e);
                kept.push(mount);
            }
        }
        kept.reverse();
        self.mounts = kept;

        if let Some(cgroup) = &self.cgroup {
            match cgroup.remove() {
                Ok(()) => self.cgroup = None,
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn unmount(path: &Path) -> Result<(), ExecError> {
            crate::utils::mount::unmount(path)
        }
    } else {
        fn unmount(_path: &Path) -> Result<(), ExecError> {
            Ok(())
        }
    }
}

/// A constrained process that has not been started yet.
///
/// Dropping it before [`start`](Self::start) releases everything it created.
#[derive(Debug)]
pub struct ExecutorCommand {
    command: ResolvedCommand,
    args: Vec<String>,
    env: HashMap<String, String>,
    cgroup_root: PathBuf,
    rlimits: RlimitConfig,
    task_dir: Option<PathBuf>,
    chroot: bool,
    confinement: Confinement,
}

impl ExecutorCommand {
    pub fn new(command: ResolvedCommand, cgroup_root: impl Into<PathBuf>) -> Self {
        Self {
            command,
            args: Vec::new(),
            env: HashMap::new(),
            cgroup_root: cgroup_root.into(),
            rlimits: RlimitConfig::default(),
            task_dir: None,
            chroot: false,
            confinement: Confinement::default(),
        }
    }

    pub fn args(&mut self, args: Vec<String>) -> &mut Self {
        self.args = args;
        self
    }

    /// Replaces the environment. Nothing from the client's own environment is inherited.
    pub fn envs(&mut self, env: HashMap<String, String>) -> &mut Self {
        self.env = env;
        self
    }

    /// Whether the process will run with the task directory as its root.
    #[inline]
    pub fn is_confined(&self) -> bool {
        self.chroot
    }

    #[inline]
    pub fn confinement(&self) -> &Confinement {
        &self.confinement
    }

    /// Applies `resources`.
    ///
    /// Core dumps are always disabled and the disk budget caps file size. Cpu and memory
    /// limits need a cgroup v2 hierarchy and fail where there is none.
    pub fn limit(&mut self, resources: Option<&Resources>) -> Result<(), ExecError> {
        self.rlimits = RlimitConfig::for_resources(resources);

        let Some(res) = resources.filter(|r| !r.is_unbounded()) else {
            return Ok(());
        };

        cfg_if::cfg_if! {
            if #[cfg(target_os = "linux")] {
                let cgroup = Cgroup::create(&self.cgroup_root)?;
                self.confinement.cgroup = Some(cgroup.clone());
                cgroup.apply(res)?;
                debug!(target: "tno.exec.executor", cgroup = %cgroup.path().display(), cpu = res.cpu, memory_mb = res.memory_mb, "limits applied");
                Ok(())
            } else {
                Err(ExecError::Unsupported(format!(
                    "cpu ({}), memory ({} MB) and io ({}) limits require cgroups",
                    res.cpu, res.memory_mb, res.iops
                )))
            }
        }
    }

    /// Prepares the task directory of `task_name` as the process root.
    ///
    /// On Linux the host system directories, `/dev` and the shared allocation directory
    /// are bind-mounted into it and the process is chrooted there at exec time. Elsewhere
    /// the directory is only used as the working directory.
    pub fn configure_task_dir(
        &mut self,
        task_name: &str,
        alloc_dir: &AllocDir,
    ) -> Result<(), ExecError> {
        let task_dir = alloc_dir
            .task_dir(task_name)
            .ok_or_else(|| {
                ExecError::Confine(format!("could not find task directory for task {task_name:?}"))
            })?
            .to_path_buf();

        cfg_if::cfg_if! {
            if #[cfg(target_os = "linux")] {
                use crate::utils::mount::bind_mount;

                for dir in CHROOT_DIRS {
                    let source = Path::new(dir);
                    if !source.exists() {
                        continue;
                    }
                    let target = task_dir.join(dir.trim_start_matches('/'));
                    bind_mount(source, &target, true)?;
                    self.confinement.mounts.push(target);
                }

                let dev = task_dir.join("dev");
                bind_mount(Path::new("/dev"), &dev, true)?;
                self.confinement.mounts.push(dev);

                let shared = task_dir.join(tno_core::alloc_dir::SHARED_ALLOC_NAME);
                bind_mount(alloc_dir.shared_dir(), &shared, false)?;
                self.confinement.mounts.push(shared);

                self.chroot = true;
                debug!(target: "tno.exec.executor", task = task_name, dir = %task_dir.display(), mounts = self.confinement.mounts.len(), "task dir configured");
            } else {
                warn!(target: "tno.exec.executor", task = task_name, "filesystem confinement unavailable; running in the task directory");
            }
        }

        self.task_dir = Some(task_dir);
        Ok(())
    }

    /// Starts the process and returns its executor together with the process to wait on.
    pub fn start(mut self) -> Result<(ProcessExecutor, Process), ExecError> {
        let program = match (&self.command, &self.task_dir) {
            (ResolvedCommand::Artifact(_), None) => {
                return Err(ExecError::Spawn(
                    "artifact command without a configured task directory".into(),
                ));
            }
            (cmd, _) if self.chroot => cmd.confined_path(),
            (cmd, Some(dir)) => cmd.host_path(dir),
            (cmd, None) => cmd.confined_path(),
        };

        let mut cmd = Command::new(&program);
        cmd.args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if !self.env.contains_key("PATH") {
            cmd.env("PATH", DEFAULT_PATH);
        }

        #[cfg(unix)]
        if let Some(cgroup) = &self.confinement.cgroup {
            cgroup.attach_on_exec(&mut cmd)?;
        }
        attach_rlimits(&mut cmd, &self.rlimits);

        match &self.task_dir {
            #[cfg(target_os = "linux")]
            Some(dir) if self.chroot => chroot_on_exec(&mut cmd, dir)?,
            Some(dir) => {
                cmd.current_dir(dir);
            }
            None => {}
        }

        let child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", program.display())))?;
        let process = Process::spawned(child)
            .ok_or_else(|| ExecError::Spawn("process exited before its pid was known".into()))?;

        let confinement = std::mem::take(&mut self.confinement);
        let session = Session {
            pid: process.pid(),
            task_dir: self
                .task_dir
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned()),
            cgroup: confinement
                .cgroup
                .as_ref()
                .map(|c| c.path().to_string_lossy().into_owned()),
            mounts: confinement
                .mounts
                .iter()
                .map(|m| m.to_string_lossy().into_owned())
                .collect(),
        };

        info!(target: "tno.exec.executor", pid = process.pid(), program = %program.display(), confined = self.chroot, "process started");
        let executor = ProcessExecutor::new(session, confinement)?;
        Ok((executor, process))
    }
}

impl Drop for ExecutorCommand {
    fn drop(&mut self) {
        if self.confinement.is_empty() {
            return;
        }
        if let Err(e) = self.confinement.release() {
            warn!(target: "tno.exec.executor", error = %e, "failed to release confinement of an unstarted command");
        }
    }
}

#[cfg(target_os = "linux")]
fn chroot_on_exec(cmd: &mut Command, root: &Path) -> Result<(), ExecError> {
    use std::{ffi::CString, io, os::unix::ffi::OsStrExt};

    let root = CString::new(root.as_os_str().as_bytes())
        .map_err(|e| ExecError::Confine(format!("invalid task directory: {e}")))?;

    unsafe {
        cmd.pre_exec(move || {
            if libc::chroot(root.as_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            if libc::chdir(c"/".as_ptr()) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    Ok(())
}

/// A running (or reattached) constrained process.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    id: String,
    session: Arc<Session>,
    confinement: Arc<Mutex<Confinement>>,
}

impl ProcessExecutor {
    fn new(session: Session, confinement: Confinement) -> Result<Self, ExecError> {
        Ok(Self {
            id: session.encode()?,
            session: Arc::new(session),
            confinement: Arc::new(Mutex::new(confinement)),
        })
    }

    /// Reattaches to the session encoded in `id`.
    pub fn open(id: &str) -> Result<(Self, Process), ExecError> {
        let session = Session::decode(id)?;
        let pid = session.pid;
        if !util::process_alive(pid) {
            return Err(ExecError::SessionNotFound(pid));
        }

        let confinement = Confinement {
            cgroup: session.cgroup_path().map(Cgroup::at),
            mounts: session.mount_paths(),
        };
        let executor = Self {
            id: id.to_string(),
            session: Arc::new(session),
            confinement: Arc::new(Mutex::new(confinement)),
        };
        debug!(target: "tno.exec.executor", pid, "session reopened");
        Ok((executor, Process::detached(pid)))
    }

    /// Session token accepted by [`open`](Self::open).
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        self.session.pid
    }

    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Asks the process to stop.
    pub fn shutdown(&self) -> Result<(), ExecError> {
        let pid = self.pid();
        #[cfg(unix)]
        let res = util::interrupt(pid);
        #[cfg(not(unix))]
        let res = util::terminate(pid);
        res.map_err(|e| ExecError::Signal(format!("failed to stop pid {pid}: {e}")))
    }

    /// Kills the whole task and releases its confinement.
    ///
    /// Only the kill outcome is returned; a confinement that cannot be released yet (a
    /// cgroup with unreaped members) is retried by [`cleanup`](Self::cleanup).
    pub fn force_stop(&self) -> Result<(), ExecError> {
        let pid = self.pid();
        let cgroup = self.lock().cgroup.clone();
        match cgroup {
            Some(cgroup) => cgroup.kill()?,
            None => util::terminate(pid)
                .map_err(|e| ExecError::Signal(format!("failed to kill pid {pid}: {e}")))?,
        }
        if let Err(e) = self.lock().release() {
            debug!(target: "tno.exec.executor", pid, error = %e, "confinement not released yet");
        }
        Ok(())
    }

    /// Releases whatever confinement is left. Called once the process has exited.
    pub fn cleanup(&self) -> Result<(), ExecError> {
        self.lock().release()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Confinement> {
        self.confinement
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
