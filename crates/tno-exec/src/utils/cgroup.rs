//! Minimal cgroup v2 control for constrained tasks.
//!
//! Each task gets its own group under a configurable root. The child process joins it
//! from a `pre_exec` hook, so every descendant is accounted and can be killed together.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tno_model::Resources;
use tracing::{debug, trace, warn};

use crate::{error::ExecError, util};

/// Client option naming the parent group of task cgroups.
pub const CGROUP_ROOT_OPTION: &str = "driver.exec.cgroup_root";
/// Parent group used when the option is absent.
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup/tno";

const MEMORY_MAX: &str = "memory.max";
const CPU_WEIGHT: &str = "cpu.weight";
const IO_WEIGHT: &str = "io.weight";
const CGROUP_PROCS: &str = "cgroup.procs";
const CGROUP_KILL: &str = "cgroup.kill";

/// Converts cgroup v1 style cpu shares into a v2 `cpu.weight`.
///
/// Shares are clamped to `[2, 262144]` and mapped linearly onto `[1, 10000]`.
pub fn cpu_shares_to_weight(shares: u64) -> u64 {
    let shares = shares.clamp(2, 262_144);
    1 + ((shares - 2) * 9_999) / 262_142
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cgroup {
    path: PathBuf,
}

impl Cgroup {
    /// Creates a fresh, uniquely named group under `root`.
    pub fn create(root: &Path) -> Result<Self, ExecError> {
        let path = root.join(format!("task-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&path).map_err(|e| {
            ExecError::Limit(format!("failed to create cgroup {}: {e}", path.display()))
        })?;
        debug!(target: "tno.exec.cgroup", path = %path.display(), "cgroup created");
        Ok(Self { path })
    }

    /// Refers to an existing group, e.g. one recorded in an executor session.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the memory, cpu and io limits of `resources`. Zero values are left unset.
    pub fn apply(&self, resources: &Resources) -> Result<(), ExecError> {
        if resources.memory_mb > 0 {
            self.write(MEMORY_MAX, &resources.memory_bytes().to_string())?;
        }
        if resources.cpu > 0 {
            let weight = cpu_shares_to_weight(u64::from(resources.cpu));
            self.write(CPU_WEIGHT, &weight.to_string())?;
        }
        if resources.iops > 0 {
            // io.weight accepts [1, 10000].
            let weight = resources.iops.min(10_000);
            self.write(IO_WEIGHT, &format!("default {weight}"))?;
        }
        Ok(())
    }

    /// Pids currently in the group.
    pub fn procs(&self) -> Vec<u32> {
        fs::read_to_string(self.path.join(CGROUP_PROCS))
            .map(|raw| raw.lines().filter_map(|l| l.trim().parse().ok()).collect())
            .unwrap_or_default()
    }

    /// Kills every process in the group.
    ///
    /// Uses `cgroup.kill` where the kernel provides it and falls back to signalling each
    /// member.
    pub fn kill(&self) -> Result<(), ExecError> {
        if self.path.join(CGROUP_KILL).exists() {
            return self.write(CGROUP_KILL, "1").map_err(|e| ExecError::Signal(e.to_string()));
        }
        for pid in self.procs() {
            if let Err(e) = util::terminate(pid) {
                if util::process_alive(pid) {
                    return Err(ExecError::Signal(format!("failed to kill pid {pid}: {e}")));
                }
            }
        }
        Ok(())
    }

    /// Removes the group. A group that is already gone is not an error.
    pub fn remove(&self) -> Result<(), ExecError> {
        match fs::remove_dir(&self.path) {
            Ok(()) => {
                debug!(target: "tno.exec.cgroup", path = %self.path.display(), "cgroup removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(target: "tno.exec.cgroup", path = %self.path.display(), error = %e, "cgroup removal failed");
                Err(ExecError::Limit(format!(
                    "failed to remove cgroup {}: {e}",
                    self.path.display()
                )))
            }
        }
    }

    /// Makes the child of `cmd` join the group before it execs.
    #[cfg(unix)]
    pub fn attach_on_exec(&self, cmd: &mut tokio::process::Command) -> Result<(), ExecError> {
        use std::{ffi::CString, os::unix::ffi::OsStrExt};

        let procs = CString::new(self.path.join(CGROUP_PROCS).as_os_str().as_bytes())
            .map_err(|e| ExecError::Limit(format!("invalid cgroup path: {e}")))?;

        unsafe {
            cmd.pre_exec(move || {
                let fd = libc::open(procs.as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC);
                if fd < 0 {
                    return Err(io::Error::last_os_error());
                }
                // "0" stands for the writing process itself.
                let rc = libc::write(fd, b"0".as_ptr().cast(), 1);
                let err = io::Error::last_os_error();
                libc::close(fd);
                if rc != 1 {
                    return Err(err);
                }
                Ok(())
            });
        }
        Ok(())
    }

    fn write(&self, file: &str, value: &str) -> Result<(), ExecError> {
        trace!(target: "tno.exec.cgroup", path = %self.path.display(), file, value, "cgroup write");
        fs::write(self.path.join(file), value).map_err(|e| {
            ExecError::Limit(format!(
                "failed to write {value} to {}/{file}: {e}",
                self.path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_to_weight_bounds() {
        assert_eq!(cpu_shares_to_weight(0), 1);
        assert_eq!(cpu_shares_to_weight(2), 1);
        assert_eq!(cpu_shares_to_weight(1024), 39);
        assert_eq!(cpu_shares_to_weight(262_144), 10_000);
        assert_eq!(cpu_shares_to_weight(u64::MAX), 10_000);
    }

    #[test]
    fn create_apply_and_remove_against_fake_root() {
        let root = tempfile::tempdir().unwrap();
        let cg = Cgroup::create(root.path()).unwrap();
        assert!(cg.path().starts_with(root.path()));
        assert!(cg.path().is_dir());

        let res = Resources {
            cpu: 1024,
            memory_mb: 64,
            ..Resources::default()
        };
        cg.apply(&res).unwrap();
        assert_eq!(
            fs::read_to_string(cg.path().join(MEMORY_MAX)).unwrap(),
            (64u64 * 1024 * 1024).to_string()
        );
        assert_eq!(fs::read_to_string(cg.path().join(CPU_WEIGHT)).unwrap(), "39");

        // A real cgroupfs hides its control files from rmdir; a plain directory does not.
        fs::remove_file(cg.path().join(MEMORY_MAX)).unwrap();
        fs::remove_file(cg.path().join(CPU_WEIGHT)).unwrap();
        cg.remove().unwrap();
        assert!(!cg.path().exists());
        cg.remove().unwrap();
    }

    #[test]
    fn zero_limits_write_nothing() {
        let root = tempfile::tempdir().unwrap();
        let cg = Cgroup::create(root.path()).unwrap();
        cg.apply(&Resources::default()).unwrap();
        assert!(!cg.path().join(MEMORY_MAX).exists());
        assert!(!cg.path().join(CPU_WEIGHT).exists());
        assert!(!cg.path().join(IO_WEIGHT).exists());
    }

    #[test]
    fn iops_becomes_clamped_io_weight() {
        let root = tempfile::tempdir().unwrap();
        let cg = Cgroup::create(root.path()).unwrap();

        cg.apply(&Resources {
            iops: 500,
            ..Resources::default()
        })
        .unwrap();
        assert_eq!(fs::read_to_string(cg.path().join(IO_WEIGHT)).unwrap(), "default 500");

        cg.apply(&Resources {
            iops: 50_000,
            ..Resources::default()
        })
        .unwrap();
        assert_eq!(fs::read_to_string(cg.path().join(IO_WEIGHT)).unwrap(), "default 10000");
    }

    #[test]
    fn kill_prefers_cgroup_kill() {
        let root = tempfile::tempdir().unwrap();
        let cg = Cgroup::create(root.path()).unwrap();
        fs::write(cg.path().join(CGROUP_KILL), "0").unwrap();

        cg.kill().unwrap();
        assert_eq!(fs::read_to_string(cg.path().join(CGROUP_KILL)).unwrap(), "1");
    }

    #[test]
    fn procs_parses_members() {
        let root = tempfile::tempdir().unwrap();
        let cg = Cgroup::create(root.path()).unwrap();
        assert!(cg.procs().is_empty());

        fs::write(cg.path().join(CGROUP_PROCS), "12\n34\n").unwrap();
        assert_eq!(cg.procs(), vec![12, 34]);
    }

    #[test]
    fn create_under_unwritable_root_is_limit_error() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        fs::write(&file, "").unwrap();

        let err = Cgroup::create(&file).unwrap_err();
        assert!(matches!(err, ExecError::Limit(_)));
    }
}
