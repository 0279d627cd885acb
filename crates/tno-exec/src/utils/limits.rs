//! POSIX rlimit-based limits for the constrained executor.
//!
//! On Unix the limits are applied inside a `pre_exec` hook, in the child after `fork()`
//! and before `execve()`, so the task never runs without them.
//! On other platforms a non-empty configuration is logged and ignored; the cgroup
//! limits are what the executor treats as mandatory.
use tno_model::Resources;
use tokio::process::Command;

/// Per-process limits derived from a task's resources.
///
/// `None` leaves the inherited limit unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RlimitConfig {
    /// `RLIMIT_FSIZE`. Writing past it delivers `SIGXFSZ`.
    pub max_file_size_bytes: Option<u64>,
    /// `RLIMIT_CORE = 0`.
    pub disable_core_dumps: bool,
}

impl RlimitConfig {
    /// Limits applied to every constrained task: no core dumps, and the task's disk
    /// budget as the largest file it may write.
    pub fn for_resources(resources: Option<&Resources>) -> Self {
        let max_file_size_bytes = resources
            .map(Resources::disk_bytes)
            .filter(|bytes| *bytes > 0);
        Self {
            max_file_size_bytes,
            disable_core_dumps: true,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.disable_core_dumps && self.max_file_size_bytes.is_none()
    }
}

/// Installs the limits on `cmd`.
pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    {
        unix_impl::attach_rlimits(cmd, config);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
        tracing::warn!(
            target: "tno.exec.limits",
            ?config,
            "rlimits requested on a non-Unix OS; ignoring"
        );
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;

    use super::RlimitConfig;

    pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
        let RlimitConfig {
            max_file_size_bytes,
            disable_core_dumps,
        } = config.clone();

        unsafe {
            cmd.pre_exec(move || {
                if let Some(fsize) = max_file_size_bytes {
                    apply_rlimit(libc::RLIMIT_FSIZE as libc::c_int, fsize)?;
                }
                if disable_core_dumps {
                    apply_rlimit(libc::RLIMIT_CORE as libc::c_int, 0)?;
                }
                Ok(())
            });
        }
    }

    fn apply_rlimit(resource: libc::c_int, value: u64) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };

        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        let rc = unsafe { libc::setrlimit(resource as libc::__rlimit_resource_t, &rlim) };
        #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
        let rc = unsafe { libc::setrlimit(resource, &rlim) };

        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}
