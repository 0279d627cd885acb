use std::{io, path::Path};

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        /// Device opened as the task's stdin.
        pub const NULL_DEVICE: &str = "nul";
    } else {
        /// Device opened as the task's stdin.
        pub const NULL_DEVICE: &str = "/dev/null";
    }
}

/// Returns `true` when the client runs with an effective uid of 0.
///
/// Hosts without that notion report `true`.
pub fn is_privileged() -> bool {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            unsafe { libc::geteuid() == 0 }
        } else {
            true
        }
    }
}

/// Adds the executable bits (`0o755`) to a file.
pub fn make_executable(path: &Path) -> io::Result<()> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(perms.mode() | 0o755);
            std::fs::set_permissions(path, perms)
        } else {
            let _ = path;
            Ok(())
        }
    }
}

#[cfg(unix)]
pub use unix_impl::{interrupt, process_alive, send_signal, terminate};

#[cfg(not(unix))]
pub use other_impl::{process_alive, terminate};

#[cfg(unix)]
mod unix_impl {
    use std::io;

    /// Sends `signal` to `pid`. Refuses pids that would address a process group.
    pub fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
        let raw = libc::pid_t::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;

        let rc = unsafe { libc::kill(raw, signal) };
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Graceful termination request.
    #[inline]
    pub fn interrupt(pid: u32) -> io::Result<()> {
        send_signal(pid, libc::SIGINT)
    }

    /// Forced termination.
    #[inline]
    pub fn terminate(pid: u32) -> io::Result<()> {
        send_signal(pid, libc::SIGKILL)
    }

    /// Whether a live process with this pid exists.
    ///
    /// A process owned by another user still counts as alive; a zombie does not.
    pub fn process_alive(pid: u32) -> bool {
        match send_signal(pid, 0) {
            Ok(()) => !is_zombie(pid),
            Err(e) => e.raw_os_error() == Some(libc::EPERM),
        }
    }

    #[cfg(target_os = "linux")]
    fn is_zombie(pid: u32) -> bool {
        // Field 3 of /proc/<pid>/stat, after the parenthesised command name.
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let rest = &stat[stat.rfind(')')? + 1..];
                rest.split_whitespace().next().map(|state| state == "Z")
            })
            .unwrap_or(false)
    }

    #[cfg(not(target_os = "linux"))]
    fn is_zombie(_pid: u32) -> bool {
        false
    }
}

#[cfg(not(unix))]
mod other_impl {
    use std::{io, process::Command};

    pub fn terminate(pid: u32) -> io::Result<()> {
        let status = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("taskkill exited with {status}")))
        }
    }

    pub fn process_alive(_pid: u32) -> bool {
        false
    }
}
