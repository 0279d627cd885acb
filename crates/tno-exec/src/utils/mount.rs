//! Bind mounts used to populate a confined task directory.
use std::{ffi::CString, fs, io, os::unix::ffi::OsStrExt, path::Path};

use tracing::{debug, trace};

use crate::error::ExecError;

fn c_path(path: &Path) -> Result<CString, ExecError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| ExecError::Confine(format!("invalid path {}: {e}", path.display())))
}

fn mount(
    source: &CString,
    target: &CString,
    flags: libc::c_ulong,
) -> io::Result<()> {
    let rc = unsafe {
        libc::mount(
            source.as_ptr(),
            target.as_ptr(),
            std::ptr::null(),
            flags,
            std::ptr::null(),
        )
    };
    if rc != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Bind-mounts `source` onto `target`, creating `target` first.
///
/// Submounts of `source` are not carried over. A read-only bind needs a second remount
/// pass; the kernel ignores `MS_RDONLY` on the initial bind.
pub fn bind_mount(source: &Path, target: &Path, read_only: bool) -> Result<(), ExecError> {
    fs::create_dir_all(target).map_err(|e| {
        ExecError::Confine(format!("failed to create {}: {e}", target.display()))
    })?;

    let src = c_path(source)?;
    let dst = c_path(target)?;
    mount(&src, &dst, libc::MS_BIND).map_err(|e| {
        ExecError::Confine(format!(
            "failed to bind {} to {}: {e}",
            source.display(),
            target.display()
        ))
    })?;

    if read_only {
        let flags = libc::MS_BIND | libc::MS_REMOUNT | libc::MS_RDONLY | libc::MS_NOSUID;
        if let Err(e) = mount(&src, &dst, flags) {
            let _ = unmount(target);
            return Err(ExecError::Confine(format!(
                "failed to remount {} read-only: {e}",
                target.display()
            )));
        }
    }

    debug!(
        target: "tno.exec.mount",
        source = %source.display(),
        target = %target.display(),
        read_only,
        "bind mounted"
    );
    Ok(())
}

/// Lazily detaches the mount at `target`. A path that is not mounted is not an error.
pub fn unmount(target: &Path) -> Result<(), ExecError> {
    let dst = c_path(target)?;
    let rc = unsafe { libc::umount2(dst.as_ptr(), libc::MNT_DETACH) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINVAL) | Some(libc::ENOENT) => {
                trace!(target: "tno.exec.mount", target = %target.display(), "not mounted");
            }
            _ => {
                return Err(ExecError::Confine(format!(
                    "failed to unmount {}: {err}",
                    target.display()
                )));
            }
        }
    }
    debug!(target: "tno.exec.mount", target = %target.display(), "unmounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmount_of_plain_directory_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        // EINVAL for a non-mount point, or EPERM without CAP_SYS_ADMIN.
        match unmount(tmp.path()) {
            Ok(()) | Err(ExecError::Confine(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn interior_nul_is_rejected() {
        let path = Path::new("bad\0path");
        assert!(matches!(unmount(path), Err(ExecError::Confine(_))));
    }

    #[test]
    fn bind_mount_round_trip_as_root() {
        if !crate::util::is_privileged() {
            return;
        }
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("marker"), "x").unwrap();
        let dst = tempfile::tempdir().unwrap();
        let target = dst.path().join("bin");

        if bind_mount(src.path(), &target, true).is_err() {
            // Root without CAP_SYS_ADMIN, e.g. an unprivileged container.
            return;
        }
        assert!(target.join("marker").exists());
        assert!(fs::write(target.join("new"), "y").is_err());

        unmount(&target).unwrap();
        assert!(!target.join("marker").exists());
    }
}
