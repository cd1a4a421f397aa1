// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Output redirection onto files: used by the pipeline executor for `>` and
// `>>`, and by the servers to send stdout/stderr to their log.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// How a redirect target is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>`: create or truncate.
    Overwrite,
    /// `>>`: create or append.
    Append,
}

impl RedirectMode {
    fn flags(self) -> libc::c_int {
        let base = libc::O_CREAT | libc::O_WRONLY | libc::O_CLOEXEC;
        match self {
            Self::Overwrite => base | libc::O_TRUNC,
            Self::Append => base | libc::O_APPEND,
        }
    }
}

/// Which standard streams a redirect replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    Stdout,
    StdoutAndStderr,
}

/// Open `path` with owner read/write permissions according to `mode`.
pub fn open_target(path: &Path, mode: RedirectMode) -> io::Result<OwnedFd> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;
    let fd = unsafe { libc::open(c_path.as_ptr(), mode.flags(), 0o600 as libc::c_uint) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// `dup2(src, dst)`.
pub fn dup_onto(src: &impl AsRawFd, dst: libc::c_int) -> io::Result<()> {
    if unsafe { libc::dup2(src.as_raw_fd(), dst) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Point the selected standard streams of this process at `path`.
pub fn establish(path: &Path, mode: RedirectMode, target: RedirectTarget) -> io::Result<()> {
    let fd = open_target(path, mode)?;
    dup_onto(&fd, libc::STDOUT_FILENO)?;
    if target == RedirectTarget::StdoutAndStderr {
        dup_onto(&fd, libc::STDERR_FILENO)?;
    }
    Ok(())
}
