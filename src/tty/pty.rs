// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Pseudo-terminal allocation and the fork that puts a child on the slave
// side as its controlling terminal.

use std::ffi::{CStr, CString};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Terminal attributes and window size captured from a tty.
#[derive(Clone, Copy)]
pub struct TerminalState {
    pub termios: libc::termios,
    pub winsize: libc::winsize,
}

impl std::fmt::Debug for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalState")
            .field("rows", &self.winsize.ws_row)
            .field("cols", &self.winsize.ws_col)
            .finish()
    }
}

pub fn is_tty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// Capture the attributes and window size of `fd`, or `None` if it is not
/// a terminal.
pub fn terminal_state(fd: RawFd) -> io::Result<Option<TerminalState>> {
    if !is_tty(fd) {
        return Ok(None);
    }
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut termios) < 0 {
            return Err(io::Error::last_os_error());
        }
        let mut winsize: libc::winsize = std::mem::zeroed();
        if libc::ioctl(fd, libc::TIOCGWINSZ, &mut winsize) < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Some(TerminalState { termios, winsize }))
    }
}

/// Open a pty master and return it with the slave's device path.
pub fn open_master() -> io::Result<(OwnedFd, CString)> {
    let fd = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY | libc::O_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let master = unsafe { OwnedFd::from_raw_fd(fd) };
    unsafe {
        if libc::grantpt(fd) < 0 || libc::unlockpt(fd) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    let mut name = [0 as libc::c_char; 128];
    let rc = unsafe { libc::ptsname_r(fd, name.as_mut_ptr(), name.len()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    let slave = unsafe { CStr::from_ptr(name.as_ptr()) }.to_owned();
    Ok((master, slave))
}

/// Outcome of [`pty_fork`] on each side.
#[derive(Debug)]
pub enum PtyFork {
    /// Running in the child: stdin/stdout/stderr are the slave and it is the
    /// controlling terminal of a new session.
    Child,
    Parent {
        pid: libc::pid_t,
        master: OwnedFd,
        slave_name: CString,
    },
}

fn child_fail(msg: &[u8]) -> ! {
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::_exit(1)
    }
}

/// Allocate a pty and fork. The child's slave side gets `state` applied
/// when given.
pub fn pty_fork(state: Option<&TerminalState>) -> io::Result<PtyFork> {
    let (master, slave_name) = open_master()?;

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(io::Error::last_os_error());
    }
    if pid > 0 {
        return Ok(PtyFork::Parent {
            pid,
            master,
            slave_name,
        });
    }

    unsafe {
        if libc::setsid() < 0 {
            child_fail(b"pty_fork: setsid failed\n");
        }
        let slave = libc::open(slave_name.as_ptr(), libc::O_RDWR);
        if slave < 0 {
            child_fail(b"pty_fork: cannot open slave pty\n");
        }
        drop(master);
        if libc::ioctl(slave, libc::TIOCSCTTY, 0) < 0 {
            child_fail(b"pty_fork: TIOCSCTTY failed\n");
        }
        if let Some(state) = state {
            if libc::tcsetattr(slave, libc::TCSANOW, &state.termios) < 0 {
                child_fail(b"pty_fork: tcsetattr on slave failed\n");
            }
            if libc::ioctl(slave, libc::TIOCSWINSZ, &state.winsize) < 0 {
                child_fail(b"pty_fork: TIOCSWINSZ on slave failed\n");
            }
        }
        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(slave, target) < 0 {
                child_fail(b"pty_fork: dup2 onto stdio failed\n");
            }
        }
        if slave > libc::STDERR_FILENO {
            libc::close(slave);
        }
    }
    Ok(PtyFork::Child)
}

/// Write all of `buf` to a raw descriptor.
pub fn write_fd(fd: &impl AsRawFd, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let n = unsafe { libc::write(fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        buf = &buf[n as usize..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_has_a_slave_device() {
        let (master, slave) = open_master().expect("posix_openpt");
        assert!(master.as_raw_fd() >= 0);
        assert!(slave.to_bytes().starts_with(b"/dev/"));
    }
}
