// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Line input with a timeout, and the SIGALRM-based ACK timer.

use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Result of one [`LineReader::read_line`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A line without its trailing newline.
    Line(String),
    TimedOut,
    Eof,
}

/// Unbuffered-at-the-fd line reader, so `poll` always reflects what has not
/// been consumed yet.
#[derive(Debug)]
pub struct LineReader {
    fd: RawFd,
    _owned: Option<OwnedFd>,
    pending: Vec<u8>,
    eof: bool,
}

impl LineReader {
    pub fn stdin() -> Self {
        Self {
            fd: libc::STDIN_FILENO,
            _owned: None,
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Read from an owned descriptor (a pipe in tests, a script file).
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            fd: fd.as_raw_fd(),
            _owned: Some(fd),
            pending: Vec::new(),
            eof: false,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let at = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=at).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Wait up to `timeout` (forever if `None`) for a complete line.
    pub fn read_line(&mut self, timeout: Option<Duration>) -> io::Result<ReadOutcome> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadOutcome::Line(line));
            }
            if self.eof {
                if self.pending.is_empty() {
                    return Ok(ReadOutcome::Eof);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(ReadOutcome::Line(String::from_utf8_lossy(&rest).into_owned()));
            }

            let wait_ms = match deadline {
                None => -1,
                Some(d) => {
                    let left = d.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(ReadOutcome::TimedOut);
                    }
                    left.as_millis().clamp(1, i32::MAX as u128) as i32
                }
            };
            let mut pfd = libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let ready = unsafe { libc::poll(&mut pfd, 1, wait_ms) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if ready == 0 {
                return Ok(ReadOutcome::TimedOut);
            }

            let mut chunk = [0u8; 1024];
            let n = unsafe { libc::read(self.fd, chunk.as_mut_ptr().cast(), chunk.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if n == 0 {
                self.eof = true;
            } else {
                self.pending.extend_from_slice(&chunk[..n as usize]);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ACK timer
// ---------------------------------------------------------------------------

static ALARM_FIRED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_alarm(_signo: libc::c_int) {
    ALARM_FIRED.store(true, Ordering::SeqCst);
}

/// Arms `alarm(secs)` with a SIGALRM handler installed without
/// `SA_RESTART`, so a blocked `semop`/`recv` fails with EINTR when it fires.
/// Dropping the timer cancels the alarm and restores the previous handler.
pub struct AckTimer {
    previous: libc::sigaction,
}

impl AckTimer {
    pub fn arm(timeout: Duration) -> io::Result<Self> {
        ALARM_FIRED.store(false, Ordering::SeqCst);
        let mut previous = MaybeUninit::<libc::sigaction>::zeroed();
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_alarm as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(libc::SIGALRM, &action, previous.as_mut_ptr()) < 0 {
                return Err(io::Error::last_os_error());
            }
            libc::alarm(timeout.as_secs().max(1) as libc::c_uint);
            Ok(Self {
                previous: previous.assume_init(),
            })
        }
    }

    /// Whether the alarm went off since the timer was armed.
    pub fn fired(&self) -> bool {
        ALARM_FIRED.load(Ordering::SeqCst)
    }
}

impl Drop for AckTimer {
    fn drop(&mut self) {
        unsafe {
            libc::alarm(0);
            libc::sigaction(libc::SIGALRM, &self.previous, std::ptr::null_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::FromRawFd;

    fn pipe() -> (OwnedFd, std::fs::File) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe {
            (
                OwnedFd::from_raw_fd(fds[0]),
                std::fs::File::from_raw_fd(fds[1]),
            )
        }
    }

    #[test]
    fn lines_are_split_and_buffered() {
        let (r, mut w) = pipe();
        let mut reader = LineReader::from_fd(r);
        w.write_all(b"first\nsecond\r\nthi").unwrap();
        assert_eq!(reader.read_line(None).unwrap(), ReadOutcome::Line("first".into()));
        assert_eq!(reader.read_line(None).unwrap(), ReadOutcome::Line("second".into()));
        drop(w);
        assert_eq!(reader.read_line(None).unwrap(), ReadOutcome::Line("thi".into()));
        assert_eq!(reader.read_line(None).unwrap(), ReadOutcome::Eof);
    }

    #[test]
    fn quiet_input_times_out() {
        let (r, _w) = pipe();
        let mut reader = LineReader::from_fd(r);
        let outcome = reader.read_line(Some(Duration::from_millis(50))).unwrap();
        assert_eq!(outcome, ReadOutcome::TimedOut);
    }
}
