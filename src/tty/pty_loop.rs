// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Two-process copy loop between a client socket and a pty master.
//
// The forked input side turns request frames from the socket into bytes for
// the pty (recording or replaying them through the snoop file). The output
// side turns everything the pty produces into response frames on stdout,
// which the snoop master has pointed at the socket.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::protocol::{Command, Request, Response, BSIZE, REQUEST_SIZE};
use crate::transport::sockets::read_frame;

use super::pty::write_fd;

/// How the snoop file is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnoopMode {
    /// Every line sent by the client is appended to the snoop file.
    Record,
    /// Client lines are sync points; the pty is fed from the snoop file.
    Playback,
}

const OUTPUT_TICK_MS: libc::c_int = 100;
const INPUT_GRACE: Duration = Duration::from_secs(1);

static TERM_CAUGHT: AtomicBool = AtomicBool::new(false);

extern "C" fn on_term(_signo: libc::c_int) {
    TERM_CAUGHT.store(true, Ordering::SeqCst);
}

fn install_term_handler() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_term as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Input side: socket frames to the pty master.
fn copy_input(master: &OwnedFd, socket: &TcpStream, snoop: File, mode: SnoopMode) {
    let mut socket = socket;
    let mut recording = BufReader::new(&snoop);
    let mut log = &snoop;
    let mut frame = [0u8; REQUEST_SIZE];

    while !TERM_CAUGHT.load(Ordering::SeqCst) {
        if let Err(e) = read_frame(&mut socket, &mut frame) {
            tracing::debug!(error = %e, "client input ended");
            break;
        }
        let req = match Request::decode(&frame) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable frame from client");
                continue;
            }
        };
        if req.command == Command::Terminate {
            break;
        }

        let bytes = match mode {
            SnoopMode::Playback => {
                let mut line = String::new();
                match recording.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => line.into_bytes(),
                    Err(e) => {
                        tracing::error!(error = %e, "cannot read snoop file");
                        break;
                    }
                }
            }
            SnoopMode::Record => {
                let text = req.text().into_owned();
                if let Err(e) = log.write_all(text.as_bytes()) {
                    tracing::error!(error = %e, "cannot write snoop file");
                    break;
                }
                text.into_bytes()
            }
        };
        if bytes.is_empty() {
            continue;
        }
        if let Err(e) = write_fd(master, &bytes) {
            tracing::error!(error = %e, "cannot write to pty master");
            break;
        }
    }
}

/// Output side: pty master to response frames on stdout. Returns when the
/// pty closes, a write fails, or SIGTERM arrives.
fn copy_output(master: &OwnedFd) {
    let srv_pid = std::process::id() as i32;
    // Raw fd 1: the forked master must not touch the std stdout lock.
    let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
    let mut buf = [0u8; BSIZE - 1];
    while !TERM_CAUGHT.load(Ordering::SeqCst) {
        // TERM may land outside read(), so never block longer than a tick.
        let mut pfd = libc::pollfd {
            fd: master.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        match unsafe { libc::poll(&mut pfd, 1, OUTPUT_TICK_MS) } {
            0 => continue,
            n if n < 0 => {
                if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                break;
            }
            _ => {}
        }
        let n = unsafe { libc::read(master.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if n <= 0 {
            // EOF, EIO once the slave is gone, or EINTR from SIGTERM.
            break;
        }
        let resp = Response::with_bytes(srv_pid, &buf[..n as usize]);
        if write_fd(&stdout, &resp.encode()).is_err() {
            break;
        }
    }
}

/// Run the copy loop until either side finishes.
///
/// The input side is forked off; when it ends it signals this process with
/// SIGTERM unless `ignore_eof` is set. When the output side ends first it
/// terminates the input side. Both sides are reaped before returning.
pub fn pty_loop(
    master: &OwnedFd,
    ignore_eof: bool,
    snoop: File,
    socket: &TcpStream,
    mode: SnoopMode,
) -> io::Result<()> {
    TERM_CAUGHT.store(false, Ordering::SeqCst);
    install_term_handler()?;

    let child = unsafe { libc::fork() };
    if child < 0 {
        return Err(io::Error::last_os_error());
    }
    if child == 0 {
        copy_input(master, socket, snoop, mode);
        if !ignore_eof {
            unsafe {
                libc::kill(libc::getppid(), libc::SIGTERM);
            }
        }
        std::process::exit(0);
    }

    drop(snoop);
    copy_output(master);

    if !TERM_CAUGHT.load(Ordering::SeqCst) {
        unsafe {
            libc::kill(child, libc::SIGTERM);
        }
    }
    let status = reap_input_side(child);
    tracing::debug!(child, status, "pty input side reaped");
    Ok(())
}

/// Reap the input side, killing it if it is still parked in a socket read
/// after the grace period.
fn reap_input_side(child: libc::pid_t) -> libc::c_int {
    let deadline = Instant::now() + INPUT_GRACE;
    let mut status = 0;
    loop {
        let done = unsafe { libc::waitpid(child, &mut status, libc::WNOHANG) };
        if done == child {
            return status;
        }
        if done < 0 && io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
            return status;
        }
        if done == 0 && Instant::now() >= deadline {
            unsafe {
                libc::kill(child, libc::SIGKILL);
            }
            while unsafe { libc::waitpid(child, &mut status, 0) } < 0 {
                if io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
                    break;
                }
            }
            return status;
        }
        thread::sleep(Duration::from_millis(10));
    }
}
