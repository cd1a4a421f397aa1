// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Snoop server: accepts socket connections, answers version requests, and
// forks a snoop master per remote session. The snoop master runs a shell
// on a pty, relays it over the connection, and records the session to the
// snoop file (rshell) or replays the recording into a fresh shell (rsnoop).

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{report, ErrorCode, IpcError};
use crate::ipc::Ipc;
use crate::protocol::{Command, Method, Request, Response};
use crate::redirect::dup_onto;
use crate::transport::sockets::write_frame;
use crate::transport::TransportContext;
use crate::tty::{pty_fork, pty_loop, terminal_state, PtyFork, RawModeGuard, SnoopMode, TerminalState};

use super::{pid, ServerRole, ServerSession};

pub const SNOOPSRV_VERSION: &str = concat!("Snoopserver ", env!("CARGO_PKG_VERSION"));

/// What a snoop master runs and where it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoopSettings {
    pub shell: String,
    pub shell_args: Vec<String>,
    pub snoop_file: PathBuf,
}

impl Default for SnoopSettings {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            shell_args: vec!["--".to_string()],
            snoop_file: PathBuf::from("snoopfile"),
        }
    }
}

/// A running remote session inside a snoop master.
#[derive(Debug)]
pub struct PtySession {
    pub master: OwnedFd,
    pub slave_name: CString,
    pub shell_pid: libc::pid_t,
    /// Attributes of the daemon's stdin, when it was a terminal.
    pub terminal: Option<TerminalState>,
    pub mode: SnoopMode,
    pub snoop_file: File,
}

fn shell_argv(settings: &SnoopSettings) -> io::Result<Vec<CString>> {
    std::iter::once(&settings.shell)
        .chain(settings.shell_args.iter())
        .map(|s| {
            CString::new(s.as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
        })
        .collect()
}

fn exec_shell(argv: &[CString]) -> ! {
    let mut ptrs: Vec<*const libc::c_char> = argv.iter().map(|a| a.as_ptr()).collect();
    ptrs.push(std::ptr::null());
    unsafe {
        libc::execvp(ptrs[0], ptrs.as_ptr());
        let msg = b"snoopsrv: cannot execute shell\n";
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::_exit(1)
    }
}

pub struct SnoopServer {
    ipc: Ipc,
    ctx: TransportContext,
    session: ServerSession,
    settings: SnoopSettings,
    /// Snoop masters not yet reaped.
    masters: Vec<libc::pid_t>,
}

impl SnoopServer {
    /// Bind and listen on `port` (0 picks an ephemeral port).
    pub fn start(port: u16, backlog: i32, settings: SnoopSettings) -> Result<Self, IpcError> {
        let mut ctx = TransportContext::server(Method::Sockets).with_port(port);
        ctx.backlog = backlog;
        let mut ipc = Ipc::new(Method::Sockets);
        ipc.init(&mut ctx)?;
        let mut session = ServerSession::new(ServerRole::SnoopDaemon);
        session.resource_id = ctx.resource_id;
        Ok(Self {
            ipc,
            ctx,
            session,
            settings,
            masters: Vec::new(),
        })
    }

    /// The port actually listened on.
    pub fn port(&self) -> u16 {
        self.ctx.port
    }

    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    /// Accept connections forever. Returns only on an unrecoverable error.
    pub fn serve(&mut self) -> Result<(), IpcError> {
        loop {
            self.serve_one()?;
        }
    }

    /// Accept one connection and dispatch its first request.
    pub fn serve_one(&mut self) -> Result<(), IpcError> {
        self.reap_masters();
        self.ctx.expect_request();
        if let Err(e) = self.ipc.receive_request(&mut self.ctx) {
            return match e.code() {
                ErrorCode::Interrupted
                | ErrorCode::Disconnected
                | ErrorCode::TimedOut
                | ErrorCode::InvalidRequest
                | ErrorCode::UnsupportedIpc => {
                    report("snoopsrv: receive_request", &e);
                    Ok(())
                }
                _ => Err(e),
            };
        }
        let req = self.ctx.request()?.clone();

        match req.command {
            Command::Version => {
                tracing::info!(client = req.client_pid, "processing VERSION request");
                self.respond(SNOOPSRV_VERSION);
            }
            Command::Open | Command::RShell | Command::RSnoop => self.register(&req)?,
            Command::Terminate => {
                tracing::info!(client = req.client_pid, "client terminated");
            }
            Command::Idle => tracing::info!(client = req.client_pid, "idle"),
            other => {
                tracing::warn!(command = %other, client = req.client_pid, "unsupported command ignored");
            }
        }
        // Whatever the daemon still holds of this connection is closed here.
        drop(self.ipc.take_connection());
        self.ctx.payload = None;
        Ok(())
    }

    fn respond(&mut self, text: &str) {
        self.ctx.set_response(Response::with_text(pid(), text));
        if let Err(e) = self.ipc.send_response(&mut self.ctx) {
            report("snoopsrv: send_response", &e);
        }
    }

    fn reap_masters(&mut self) {
        self.masters.retain(|&child| {
            let mut status = 0;
            let done = unsafe { libc::waitpid(child, &mut status, libc::WNOHANG) };
            if done == child {
                tracing::info!(child, status, "snoop master exited");
            }
            done == 0
        });
    }

    /// Fork a snoop master for the connection the request arrived on.
    fn register(&mut self, req: &Request) -> Result<(), IpcError> {
        self.session.register();
        tracing::info!(
            client = req.client_pid,
            command = %req.command,
            "registering client, spawning snoop master"
        );
        let Some(conn) = self.ipc.take_connection() else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };

        match unsafe { libc::fork() } {
            -1 => {
                let e = IpcError::os("fork", io::Error::last_os_error());
                report("snoopsrv: spawn snoop master", &e);
                Ok(())
            }
            0 => {
                self.session.role = ServerRole::SnoopChild;
                let code = match self.run_master(conn, req.command) {
                    Ok(()) => 0,
                    Err(e) => {
                        tracing::error!(error = %e, "snoop master failed");
                        1
                    }
                };
                std::process::exit(code)
            }
            child => {
                self.masters.push(child);
                Ok(())
            }
        }
    }

    /// Body of a forked snoop master. Never returns to the accept loop.
    fn run_master(&mut self, conn: TcpStream, command: Command) -> io::Result<()> {
        if let Err(e) = self.ipc.finish(&mut self.ctx) {
            report("snoop master: finish listener", &e);
        }
        close_inherited(conn.as_raw_fd())?;

        let mode = if command == Command::RSnoop {
            SnoopMode::Playback
        } else {
            SnoopMode::Record
        };
        let snoop_file = match open_snoop_file(&self.settings.snoop_file, mode) {
            Ok(file) => file,
            Err(e) => {
                let text = match mode {
                    SnoopMode::Playback => format!(
                        "snoopsrv: no recorded session in {}: {e}\n",
                        self.settings.snoop_file.display()
                    ),
                    SnoopMode::Record => format!(
                        "snoopsrv: cannot record to {}: {e}\n",
                        self.settings.snoop_file.display()
                    ),
                };
                let notice = Response::with_text(pid(), &text);
                if let Err(send) = write_frame(&mut &conn, &notice.encode()) {
                    report("snoop master: send failure notice", &send);
                }
                return Err(e);
            }
        };

        let terminal = terminal_state(libc::STDIN_FILENO)?;
        let argv = shell_argv(&self.settings)?;
        dup_onto(&conn, libc::STDOUT_FILENO)?;

        tracing::info!(
            pid = pid(),
            shell = %self.settings.shell,
            "snoop master spawning shell"
        );
        let (shell_pid, master, slave_name) = match pty_fork(terminal.as_ref())? {
            PtyFork::Child => exec_shell(&argv),
            PtyFork::Parent {
                pid,
                master,
                slave_name,
            } => (pid, master, slave_name),
        };

        let pty = PtySession {
            master,
            slave_name,
            shell_pid,
            terminal,
            mode,
            snoop_file,
        };
        tracing::info!(
            slave = %pty.slave_name.to_string_lossy(),
            mode = ?pty.mode,
            file = %self.settings.snoop_file.display(),
            "entering pty loop"
        );

        let raw = match pty.terminal {
            Some(_) => Some(RawModeGuard::enter(libc::STDIN_FILENO)?),
            None => None,
        };
        let relayed = pty_loop(&pty.master, false, pty.snoop_file, &conn, pty.mode);
        drop(raw);

        // Hang up the shell: no master, no socket, stdout parked on /dev/null.
        drop(pty.master);
        drop(conn);
        park_stdout()?;
        unsafe {
            libc::kill(pty.shell_pid, libc::SIGHUP);
        }
        let status = reap_shell(pty.shell_pid)?;
        tracing::info!(shell = pty.shell_pid, status, "shell exited, snoop master done");
        relayed
    }

    /// Snoop masters forked so far and not yet reaped by the accept loop.
    pub fn masters(&self) -> &[libc::pid_t] {
        &self.masters
    }
}

fn open_snoop_file(path: &Path, mode: SnoopMode) -> io::Result<File> {
    match mode {
        SnoopMode::Record => File::create(path),
        SnoopMode::Playback => File::open(path),
    }
}

/// Close every descriptor above stderr except `keep`.
fn close_inherited(keep: RawFd) -> io::Result<()> {
    let fds: Vec<RawFd> = std::fs::read_dir("/proc/self/fd")?
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
        .collect();
    for fd in fds {
        if fd > libc::STDERR_FILENO && fd != keep {
            // The directory's own descriptor is already gone: EBADF.
            unsafe {
                libc::close(fd);
            }
        }
    }
    Ok(())
}

fn park_stdout() -> io::Result<()> {
    let null = File::options().write(true).open("/dev/null")?;
    dup_onto(&null, libc::STDOUT_FILENO)
}

const SHELL_GRACE: Duration = Duration::from_secs(2);

/// Wait for the hung-up shell, killing it once the grace period runs out.
fn reap_shell(shell: libc::pid_t) -> io::Result<libc::c_int> {
    let deadline = Instant::now() + SHELL_GRACE;
    let mut status = 0;
    loop {
        match unsafe { libc::waitpid(shell, &mut status, libc::WNOHANG) } {
            0 if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
            0 => {
                tracing::warn!(shell, "shell ignored hangup, killing it");
                unsafe {
                    libc::kill(shell, libc::SIGKILL);
                }
                return wait_blocking(shell);
            }
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
            _ => return Ok(status),
        }
    }
}

fn wait_blocking(child: libc::pid_t) -> io::Result<libc::c_int> {
    let mut status = 0;
    while unsafe { libc::waitpid(child, &mut status, 0) } < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    Ok(status)
}

impl Drop for SnoopServer {
    fn drop(&mut self) {
        if let Err(e) = self.ipc.finish(&mut self.ctx) {
            report("snoopsrv: finish", &e);
        }
    }
}
