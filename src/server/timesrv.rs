// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Time server: answers time, version and ping requests arriving in the
// well-known shared memory mailbox, and shuts down once the last
// registered client has terminated.

use crate::error::{report, ErrorCode, IpcError};
use crate::ipc::Ipc;
use crate::protocol::{Command, Method, Request, Response, TimeType};
use crate::transport::TransportContext;

use super::{pid, ServerRole, ServerSession};

pub const TIMESRV_VERSION: &str = concat!("Time Server ", env!("CARGO_PKG_VERSION"));

const TIME_UNAVAILABLE: &str =
    "There was an error getting system time. Please come back later and check the server's log.\n";

/// What the serve loop does after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub response: Option<Response>,
    pub control: Control,
}

impl Reply {
    fn respond(srv_pid: i32, text: &str) -> Self {
        Self {
            response: Some(Response::with_text(srv_pid, text)),
            control: Control::Continue,
        }
    }

    fn ignore() -> Self {
        Self {
            response: None,
            control: Control::Continue,
        }
    }
}

/// Process CPU accounting, as reported by `times(2)`.
#[derive(Debug, Clone, Copy)]
struct Ticks {
    elapsed: i64,
    user: i64,
    system: i64,
    hz: i64,
}

fn ticks() -> Option<Ticks> {
    let mut tms: libc::tms = unsafe { std::mem::zeroed() };
    let elapsed = unsafe { libc::times(&mut tms) };
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if elapsed == -1 as libc::clock_t || hz <= 0 {
        tracing::error!(error = %std::io::Error::last_os_error(), "times() failed");
        return None;
    }
    Some(Ticks {
        elapsed: elapsed as i64,
        user: tms.tms_utime as i64,
        system: tms.tms_stime as i64,
        hz: hz as i64,
    })
}

fn elapsed_text() -> String {
    match ticks() {
        Some(t) => format!(
            "Elapsed Time: [{}]=[{:.2}], User time: [{}], System time: [{}], Clocks per second: [{}]\n",
            t.elapsed,
            t.elapsed as f64 / t.hz as f64,
            t.user,
            t.system,
            t.hz
        ),
        None => TIME_UNAVAILABLE.to_string(),
    }
}

fn ping_text() -> String {
    match ticks() {
        Some(t) => format!(
            "PING reply: Elapsed Time: [{:.2}]\n",
            t.elapsed as f64 / t.hz as f64
        ),
        None => TIME_UNAVAILABLE.to_string(),
    }
}

fn time_of_day_text() -> String {
    chrono::Local::now().format("%a %b %e %H:%M:%S %Y\n").to_string()
}

/// Request handling without any IPC: updates the registration count and
/// builds the reply.
#[derive(Debug)]
pub struct TimeService {
    session: ServerSession,
    srv_pid: i32,
}

impl Default for TimeService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeService {
    pub fn new() -> Self {
        Self {
            session: ServerSession::new(ServerRole::TimeServer),
            srv_pid: pid(),
        }
    }

    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    pub fn handle(&mut self, req: &Request) -> Reply {
        let pid = self.srv_pid;
        match req.command {
            Command::Idle => {
                tracing::info!(client = req.client_pid, "idle");
                Reply::respond(pid, "Idle")
            }
            Command::Time => {
                tracing::info!(
                    client = req.client_pid,
                    resource_id = req.resource_id,
                    sem_id = req.sem_id,
                    time_type = ?req.time_type,
                    "processing TIME request"
                );
                let text = match req.time_type {
                    TimeType::None => {
                        tracing::warn!(client = req.client_pid, "time request without a time type");
                        "Application Logic Error: Request for NO time has been received.\n".to_string()
                    }
                    TimeType::Elapsed => elapsed_text(),
                    TimeType::TimeOfDay => time_of_day_text(),
                };
                Reply::respond(pid, &text)
            }
            Command::Open => {
                self.session.register();
                tracing::info!(
                    client = req.client_pid,
                    resource_id = req.resource_id,
                    ref_count = self.session.ref_count,
                    "client registered"
                );
                let text = format!(
                    "Registered client # {} with PID={}\n",
                    self.session.ref_count, req.client_pid
                );
                Reply::respond(pid, &text)
            }
            Command::Version => {
                tracing::info!(client = req.client_pid, "processing VERSION request");
                Reply::respond(pid, TIMESRV_VERSION)
            }
            Command::Ping => {
                tracing::debug!(client = req.client_pid, "processing PING request");
                Reply::respond(pid, &ping_text())
            }
            Command::Terminate => {
                let shut_down = self.session.terminate();
                tracing::info!(
                    client = req.client_pid,
                    ref_count = self.session.ref_count,
                    "processing TERMINATE request"
                );
                let mut reply = Reply::respond(pid, "ACK");
                if shut_down {
                    tracing::info!(client = req.client_pid, "last client left, shutting down");
                    reply.control = Control::Shutdown;
                }
                reply
            }
            Command::RShell | Command::RSnoop => {
                tracing::warn!(
                    command = %req.command,
                    client = req.client_pid,
                    "unsupported command ignored"
                );
                Reply::ignore()
            }
        }
    }
}

/// The time server process: a shared memory server transport plus the
/// request handler.
pub struct TimeServer {
    ipc: Ipc,
    ctx: TransportContext,
    service: TimeService,
    finished: bool,
}

impl TimeServer {
    /// Create the well-known mailbox at `key`.
    pub fn start(key: i32) -> Result<Self, IpcError> {
        let mut ctx = TransportContext::server(Method::Shmem).with_key(key);
        let mut ipc = Ipc::new(Method::Shmem);
        ipc.init(&mut ctx)?;
        let mut service = TimeService::new();
        service.session.resource_id = ctx.resource_id;
        service.session.sem_id = ctx.sem_id;
        Ok(Self {
            ipc,
            ctx,
            service,
            finished: false,
        })
    }

    pub fn session(&self) -> &ServerSession {
        self.service.session()
    }

    /// Handle one decoded request without touching the transport.
    pub fn handle(&mut self, req: &Request) -> Reply {
        self.service.handle(req)
    }

    /// Serve requests until the last client terminates.
    ///
    /// Undecodable requests and interrupted waits are logged and skipped;
    /// any other receive failure ends the loop with the error.
    pub fn serve(&mut self) -> Result<(), IpcError> {
        loop {
            self.ctx.expect_request();
            if let Err(e) = self.ipc.receive_request(&mut self.ctx) {
                match e.code() {
                    ErrorCode::Interrupted
                    | ErrorCode::InvalidRequest
                    | ErrorCode::UnsupportedIpc => {
                        report("timesrv: receive_request", &e);
                        continue;
                    }
                    _ => return Err(e),
                }
            }

            let req = self.ctx.request()?.clone();
            let reply = self.handle(&req);
            if let Some(resp) = reply.response {
                self.ctx.set_response(resp);
                if let Err(e) = self.ipc.send_response(&mut self.ctx) {
                    report("timesrv: send_response", &e);
                }
            }
            self.ctx.payload = None;

            if reply.control == Control::Shutdown {
                return Ok(());
            }
        }
    }

    /// Release the mailbox segment and semaphore set. Idempotent.
    pub fn cleanup(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        tracing::info!("cleaning up");
        if let Err(e) = self.ipc.finish(&mut self.ctx) {
            report("timesrv: finish", &e);
        }
    }
}

impl Drop for TimeServer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
