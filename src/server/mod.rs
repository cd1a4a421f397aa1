// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// State and process plumbing shared by the time server and the snoop server.

use std::io;

pub mod snoopsrv;
pub mod timesrv;

pub use snoopsrv::SnoopServer;
pub use timesrv::TimeServer;

/// What kind of server process this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    TimeServer,
    /// The snoop server's accept loop.
    SnoopDaemon,
    /// A forked per-connection snoop master.
    SnoopChild,
}

/// Registration bookkeeping of a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSession {
    /// No client has registered yet.
    pub just_started: bool,
    pub ref_count: u32,
    pub resource_id: i32,
    pub sem_id: i32,
    pub role: ServerRole,
}

impl ServerSession {
    pub fn new(role: ServerRole) -> Self {
        Self {
            just_started: true,
            ref_count: 0,
            resource_id: -1,
            sem_id: -1,
            role,
        }
    }

    /// A client registered (OPEN).
    pub fn register(&mut self) {
        self.ref_count += 1;
        self.just_started = false;
    }

    /// A client left (TERMINATE). Returns `true` when the server should shut
    /// down: at least one client registered and none remain.
    pub fn terminate(&mut self) -> bool {
        self.ref_count = self.ref_count.saturating_sub(1);
        self.should_shut_down()
    }

    pub fn should_shut_down(&self) -> bool {
        !self.just_started && self.ref_count == 0
    }
}

/// Detach from the controlling terminal: fork, let the parent exit, and
/// start a new session in the child.
pub fn daemonize() -> io::Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => {
            if unsafe { libc::setsid() } < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
        _ => std::process::exit(0),
    }
}

/// Current process id as carried in response frames.
pub fn pid() -> i32 {
    std::process::id() as i32
}
