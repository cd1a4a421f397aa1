// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Microshell client, time server and snoop server talking a fixed-size
// request/response protocol over System V shared memory or TCP sockets.

pub mod error;
pub use error::{ErrorCode, IpcError};

pub mod protocol;
pub use protocol::{Command, Method, Request, Response, TimeType};

mod platform;

pub mod sem;
pub use sem::{SemSet, SemStatus};

pub mod shm;
pub use shm::{ShmOpenMode, ShmSegment};

pub mod mailbox;
pub use mailbox::{Mailbox, ReadAccess, WriteAccess};

pub mod transport;
pub use transport::{Payload, Role, Transport, TransportContext};

pub mod ipc;
pub use ipc::Ipc;

pub mod redirect;

pub mod shell;
pub mod server;
pub mod tty;

pub mod config;
pub use config::Config;

pub mod logging;
