// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Communication protocol between the microshell and its servers.
// Fixed-size request/response frames with an explicit big-endian codec, so
// the wire format does not depend on in-memory struct layout.

use std::borrow::Cow;
use std::fmt;

use crate::error::{ErrorCode, IpcError};

/// Size of the free-form data buffer carried by every frame.
pub const BSIZE: usize = 1024;

/// Well-known System V key shared by the time server and its clients.
pub const SERVER_KEY: i32 = 0x666;

/// Well-known TCP port of the snoop server.
pub const SERVER_PORT: u16 = 0x666;

/// Encoded size of a [`Request`]: data buffer plus six 32-bit fields.
pub const REQUEST_SIZE: usize = BSIZE + 6 * 4;

/// Encoded size of a [`Response`]: data buffer plus the server pid.
pub const RESPONSE_SIZE: usize = BSIZE + 4;

/// Size of a shared-memory mailbox: large enough for either frame.
pub const MAILBOX_SIZE: usize = if REQUEST_SIZE > RESPONSE_SIZE {
    REQUEST_SIZE
} else {
    RESPONSE_SIZE
};

/// Commands sent to a server by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Command {
    #[default]
    Idle = 0,
    Time,
    Open,
    Version,
    Ping,
    RShell,
    RSnoop,
    Terminate,
}

impl Command {
    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => Self::Idle,
            1 => Self::Time,
            2 => Self::Open,
            3 => Self::Version,
            4 => Self::Ping,
            5 => Self::RShell,
            6 => Self::RSnoop,
            7 => Self::Terminate,
            _ => return None,
        })
    }

    pub fn tag(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Time => "TIME",
            Self::Open => "OPEN",
            Self::Version => "VERSION",
            Self::Ping => "PING",
            Self::RShell => "RSHELL",
            Self::RSnoop => "RSNOOP",
            Self::Terminate => "TERMINATE",
        };
        f.write_str(s)
    }
}

/// Which flavour of time a `Time` request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum TimeType {
    /// Not a time request (open, terminate, ...).
    #[default]
    None = 0,
    Elapsed,
    TimeOfDay,
}

impl TimeType {
    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => Self::None,
            1 => Self::Elapsed,
            2 => Self::TimeOfDay,
            _ => return None,
        })
    }

    pub fn tag(self) -> u32 {
        self as u32
    }
}

/// Transport selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Method {
    #[default]
    Shmem = 0,
    Sockets,
    NamedPipes,
    MessageQueue,
}

impl Method {
    /// Map a raw selector to a method. Unknown selectors are `UnsupportedIpc`.
    pub fn from_tag(tag: u32) -> Result<Self, IpcError> {
        match tag {
            0 => Ok(Self::Shmem),
            1 => Ok(Self::Sockets),
            2 => Ok(Self::NamedPipes),
            3 => Ok(Self::MessageQueue),
            _ => Err(IpcError::Protocol(ErrorCode::UnsupportedIpc)),
        }
    }

    pub fn tag(self) -> u32 {
        self as u32
    }
}

// ---------------------------------------------------------------------------
// Data buffer helpers
// ---------------------------------------------------------------------------

fn copy_text(dst: &mut [u8; BSIZE], text: &[u8]) {
    dst.fill(0);
    // Keep one trailing NUL so C peers can read the buffer as a string.
    let n = text.len().min(BSIZE - 1);
    dst[..n].copy_from_slice(&text[..n]);
}

fn payload(src: &[u8; BSIZE]) -> &[u8] {
    let end = src.iter().position(|&b| b == 0).unwrap_or(BSIZE);
    &src[..end]
}

fn read_text(src: &[u8; BSIZE]) -> Cow<'_, str> {
    String::from_utf8_lossy(payload(src))
}

fn put_u32(out: &mut [u8], at: &mut usize, v: u32) {
    out[*at..*at + 4].copy_from_slice(&v.to_be_bytes());
    *at += 4;
}

fn get_u32(buf: &[u8], at: &mut usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[*at..*at + 4]);
    *at += 4;
    u32::from_be_bytes(b)
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Client request frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Request {
    pub data: [u8; BSIZE],
    pub method: Method,
    /// Pid of the requesting client.
    pub client_pid: i32,
    /// Id of the client's private reply segment.
    pub resource_id: i32,
    /// Id of the client's semaphore set guarding its reply segment.
    pub sem_id: i32,
    pub command: Command,
    pub time_type: TimeType,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            data: [0; BSIZE],
            method: Method::default(),
            client_pid: 0,
            resource_id: 0,
            sem_id: 0,
            command: Command::default(),
            time_type: TimeType::default(),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("data", &self.text())
            .field("method", &self.method)
            .field("client_pid", &self.client_pid)
            .field("resource_id", &self.resource_id)
            .field("sem_id", &self.sem_id)
            .field("command", &self.command)
            .field("time_type", &self.time_type)
            .finish()
    }
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            ..Self::default()
        }
    }

    /// Replace the data buffer, truncating to `BSIZE - 1` bytes.
    pub fn set_text(&mut self, text: &str) {
        copy_text(&mut self.data, text.as_bytes());
    }

    /// Data buffer up to the first NUL.
    pub fn text(&self) -> Cow<'_, str> {
        read_text(&self.data)
    }

    pub fn encode(&self) -> [u8; REQUEST_SIZE] {
        let mut out = [0u8; REQUEST_SIZE];
        out[..BSIZE].copy_from_slice(&self.data);
        let mut at = BSIZE;
        put_u32(&mut out, &mut at, self.method.tag());
        put_u32(&mut out, &mut at, self.client_pid as u32);
        put_u32(&mut out, &mut at, self.resource_id as u32);
        put_u32(&mut out, &mut at, self.sem_id as u32);
        put_u32(&mut out, &mut at, self.command.tag());
        put_u32(&mut out, &mut at, self.time_type.tag());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, IpcError> {
        if buf.len() < REQUEST_SIZE {
            return Err(IpcError::Protocol(ErrorCode::MemoryError));
        }
        let mut data = [0u8; BSIZE];
        data.copy_from_slice(&buf[..BSIZE]);
        let mut at = BSIZE;
        let method = Method::from_tag(get_u32(buf, &mut at))?;
        let client_pid = get_u32(buf, &mut at) as i32;
        let resource_id = get_u32(buf, &mut at) as i32;
        let sem_id = get_u32(buf, &mut at) as i32;
        let command = Command::from_tag(get_u32(buf, &mut at))
            .ok_or(IpcError::Protocol(ErrorCode::InvalidRequest))?;
        let time_type = TimeType::from_tag(get_u32(buf, &mut at))
            .ok_or(IpcError::Protocol(ErrorCode::InvalidRequest))?;
        Ok(Self {
            data,
            method,
            client_pid,
            resource_id,
            sem_id,
            command,
            time_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Server response frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    pub data: [u8; BSIZE],
    pub srv_pid: i32,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            data: [0; BSIZE],
            srv_pid: 0,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("data", &self.text())
            .field("srv_pid", &self.srv_pid)
            .finish()
    }
}

impl Response {
    /// A response carrying `text`, stamped with the given server pid.
    pub fn with_text(srv_pid: i32, text: &str) -> Self {
        let mut r = Self {
            srv_pid,
            ..Self::default()
        };
        r.set_text(text);
        r
    }

    /// A response carrying raw bytes (pty output), truncated to `BSIZE - 1`.
    pub fn with_bytes(srv_pid: i32, bytes: &[u8]) -> Self {
        let mut r = Self {
            srv_pid,
            ..Self::default()
        };
        copy_text(&mut r.data, bytes);
        r
    }

    pub fn set_text(&mut self, text: &str) {
        copy_text(&mut self.data, text.as_bytes());
    }

    pub fn text(&self) -> Cow<'_, str> {
        read_text(&self.data)
    }

    /// Raw data bytes up to the first NUL. Pty output may split a UTF-8
    /// sequence across frames, so relays copy these instead of `text()`.
    pub fn bytes(&self) -> &[u8] {
        payload(&self.data)
    }

    pub fn encode(&self) -> [u8; RESPONSE_SIZE] {
        let mut out = [0u8; RESPONSE_SIZE];
        out[..BSIZE].copy_from_slice(&self.data);
        let mut at = BSIZE;
        put_u32(&mut out, &mut at, self.srv_pid as u32);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, IpcError> {
        if buf.len() < RESPONSE_SIZE {
            return Err(IpcError::Protocol(ErrorCode::MemoryError));
        }
        let mut data = [0u8; BSIZE];
        data.copy_from_slice(&buf[..BSIZE]);
        let mut at = BSIZE;
        let srv_pid = get_u32(buf, &mut at) as i32;
        Ok(Self { data, srv_pid })
    }
}
