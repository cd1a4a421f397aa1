// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Transport capability interface and the per-session context passed to
// every operation.

use std::net::TcpStream;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{ErrorCode, IpcError};
use crate::protocol::{Method, Request, Response, SERVER_KEY, SERVER_PORT};

pub mod msgq;
pub mod npipes;
pub mod shmem;
pub mod sockets;

pub use msgq::MsgQueueTransport;
pub use npipes::NamedPipeTransport;
pub use shmem::ShmemTransport;
pub use sockets::SocketTransport;

/// Default listen backlog of the socket server.
pub const BACKLOG: i32 = 10;

/// Default number of `IPC_PRIVATE` attempts when allocating a reply segment.
pub const SHM_LOOKUP_THRESHOLD: usize = 50;

/// Which end of the conversation a context belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// The frame slot of a context: a request or a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

/// The four directional operations, for role checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    SendRequest,
    ReceiveRequest,
    SendResponse,
    ReceiveResponse,
}

impl Op {
    /// Clients send requests and receive responses; servers do the reverse.
    pub fn check_role(self, role: Role) -> Result<(), IpcError> {
        let violation = match (self, role) {
            (Self::SendRequest, Role::Server) => ErrorCode::ErrSrvRequest,
            (Self::ReceiveResponse, Role::Server) => ErrorCode::ErrSrvResponse,
            (Self::SendResponse, Role::Client) => ErrorCode::ErrCliResponse,
            (Self::ReceiveRequest, Role::Client) => ErrorCode::ErrCliRequest,
            _ => return Ok(()),
        };
        Err(violation.into())
    }

    /// Code reported when the payload slot is missing or of the wrong kind.
    pub fn payload_error(self) -> ErrorCode {
        match self {
            Self::SendRequest | Self::ReceiveRequest => ErrorCode::InvalidRequest,
            Self::SendResponse | Self::ReceiveResponse => ErrorCode::InvalidResponse,
        }
    }
}

/// Per-session transport context.
///
/// Owned by the side that created it. Transport-private state (attached
/// segments, listener, current connection) lives in the transport itself.
#[derive(Debug, Clone)]
pub struct TransportContext {
    pub method: Method,
    pub role: Role,
    /// Shared memory id of this side's mailbox, or the socket descriptor.
    pub resource_id: i32,
    /// Semaphore set guarding `resource_id` (shared memory only).
    pub sem_id: i32,
    pub payload: Option<Payload>,
    /// Peer address used by the socket client.
    pub host: Option<String>,
    /// Well-known System V key.
    pub key: i32,
    /// Well-known TCP port.
    pub port: u16,
    pub backlog: i32,
    pub shm_lookup_threshold: usize,
    /// Receive timeout; `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    /// Result code of the last dispatched operation.
    pub last_error: ErrorCode,
}

impl TransportContext {
    pub fn new(method: Method, role: Role) -> Self {
        Self {
            method,
            role,
            resource_id: -1,
            sem_id: -1,
            payload: None,
            host: None,
            key: SERVER_KEY,
            port: SERVER_PORT,
            backlog: BACKLOG,
            shm_lookup_threshold: SHM_LOOKUP_THRESHOLD,
            timeout: None,
            last_error: ErrorCode::Ok,
        }
    }

    pub fn server(method: Method) -> Self {
        Self::new(method, Role::Server)
    }

    pub fn client(method: Method) -> Self {
        Self::new(method, Role::Client)
    }

    pub fn with_key(mut self, key: i32) -> Self {
        self.key = key;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load `req` into the payload slot.
    pub fn set_request(&mut self, req: Request) {
        self.payload = Some(Payload::Request(req));
    }

    /// Load `resp` into the payload slot.
    pub fn set_response(&mut self, resp: Response) {
        self.payload = Some(Payload::Response(resp));
    }

    /// Prepare an empty request slot for `receive_request`.
    pub fn expect_request(&mut self) {
        self.set_request(Request::default());
    }

    /// Prepare an empty response slot for `receive_response`.
    pub fn expect_response(&mut self) {
        self.set_response(Response::default());
    }

    pub fn request(&self) -> Result<&Request, IpcError> {
        match &self.payload {
            Some(Payload::Request(r)) => Ok(r),
            _ => Err(ErrorCode::InvalidRequest.into()),
        }
    }

    pub fn request_mut(&mut self) -> Result<&mut Request, IpcError> {
        match &mut self.payload {
            Some(Payload::Request(r)) => Ok(r),
            _ => Err(ErrorCode::InvalidRequest.into()),
        }
    }

    pub fn response(&self) -> Result<&Response, IpcError> {
        match &self.payload {
            Some(Payload::Response(r)) => Ok(r),
            _ => Err(ErrorCode::InvalidResponse.into()),
        }
    }

    pub fn response_mut(&mut self) -> Result<&mut Response, IpcError> {
        match &mut self.payload {
            Some(Payload::Response(r)) => Ok(r),
            _ => Err(ErrorCode::InvalidResponse.into()),
        }
    }

    /// Whether the payload slot matches what `op` needs.
    pub fn payload_fits(&self, op: Op) -> bool {
        matches!(
            (op, &self.payload),
            (Op::SendRequest | Op::ReceiveRequest, Some(Payload::Request(_)))
                | (Op::SendResponse | Op::ReceiveResponse, Some(Payload::Response(_)))
        )
    }
}

/// A request/response transport.
///
/// Every operation checks the context role first, then the transport's
/// initialised state (`InvalidIpcPacket` before `init`). Receive operations
/// fill the context's payload slot.
pub trait Transport: Send {
    fn method(&self) -> Method;

    fn init(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError>;

    fn send_request(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError>;

    /// Block for the next request. Connection-oriented transports return the
    /// descriptor the request arrived on.
    fn receive_request(&mut self, ctx: &mut TransportContext) -> Result<Option<RawFd>, IpcError>;

    fn send_response(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError>;

    fn receive_response(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError>;

    /// Release everything `init` acquired.
    fn finish(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError>;

    /// Hand the current connection to the caller, if the transport has one.
    fn take_connection(&mut self) -> Option<TcpStream> {
        None
    }
}
