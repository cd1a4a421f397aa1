// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// IPC dispatcher: selects a transport once and validates the context
// before every operation.

use std::net::TcpStream;
use std::os::fd::RawFd;

use crate::error::{ErrorCode, IpcError};
use crate::protocol::Method;
use crate::transport::{
    MsgQueueTransport, NamedPipeTransport, Op, ShmemTransport, SocketTransport, Transport,
    TransportContext,
};

/// Front end over a boxed [`Transport`].
///
/// Checks that the context was built for the same method, that its role
/// may perform the operation, and that the payload slot holds the right
/// kind of frame. The outcome of every operation is recorded in
/// `ctx.last_error`.
pub struct Ipc {
    transport: Box<dyn Transport>,
}

impl Ipc {
    pub fn new(method: Method) -> Self {
        let transport: Box<dyn Transport> = match method {
            Method::Shmem => Box::new(ShmemTransport::new()),
            Method::Sockets => Box::new(SocketTransport::new()),
            Method::NamedPipes => Box::new(NamedPipeTransport),
            Method::MessageQueue => Box::new(MsgQueueTransport),
        };
        Self { transport }
    }

    /// Select a transport by raw selector.
    pub fn from_tag(tag: u32) -> Result<Self, IpcError> {
        Method::from_tag(tag).map(Self::new)
    }

    /// Wrap an already constructed transport.
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn method(&self) -> Method {
        self.transport.method()
    }

    fn check_method(&self, ctx: &TransportContext) -> Result<(), IpcError> {
        if ctx.method != self.transport.method() {
            return Err(ErrorCode::InvalidIpcPacket.into());
        }
        Ok(())
    }

    fn check(&self, ctx: &TransportContext, op: Op) -> Result<(), IpcError> {
        self.check_method(ctx)?;
        op.check_role(ctx.role)?;
        if !ctx.payload_fits(op) {
            return Err(op.payload_error().into());
        }
        Ok(())
    }

    fn record<T>(ctx: &mut TransportContext, result: Result<T, IpcError>) -> Result<T, IpcError> {
        ctx.last_error = match &result {
            Ok(_) => ErrorCode::Ok,
            Err(e) => e.code(),
        };
        result
    }

    pub fn init(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        let result = match self.check_method(ctx) {
            Ok(()) => self.transport.init(ctx),
            Err(e) => Err(e),
        };
        Self::record(ctx, result)
    }

    pub fn send_request(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        let result = match self.check(ctx, Op::SendRequest) {
            Ok(()) => self.transport.send_request(ctx),
            Err(e) => Err(e),
        };
        Self::record(ctx, result)
    }

    pub fn receive_request(&mut self, ctx: &mut TransportContext) -> Result<Option<RawFd>, IpcError> {
        let result = match self.check(ctx, Op::ReceiveRequest) {
            Ok(()) => self.transport.receive_request(ctx),
            Err(e) => Err(e),
        };
        Self::record(ctx, result)
    }

    pub fn send_response(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        let result = match self.check(ctx, Op::SendResponse) {
            Ok(()) => self.transport.send_response(ctx),
            Err(e) => Err(e),
        };
        Self::record(ctx, result)
    }

    pub fn receive_response(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        let result = match self.check(ctx, Op::ReceiveResponse) {
            Ok(()) => self.transport.receive_response(ctx),
            Err(e) => Err(e),
        };
        Self::record(ctx, result)
    }

    pub fn finish(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        let result = match self.check_method(ctx) {
            Ok(()) => self.transport.finish(ctx),
            Err(e) => Err(e),
        };
        Self::record(ctx, result)
    }

    /// Take ownership of the transport's current connection (sockets only).
    pub fn take_connection(&mut self) -> Option<TcpStream> {
        self.transport.take_connection()
    }
}

impl std::fmt::Debug for Ipc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipc").field("method", &self.method()).finish()
    }
}
