// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// TCP stream transport. Frames travel as their fixed-size encodings.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use crate::error::{ErrorCode, IpcError};
use crate::protocol::{Method, Request, Response, REQUEST_SIZE, RESPONSE_SIZE};

use super::{Op, Role, Transport, TransportContext};

/// Read exactly `buf.len()` bytes. Unlike `read_exact`, an interrupted read is
/// reported instead of restarted, so a signal can break a blocked receive.
pub fn read_frame(stream: &mut impl Read, buf: &mut [u8]) -> Result<(), IpcError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(IpcError::os("recv", io::Error::from(io::ErrorKind::UnexpectedEof)));
            }
            Ok(n) => filled += n,
            Err(e) => return Err(IpcError::os("recv", e)),
        }
    }
    Ok(())
}

/// Write a whole frame.
pub fn write_frame(stream: &mut impl Write, frame: &[u8]) -> Result<(), IpcError> {
    stream.write_all(frame).map_err(|e| IpcError::os("send", e))
}

fn listen(port: u16, backlog: i32) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket)
}

fn connect(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let mut last = io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}"));
    for addr in (host, port).to_socket_addrs()? {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
        match socket.connect(&addr.into()) {
            Ok(()) => {
                let stream = TcpStream::from(socket);
                stream.set_read_timeout(timeout)?;
                return Ok(stream);
            }
            Err(e) => last = e,
        }
    }
    Err(last)
}

#[derive(Debug, Default)]
pub struct SocketTransport {
    /// Server only.
    listener: Option<Socket>,
    /// Client: the connection to the server. Server: the connection the
    /// last request arrived on.
    conn: Option<TcpStream>,
}

impl SocketTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for SocketTransport {
    fn method(&self) -> Method {
        Method::Sockets
    }

    fn init(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        match ctx.role {
            Role::Server => {
                let listener = listen(ctx.port, ctx.backlog).map_err(|e| IpcError::os("bind", e))?;
                ctx.resource_id = listener.as_raw_fd();
                // Port 0 binds an ephemeral port; report the real one.
                if let Some(addr) = listener.local_addr().ok().and_then(|a| a.as_socket()) {
                    ctx.port = addr.port();
                }
                tracing::info!(port = ctx.port, fd = ctx.resource_id, "listening");
                self.listener = Some(listener);
            }
            Role::Client => {
                let host = ctx
                    .host
                    .clone()
                    .ok_or(IpcError::Protocol(ErrorCode::InvalidIpcPacket))?;
                let stream = connect(&host, ctx.port, ctx.timeout)
                    .map_err(|e| IpcError::os("connect", e))?;
                ctx.resource_id = stream.as_raw_fd();
                tracing::info!(%host, port = ctx.port, "connected");
                self.conn = Some(stream);
            }
        }
        Ok(())
    }

    fn send_request(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        Op::SendRequest.check_role(ctx.role)?;
        let Some(conn) = self.conn.as_mut() else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };
        let req = ctx.request_mut()?;
        req.method = Method::Sockets;
        req.client_pid = std::process::id() as i32;
        write_frame(conn, &req.encode())
    }

    fn receive_request(&mut self, ctx: &mut TransportContext) -> Result<Option<RawFd>, IpcError> {
        Op::ReceiveRequest.check_role(ctx.role)?;
        let Some(listener) = &self.listener else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };
        // A new request always arrives on a new connection.
        self.conn = None;
        let (socket, peer) = listener.accept().map_err(|e| IpcError::os("accept", e))?;
        let mut stream = TcpStream::from(socket);
        let mut frame = [0u8; REQUEST_SIZE];
        read_frame(&mut stream, &mut frame)?;
        let req = Request::decode(&frame)?;
        let fd = stream.as_raw_fd();
        tracing::debug!(
            peer = ?peer.as_socket(),
            pid = req.client_pid,
            command = %req.command,
            fd,
            "request received"
        );
        ctx.set_request(req);
        self.conn = Some(stream);
        Ok(Some(fd))
    }

    fn send_response(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        Op::SendResponse.check_role(ctx.role)?;
        let Some(conn) = self.conn.as_mut() else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };
        write_frame(conn, &ctx.response()?.encode())
    }

    fn receive_response(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        Op::ReceiveResponse.check_role(ctx.role)?;
        let Some(conn) = self.conn.as_mut() else {
            return Err(ErrorCode::InvalidIpcPacket.into());
        };
        conn.set_read_timeout(ctx.timeout)
            .map_err(|e| IpcError::os("setsockopt", e))?;
        let mut frame = [0u8; RESPONSE_SIZE];
        read_frame(conn, &mut frame)?;
        ctx.set_response(Response::decode(&frame)?);
        Ok(())
    }

    fn finish(&mut self, ctx: &mut TransportContext) -> Result<(), IpcError> {
        self.listener = None;
        self.conn = None;
        ctx.resource_id = -1;
        Ok(())
    }

    fn take_connection(&mut self) -> Option<TcpStream> {
        self.conn.take()
    }
}
