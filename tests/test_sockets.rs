// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Socket transport and snoop server accept-loop tests on an ephemeral port.

use std::io::Write;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use msh::error::ErrorCode;
use msh::protocol::{Command, Method, Request};
use msh::server::snoopsrv::{SnoopSettings, SNOOPSRV_VERSION};
use msh::server::SnoopServer;
use msh::{Ipc, TransportContext};

fn start_server() -> SnoopServer {
    SnoopServer::start(0, 4, SnoopSettings::default()).expect("listen")
}

fn client(port: u16, timeout: Option<Duration>) -> (Ipc, TransportContext) {
    let mut ipc = Ipc::new(Method::Sockets);
    let mut ctx = TransportContext::client(Method::Sockets)
        .with_host("127.0.0.1")
        .with_port(port)
        .with_timeout(timeout);
    ipc.init(&mut ctx).expect("connect");
    (ipc, ctx)
}

#[test]
fn ephemeral_port_is_reported() {
    let server = start_server();
    assert_ne!(server.port(), 0);
}

#[test]
fn version_request_is_answered_then_closed() {
    let mut server = start_server();
    let port = server.port();
    let daemon = thread::spawn(move || server.serve_one().is_ok());

    let (mut ipc, mut ctx) = client(port, Some(Duration::from_secs(5)));
    ctx.set_request(Request::new(Command::Version));
    ipc.send_request(&mut ctx).unwrap();
    ctx.expect_response();
    ipc.receive_response(&mut ctx).unwrap();
    let resp = ctx.response().unwrap();
    assert_eq!(resp.text(), SNOOPSRV_VERSION);
    assert_eq!(resp.srv_pid, std::process::id() as i32);

    assert!(daemon.join().unwrap());
    ctx.expect_response();
    assert_eq!(ipc.receive_response(&mut ctx).unwrap_err().code(), ErrorCode::Disconnected);
    assert_eq!(ctx.last_error, ErrorCode::Disconnected);
    ipc.finish(&mut ctx).unwrap();
}

#[test]
fn terminate_gets_no_reply() {
    let mut server = start_server();
    let port = server.port();
    let daemon = thread::spawn(move || server.serve_one().is_ok());

    let (mut ipc, mut ctx) = client(port, Some(Duration::from_secs(5)));
    ctx.set_request(Request::new(Command::Terminate));
    ipc.send_request(&mut ctx).unwrap();
    assert!(daemon.join().unwrap());

    ctx.expect_response();
    assert_eq!(ipc.receive_response(&mut ctx).unwrap_err().code(), ErrorCode::Disconnected);
}

#[test]
fn peer_closing_mid_frame_does_not_stop_the_daemon() {
    let mut server = start_server();
    let port = server.port();
    let daemon = thread::spawn(move || {
        let first = server.serve_one().is_ok();
        let second = server.serve_one().is_ok();
        (first, second)
    });

    {
        let mut raw = TcpStream::connect(("127.0.0.1", port)).unwrap();
        raw.write_all(&[0u8; 10]).unwrap();
    }

    let (mut ipc, mut ctx) = client(port, Some(Duration::from_secs(5)));
    ctx.set_request(Request::new(Command::Version));
    ipc.send_request(&mut ctx).unwrap();
    ctx.expect_response();
    ipc.receive_response(&mut ctx).unwrap();
    assert_eq!(ctx.response().unwrap().text(), SNOOPSRV_VERSION);

    assert_eq!(daemon.join().unwrap(), (true, true));
}

#[test]
fn quiet_stream_times_out() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let holder = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_millis(400));
        drop(stream);
    });

    let (mut ipc, mut ctx) = client(port, Some(Duration::from_millis(100)));
    ctx.expect_response();
    assert_eq!(ipc.receive_response(&mut ctx).unwrap_err().code(), ErrorCode::TimedOut);
    holder.join().unwrap();
}

#[test]
fn client_needs_a_host() {
    let mut ipc = Ipc::new(Method::Sockets);
    let mut ctx = TransportContext::client(Method::Sockets);
    assert_eq!(ipc.init(&mut ctx).unwrap_err().code(), ErrorCode::InvalidIpcPacket);
}

#[test]
fn connection_refused_is_a_system_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut ipc = Ipc::new(Method::Sockets);
    let mut ctx = TransportContext::client(Method::Sockets)
        .with_host("127.0.0.1")
        .with_port(port);
    assert_eq!(ipc.init(&mut ctx).unwrap_err().code(), ErrorCode::SystemError);
}
