// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Dispatcher tests: transport selection, role and payload validation, and a
// full request/response exchange over the shared memory transport.

use std::sync::atomic::{AtomicI32, Ordering};

use msh::error::ErrorCode;
use msh::protocol::{Command, Method, Request, Response, TimeType};
use msh::sem::{SemSet, READER, WRITER};
use msh::{Ipc, TransportContext};

static COUNTER: AtomicI32 = AtomicI32::new(0);

fn unique_key() -> i32 {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    0x5C00_0000 | ((std::process::id() as i32 & 0xFFFF) << 8) | n
}

fn assert_idle(sem_id: i32) {
    let sems = SemSet::from_id(sem_id);
    assert_eq!(sems.value(WRITER).unwrap(), 1, "writer of set {sem_id}");
    assert_eq!(sems.value(READER).unwrap(), 0, "reader of set {sem_id}");
}

#[test]
fn unknown_selector_is_unsupported() {
    assert_eq!(Ipc::from_tag(9).unwrap_err().code(), ErrorCode::UnsupportedIpc);
    assert_eq!(Ipc::from_tag(1).unwrap().method(), Method::Sockets);
}

#[test]
fn stub_transports_are_unimplemented() {
    for method in [Method::NamedPipes, Method::MessageQueue] {
        let mut ipc = Ipc::new(method);
        let mut ctx = TransportContext::client(method);
        assert_eq!(ipc.init(&mut ctx).unwrap_err().code(), ErrorCode::Unimplemented);
        assert_eq!(ctx.last_error, ErrorCode::Unimplemented);

        ctx.set_request(Request::new(Command::Version));
        assert_eq!(ipc.send_request(&mut ctx).unwrap_err().code(), ErrorCode::Unimplemented);
        ctx.expect_response();
        assert_eq!(ipc.receive_response(&mut ctx).unwrap_err().code(), ErrorCode::Unimplemented);
        assert_eq!(ipc.finish(&mut ctx).unwrap_err().code(), ErrorCode::Unimplemented);
    }
}

#[test]
fn roles_are_enforced_before_the_transport_runs() {
    let mut ipc = Ipc::new(Method::Shmem);

    let mut client = TransportContext::client(Method::Shmem);
    client.expect_request();
    assert_eq!(ipc.receive_request(&mut client).unwrap_err().code(), ErrorCode::ErrCliRequest);
    assert_eq!(client.last_error, ErrorCode::ErrCliRequest);
    client.set_response(Response::default());
    assert_eq!(ipc.send_response(&mut client).unwrap_err().code(), ErrorCode::ErrCliResponse);

    let mut server = TransportContext::server(Method::Shmem);
    server.set_request(Request::new(Command::Open));
    assert_eq!(ipc.send_request(&mut server).unwrap_err().code(), ErrorCode::ErrSrvRequest);
    server.expect_response();
    assert_eq!(ipc.receive_response(&mut server).unwrap_err().code(), ErrorCode::ErrSrvResponse);
}

#[test]
fn context_of_another_method_is_rejected() {
    let mut ipc = Ipc::new(Method::Shmem);
    let mut ctx = TransportContext::client(Method::Sockets);
    assert_eq!(ipc.init(&mut ctx).unwrap_err().code(), ErrorCode::InvalidIpcPacket);
    ctx.set_request(Request::new(Command::Version));
    assert_eq!(ipc.send_request(&mut ctx).unwrap_err().code(), ErrorCode::InvalidIpcPacket);
}

#[test]
fn missing_or_mismatched_payload_is_rejected() {
    let mut ipc = Ipc::new(Method::Shmem);
    let mut client = TransportContext::client(Method::Shmem);
    assert_eq!(ipc.send_request(&mut client).unwrap_err().code(), ErrorCode::InvalidRequest);
    client.expect_response();
    assert_eq!(ipc.send_request(&mut client).unwrap_err().code(), ErrorCode::InvalidRequest);

    let mut server = TransportContext::server(Method::Shmem);
    server.expect_request();
    assert_eq!(ipc.send_response(&mut server).unwrap_err().code(), ErrorCode::InvalidResponse);
}

#[test]
fn operations_before_init_are_invalid() {
    let mut ipc = Ipc::new(Method::Shmem);
    let mut ctx = TransportContext::client(Method::Shmem);
    ctx.set_request(Request::new(Command::Version));
    assert_eq!(ipc.send_request(&mut ctx).unwrap_err().code(), ErrorCode::InvalidIpcPacket);
}

#[test]
fn client_without_server_fails_to_init() {
    let mut ipc = Ipc::new(Method::Shmem);
    let mut ctx = TransportContext::client(Method::Shmem).with_key(unique_key());
    let err = ipc.init(&mut ctx).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SystemError);
    assert_eq!(ctx.last_error, ErrorCode::SystemError);
}

#[test]
fn shared_memory_exchange_round_trips() {
    let key = unique_key();
    let mut server_ipc = Ipc::new(Method::Shmem);
    let mut server = TransportContext::server(Method::Shmem).with_key(key);
    server_ipc.init(&mut server).expect("server init");

    let mut client_ipc = Ipc::new(Method::Shmem);
    let mut client = TransportContext::client(Method::Shmem).with_key(key);
    client_ipc.init(&mut client).expect("client init");
    assert_ne!(client.resource_id, server.resource_id);

    let mut req = Request::new(Command::Time);
    req.time_type = TimeType::TimeOfDay;
    req.set_text("what time is it");
    client.set_request(req);
    client_ipc.send_request(&mut client).unwrap();
    assert_eq!(client.last_error, ErrorCode::Ok);

    server.expect_request();
    assert_eq!(server_ipc.receive_request(&mut server).unwrap(), None);
    let got = server.request().unwrap().clone();
    assert_eq!(got.command, Command::Time);
    assert_eq!(got.time_type, TimeType::TimeOfDay);
    assert_eq!(got.text(), "what time is it");
    assert_eq!(got.client_pid, std::process::id() as i32);
    assert_eq!(got.resource_id, client.resource_id);
    assert_eq!(got.sem_id, client.sem_id);
    assert_idle(server.sem_id);

    server.set_response(Response::with_text(4242, "noon\n"));
    server_ipc.send_response(&mut server).unwrap();

    client.expect_response();
    client_ipc.receive_response(&mut client).unwrap();
    let resp = client.response().unwrap();
    assert_eq!(resp.srv_pid, 4242);
    assert_eq!(resp.text(), "noon\n");
    assert_idle(client.sem_id);

    let client_sems = client.sem_id;
    client_ipc.finish(&mut client).unwrap();
    assert!(SemSet::from_id(client_sems).value(WRITER).is_err());
    server_ipc.finish(&mut server).unwrap();
}
