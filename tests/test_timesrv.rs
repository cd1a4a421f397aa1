// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Time server end-to-end tests over the shared memory transport. Each test
// runs the server loop on its own thread with a private System V key.

use std::sync::atomic::{AtomicI32, Ordering};
use std::thread::{self, JoinHandle};

use msh::config::Config;
use msh::protocol::{Command, Method, Request, Response, TimeType};
use msh::server::timesrv::TIMESRV_VERSION;
use msh::server::{ServerSession, TimeServer};
use msh::shell::Microshell;
use msh::{Ipc, TransportContext};
use serial_test::serial;

static COUNTER: AtomicI32 = AtomicI32::new(0);

fn unique_key() -> i32 {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    0x5B00_0000 | ((std::process::id() as i32 & 0xFFFF) << 8) | n
}

type ServerThread = JoinHandle<(bool, ServerSession)>;

fn spawn_server(key: i32) -> ServerThread {
    let mut server = TimeServer::start(key).expect("server start");
    thread::spawn(move || {
        let ok = server.serve().is_ok();
        let session = server.session().clone();
        server.cleanup();
        (ok, session)
    })
}

struct Client {
    ipc: Ipc,
    ctx: TransportContext,
}

impl Client {
    fn connect(key: i32) -> Self {
        let mut ipc = Ipc::new(Method::Shmem);
        let mut ctx = TransportContext::client(Method::Shmem).with_key(key);
        ipc.init(&mut ctx).expect("client init");
        Self { ipc, ctx }
    }

    fn ask(&mut self, command: Command, time_type: TimeType) -> Response {
        let mut req = Request::new(command);
        req.time_type = time_type;
        self.ctx.set_request(req);
        self.ipc.send_request(&mut self.ctx).expect("send");
        self.ctx.expect_response();
        self.ipc.receive_response(&mut self.ctx).expect("receive");
        self.ctx.response().unwrap().clone()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.ipc.finish(&mut self.ctx);
    }
}

#[test]
fn register_query_and_terminate() {
    let key = unique_key();
    let server = spawn_server(key);
    let mut client = Client::connect(key);
    let me = std::process::id() as i32;

    let resp = client.ask(Command::Open, TimeType::None);
    assert_eq!(resp.text(), format!("Registered client # 1 with PID={me}\n"));
    assert_eq!(resp.srv_pid, me);

    let resp = client.ask(Command::Version, TimeType::None);
    assert_eq!(resp.text(), TIMESRV_VERSION);

    let resp = client.ask(Command::Time, TimeType::Elapsed);
    assert!(resp.text().starts_with("Elapsed Time: ["), "{}", resp.text());
    assert!(resp.text().contains("Clocks per second: ["));

    let resp = client.ask(Command::Time, TimeType::TimeOfDay);
    let tod = resp.text();
    assert!(tod.ends_with('\n'));
    assert_eq!(tod.trim_end().split_whitespace().count(), 5, "{tod}");

    let resp = client.ask(Command::Ping, TimeType::Elapsed);
    assert!(resp.text().starts_with("PING reply: Elapsed Time: ["));

    let resp = client.ask(Command::Idle, TimeType::None);
    assert_eq!(resp.text(), "Idle");

    let resp = client.ask(Command::Terminate, TimeType::None);
    assert_eq!(resp.text(), "ACK");

    let (ok, session) = server.join().unwrap();
    assert!(ok);
    assert_eq!(session.ref_count, 0);
    assert!(!session.just_started);
}

#[test]
fn time_request_without_type_is_answered() {
    let key = unique_key();
    let server = spawn_server(key);
    let mut client = Client::connect(key);

    client.ask(Command::Open, TimeType::None);
    let resp = client.ask(Command::Time, TimeType::None);
    assert!(resp.text().contains("Request for NO time"));

    assert_eq!(client.ask(Command::Terminate, TimeType::None).text(), "ACK");
    assert!(server.join().unwrap().0);
}

#[test]
fn server_outlives_all_but_the_last_client() {
    let key = unique_key();
    let server = spawn_server(key);
    let mut first = Client::connect(key);
    let mut second = Client::connect(key);

    assert!(first.ask(Command::Open, TimeType::None).text().starts_with("Registered client # 1"));
    assert!(second.ask(Command::Open, TimeType::None).text().starts_with("Registered client # 2"));

    assert_eq!(first.ask(Command::Terminate, TimeType::None).text(), "ACK");
    drop(first);
    assert!(!server.is_finished());

    // The server still answers the remaining client.
    let resp = second.ask(Command::Version, TimeType::None);
    assert_eq!(resp.text(), TIMESRV_VERSION);

    assert_eq!(second.ask(Command::Terminate, TimeType::None).text(), "ACK");
    let (ok, session) = server.join().unwrap();
    assert!(ok);
    assert_eq!(session.ref_count, 0);
}

#[test]
#[serial]
fn microshell_session_against_a_live_server() {
    let key = unique_key();
    let server = spawn_server(key);

    let cfg = Config {
        key,
        ..Config::default()
    };
    let mut shell = Microshell::new(cfg);
    assert!(shell.server_version().is_none());

    assert!(shell.connect_time_server());
    assert!(shell.session().connected);
    assert!(!shell.connect_time_server());

    assert_eq!(shell.server_version().unwrap().text(), TIMESRV_VERSION);
    assert!(shell.time_of_day().is_some());
    assert!(shell.elapsed_time().is_some());
    assert!(shell.ping().is_some());
    assert_eq!(shell.session().ping_count, 1);

    shell.handle_line("quit");
    shell.disconnect();
    assert!(!shell.session().connected);

    let (ok, session) = server.join().unwrap();
    assert!(ok);
    assert_eq!(session.ref_count, 0);
}

#[test]
fn microshell_without_server_stays_local() {
    let cfg = Config {
        key: unique_key(),
        ..Config::default()
    };
    let mut shell = Microshell::new(cfg);
    assert!(!shell.connect_time_server());
    assert!(!shell.session().connected);
    assert!(shell.time_of_day().is_none());
}
