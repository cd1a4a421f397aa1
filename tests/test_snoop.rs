// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Remote shell sessions end to end: the daemon forks a snoop master that runs
// /bin/sh on a pty, relays it over the socket and records or replays the
// snoop file. The master is a child of the test process, so each test reaps
// it directly.

use std::fs;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use msh::error::ErrorCode;
use msh::protocol::{Command, Method, Request};
use msh::server::snoopsrv::SnoopSettings;
use msh::server::SnoopServer;
use msh::{Ipc, TransportContext};
use serial_test::serial;

/// The master copies the daemon's terminal settings when stdin is a tty and
/// switches it to raw mode; keep the test runner's terminal out of it.
fn stdin_from_dev_null() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let null = fs::File::open("/dev/null").unwrap();
        let rc = unsafe { libc::dup2(null.as_raw_fd(), libc::STDIN_FILENO) };
        assert!(rc >= 0);
    });
}

fn settings(snoop_file: &Path) -> SnoopSettings {
    SnoopSettings {
        shell: "/bin/sh".to_string(),
        shell_args: Vec::new(),
        snoop_file: snoop_file.to_path_buf(),
    }
}

struct Session {
    ipc: Ipc,
    ctx: TransportContext,
    master: libc::pid_t,
}

impl Session {
    /// Open a remote session with `command` and return once the daemon has
    /// forked its snoop master.
    fn open(settings: SnoopSettings, command: Command) -> Self {
        stdin_from_dev_null();
        let mut server = SnoopServer::start(0, 4, settings).expect("listen");
        let port = server.port();
        let daemon = thread::spawn(move || {
            server.serve_one().expect("serve");
            server
        });

        let mut ipc = Ipc::new(Method::Sockets);
        let mut ctx = TransportContext::client(Method::Sockets)
            .with_host("127.0.0.1")
            .with_port(port)
            .with_timeout(Some(Duration::from_secs(5)));
        ipc.init(&mut ctx).expect("connect");
        ctx.set_request(Request::new(command));
        ipc.send_request(&mut ctx).expect("send open");

        let server = daemon.join().unwrap();
        assert_eq!(server.masters().len(), 1);
        let master = server.masters()[0];
        Self { ipc, ctx, master }
    }

    fn send(&mut self, command: Command, line: &str) {
        let mut req = Request::new(command);
        req.set_text(line);
        self.ctx.set_request(req);
        self.ipc.send_request(&mut self.ctx).expect("send line");
    }

    /// Collect output frames until the master closes the connection.
    fn read_to_close(&mut self) -> String {
        let mut out = Vec::new();
        loop {
            self.ctx.expect_response();
            match self.ipc.receive_response(&mut self.ctx) {
                Ok(()) => out.extend_from_slice(self.ctx.response().unwrap().bytes()),
                Err(e) => {
                    assert_eq!(e.code(), ErrorCode::Disconnected, "{e}");
                    break;
                }
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    fn hang_up(mut self) -> libc::pid_t {
        let _ = self.ipc.finish(&mut self.ctx);
        self.master
    }
}

/// Reap `child`, killing it if it is still running after `limit`.
fn wait_exit(child: libc::pid_t, limit: Duration) -> Option<libc::c_int> {
    let deadline = Instant::now() + limit;
    let mut status = 0;
    loop {
        if unsafe { libc::waitpid(child, &mut status, libc::WNOHANG) } == child {
            return Some(status);
        }
        if Instant::now() >= deadline {
            unsafe {
                libc::kill(child, libc::SIGKILL);
                libc::waitpid(child, &mut status, 0);
            }
            return None;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn exit_code(status: libc::c_int) -> Option<libc::c_int> {
    libc::WIFEXITED(status).then(|| libc::WEXITSTATUS(status))
}

#[test]
#[serial]
fn rshell_runs_commands_and_records_them() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("snoopfile");
    let mut session = Session::open(settings(&file), Command::RShell);

    session.send(Command::RShell, "echo $((6*7))\n");
    session.send(Command::RShell, "exit\n");
    let output = session.read_to_close();
    assert!(output.contains("42"), "{output:?}");

    let master = session.hang_up();
    let status = wait_exit(master, Duration::from_secs(5)).expect("snoop master exits");
    assert_eq!(exit_code(status), Some(0));
    assert_eq!(fs::read_to_string(&file).unwrap(), "echo $((6*7))\nexit\n");
}

#[test]
#[serial]
fn rsnoop_replays_the_recording_and_ends_with_it() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("snoopfile");
    fs::write(&file, "echo $((6*7))\nexit\n").unwrap();
    let mut session = Session::open(settings(&file), Command::RSnoop);

    // Client lines are only sync points; their text is not replayed.
    session.send(Command::RSnoop, "ignored\n");
    session.send(Command::RSnoop, "ignored\n");
    let output = session.read_to_close();
    assert!(output.contains("42"), "{output:?}");
    assert!(!output.contains("ignored"), "{output:?}");

    let master = session.hang_up();
    let status = wait_exit(master, Duration::from_secs(5)).expect("snoop master exits");
    assert_eq!(exit_code(status), Some(0));
    assert_eq!(fs::read_to_string(&file).unwrap(), "echo $((6*7))\nexit\n");
}

#[test]
#[serial]
fn client_leaving_without_exit_hangs_up_the_shell() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("snoopfile");
    let mut session = Session::open(settings(&file), Command::RShell);

    session.send(Command::RShell, "echo still here\n");
    session.ctx.expect_response();
    session.ipc.receive_response(&mut session.ctx).expect("first output");

    let master = session.hang_up();
    let status = wait_exit(master, Duration::from_secs(5))
        .expect("snoop master exits once the client is gone");
    assert_eq!(exit_code(status), Some(0));
}

#[test]
#[serial]
fn rsnoop_without_a_recording_tells_the_client() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("never-recorded");
    let mut session = Session::open(settings(&file), Command::RSnoop);

    session.ctx.expect_response();
    session.ipc.receive_response(&mut session.ctx).expect("failure notice");
    let notice = session.ctx.response().unwrap().text().into_owned();
    assert!(notice.contains("no recorded session"), "{notice}");
    assert!(notice.contains("never-recorded"), "{notice}");

    let output = session.read_to_close();
    assert!(output.is_empty(), "{output:?}");

    let master = session.hang_up();
    let status = wait_exit(master, Duration::from_secs(5)).expect("snoop master exits");
    assert_eq!(exit_code(status), Some(1));
    assert!(!file.exists());
}
