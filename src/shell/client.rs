// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The interactive microshell: local pipelines, time server requests over
// shared memory, and remote shell/snoop sessions over sockets.

use std::io::{self, Write};
use std::time::Instant;

use crate::config::Config;
use crate::error::{report, ErrorCode, IpcError};
use crate::ipc::Ipc;
use crate::protocol::{Command, Method, Request, Response, TimeType};
use crate::transport::TransportContext;

use super::input::{AckTimer, LineReader, ReadOutcome};
use super::parse::{parse_command, ParsedCommand, RemoteKind};
use super::pipeline;
use super::session::{ShellMode, ShellSession};

pub const MICROSHELL_VERSION: &str = concat!("Microshell ", env!("CARGO_PKG_VERSION"));

const HELP: &str = "\
Command List:
-------------

?, help                 - to display this screen

q, quit, terminate,     - to quit the shell client
close, disconnect, exit

open, connect, register - register client within the server

srvver, server version  - to request server's version

eltime, elapsed time    - to request elapsed time

tod, time of the day    - to request time of the day

rshell <host>           - open a remote shell on <host> (recorded)

rsnoop <host>           - play back the last recorded remote session

Any other command will be treated as external.
";

/// A dispatcher and the context it operates on.
#[derive(Debug)]
struct Link {
    ipc: Ipc,
    ctx: TransportContext,
}

impl Link {
    fn new(ctx: TransportContext) -> Self {
        Self {
            ipc: Ipc::new(ctx.method),
            ctx,
        }
    }

    fn send(&mut self, req: Request) -> Result<(), IpcError> {
        self.ctx.set_request(req);
        self.ipc.send_request(&mut self.ctx)
    }

    fn receive(&mut self) -> Result<Response, IpcError> {
        self.ctx.expect_response();
        self.ipc.receive_response(&mut self.ctx)?;
        self.ctx.response().cloned()
    }

    fn exchange(&mut self, req: Request) -> Result<Response, IpcError> {
        self.send(req)?;
        self.receive()
    }

    fn close(mut self, op: &str) {
        if let Err(e) = self.ipc.finish(&mut self.ctx) {
            report(op, &e);
        }
    }
}

fn print_response(resp: &Response) {
    let text = resp.text();
    print!("Server's [{}] Response: {}", resp.srv_pid, text);
    if !text.ends_with('\n') {
        println!();
    }
}

pub struct Microshell {
    config: Config,
    session: ShellSession,
    time_link: Option<Link>,
    remote_link: Option<Link>,
    ping_deadline: Option<Instant>,
}

impl Microshell {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: ShellSession::new(),
            time_link: None,
            remote_link: None,
            ping_deadline: None,
        }
    }

    pub fn session(&self) -> &ShellSession {
        &self.session
    }

    // -----------------------------------------------------------------------
    // Time server
    // -----------------------------------------------------------------------

    /// Attach to the time server's mailbox and register with an OPEN request.
    /// Failure leaves the shell usable for local commands.
    pub fn connect_time_server(&mut self) -> bool {
        if self.session.connected {
            eprintln!("This client already opened a connection to the server!");
            return false;
        }
        println!("Initializing IPC... ");

        let mut ctx = TransportContext::client(Method::Shmem).with_key(self.config.key);
        ctx.shm_lookup_threshold = self.config.shm_lookup_threshold;
        let mut link = Link::new(ctx);
        if let Err(e) = link.ipc.init(&mut link.ctx) {
            report("connect_time_server: init", &e);
            link.close("connect_time_server: finish");
            return false;
        }

        match link.exchange(Request::new(Command::Open)) {
            Ok(resp) => print_response(&resp),
            Err(e) => {
                report("connect_time_server: open", &e);
                link.close("connect_time_server: finish");
                return false;
            }
        }

        self.session.connected = true;
        self.session.sem_id = link.ctx.sem_id;
        self.time_link = Some(link);
        self.arm_ping();
        tracing::info!(sem_id = self.session.sem_id, "registered with time server");
        println!("Done.");
        true
    }

    fn arm_ping(&mut self) {
        self.ping_deadline = Some(Instant::now() + self.config.ping_period());
    }

    fn time_request(&mut self, what: &str, req: Request) -> Option<Response> {
        let Some(link) = self.time_link.as_mut().filter(|_| self.session.connected) else {
            eprintln!("{what}: Not connected to the server yet.");
            return None;
        };
        match link.exchange(req) {
            Ok(resp) => Some(resp),
            Err(e) => {
                report(what, &e);
                if matches!(e.code(), ErrorCode::Removed) {
                    println!("The time server went away. Resetting...");
                    self.drop_time_link();
                }
                None
            }
        }
    }

    fn drop_time_link(&mut self) {
        if let Some(link) = self.time_link.take() {
            link.close("time server: finish");
        }
        self.session.connected = false;
        self.ping_deadline = None;
    }

    pub fn server_version(&mut self) -> Option<Response> {
        let resp = self.time_request("Server Version Request", Request::new(Command::Version))?;
        print_response(&resp);
        Some(resp)
    }

    pub fn elapsed_time(&mut self) -> Option<Response> {
        let mut req = Request::new(Command::Time);
        req.time_type = TimeType::Elapsed;
        let resp = self.time_request("Elapsed Time Request", req)?;
        print_response(&resp);
        Some(resp)
    }

    pub fn time_of_day(&mut self) -> Option<Response> {
        let mut req = Request::new(Command::Time);
        req.time_type = TimeType::TimeOfDay;
        let resp = self.time_request("Time of the Day Request", req)?;
        print_response(&resp);
        Some(resp)
    }

    /// Keep-alive: one PING, then re-arm the deadline.
    pub fn ping(&mut self) -> Option<Response> {
        let mut req = Request::new(Command::Ping);
        req.time_type = TimeType::Elapsed;
        self.session.ping_count += 1;
        let resp = self.time_request("Ping", req);
        if let Some(resp) = &resp {
            print_response(resp);
        }
        if self.session.connected {
            self.arm_ping();
        }
        resp
    }

    // -----------------------------------------------------------------------
    // Remote sessions
    // -----------------------------------------------------------------------

    /// Connect to the snoop server on `host` and open a shell or playback
    /// session there.
    pub fn connect_snoop_server(&mut self, kind: RemoteKind, host: &str) -> bool {
        println!("Initializing IPC...");
        println!("Connecting to host [{host}]");

        let ctx = TransportContext::client(Method::Sockets)
            .with_host(host)
            .with_port(self.config.port)
            .with_timeout(Some(self.config.remote_drain()));
        let mut link = Link::new(ctx);
        if let Err(e) = link.ipc.init(&mut link.ctx) {
            report("connect_snoop_server: init", &e);
            return false;
        }
        println!("Done.");

        if let Err(e) = link.send(Request::new(remote_command(kind))) {
            report("connect_snoop_server: open", &e);
            link.close("connect_snoop_server: finish");
            return false;
        }
        self.remote_link = Some(link);
        self.session.mode = ShellMode::Remote {
            kind,
            host: host.to_string(),
        };
        self.drain_remote();
        true
    }

    /// Forward one input line to the remote session and print its output.
    pub fn remote_line(&mut self, line: &str) {
        let ShellMode::Remote { kind, .. } = self.session.mode else {
            return;
        };
        let Some(link) = self.remote_link.as_mut() else {
            self.session.mode = ShellMode::Listening;
            return;
        };
        let mut req = Request::new(remote_command(kind));
        req.set_text(&format!("{line}\n"));
        if let Err(e) = link.send(req) {
            report("remote_line: send", &e);
            self.end_remote();
            return;
        }
        self.drain_remote();
    }

    /// Print output frames until the stream stays quiet for the drain period.
    fn drain_remote(&mut self) {
        let Some(link) = self.remote_link.as_mut() else {
            return;
        };
        let mut stdout = io::stdout();
        loop {
            match link.receive() {
                Ok(resp) => {
                    let _ = stdout.write_all(resp.bytes());
                    let _ = stdout.flush();
                }
                Err(e) if e.code() == ErrorCode::TimedOut => break,
                Err(e) if e.code() == ErrorCode::Disconnected => {
                    println!("\nRemote session closed.");
                    self.end_remote();
                    break;
                }
                Err(e) => {
                    report("remote: receive", &e);
                    self.end_remote();
                    break;
                }
            }
        }
    }

    fn end_remote(&mut self) {
        if let Some(link) = self.remote_link.take() {
            link.close("remote: finish");
        }
        if self.session.is_remote() {
            self.session.mode = ShellMode::Listening;
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Send TERMINATE and wait a bounded time for the ACK, then release all
    /// IPC resources whatever the outcome.
    pub fn disconnect(&mut self) {
        self.end_remote();
        let Some(mut link) = self.time_link.take() else {
            return;
        };
        if self.session.connected {
            match AckTimer::arm(self.config.ack_timeout()) {
                Ok(timer) => {
                    match link.exchange(Request::new(Command::Terminate)) {
                        Ok(resp) => print_response(&resp),
                        Err(e) if timer.fired() || e.code() == ErrorCode::Interrupted => {
                            tracing::info!("server ACK timed out");
                            println!("Server ACK timed out...");
                        }
                        Err(e) => report("disconnect: terminate", &e),
                    }
                    drop(timer);
                }
                Err(e) => tracing::error!(error = %e, "cannot arm ACK timer"),
            }
        }
        link.close("disconnect: finish");
        self.session.connected = false;
        self.ping_deadline = None;
    }

    pub fn show_help(&self) {
        print!("{HELP}");
    }

    // -----------------------------------------------------------------------
    // Input loop
    // -----------------------------------------------------------------------

    /// Execute one input line.
    pub fn handle_line(&mut self, line: &str) {
        self.session.cmdline = line.to_string();
        if self.session.is_remote() {
            self.remote_line(line);
            self.session.reset();
            return;
        }

        let cmd = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                eprintln!("msh: {e}");
                self.session.reset();
                return;
            }
        };
        self.session.last_command = Some(cmd.clone());

        match cmd {
            ParsedCommand::Blank => {}
            ParsedCommand::Quit => self.session.mode = ShellMode::Quit,
            ParsedCommand::Register => {
                self.connect_time_server();
            }
            ParsedCommand::ServerVersion => {
                self.server_version();
            }
            ParsedCommand::ElapsedTime => {
                self.elapsed_time();
            }
            ParsedCommand::TimeOfDay => {
                self.time_of_day();
            }
            ParsedCommand::Help => self.show_help(),
            ParsedCommand::Remote { kind, host } => {
                self.connect_snoop_server(kind, &host);
            }
            ParsedCommand::Pipeline(p) => {
                self.session.pipeline = Some(p.clone());
                if let Err(e) = pipeline::execute(&p) {
                    eprintln!("msh: {e}");
                }
            }
        }
        self.session.reset();
    }

    /// Prompt, read and execute lines until a quit command or end of input.
    pub fn run(&mut self, input: &mut LineReader) -> io::Result<()> {
        println!("\nWelcome to Microshell Client\nVersion: {MICROSHELL_VERSION}\nType '?' for help.");

        while self.session.mode != ShellMode::Quit {
            print!("\n{}> ", self.session.prompt());
            io::stdout().flush()?;

            let timeout = match self.ping_deadline {
                Some(deadline) if !self.session.is_remote() => {
                    Some(deadline.saturating_duration_since(Instant::now()))
                }
                _ => None,
            };
            match input.read_line(timeout)? {
                ReadOutcome::Line(line) => self.handle_line(&line),
                ReadOutcome::TimedOut => {
                    println!();
                    self.ping();
                }
                ReadOutcome::Eof => {
                    println!();
                    self.session.mode = ShellMode::Quit;
                }
            }
        }

        self.disconnect();
        Ok(())
    }
}

fn remote_command(kind: RemoteKind) -> Command {
    match kind {
        RemoteKind::Shell => Command::RShell,
        RemoteKind::Snoop => Command::RSnoop,
    }
}

impl Drop for Microshell {
    fn drop(&mut self) {
        // Private System V objects outlive the process unless removed.
        self.disconnect();
    }
}
