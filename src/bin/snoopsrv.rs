// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Snoop server.
//
// Usage:
//   snoopsrv [--config FILE] [--port N] [--snoop-file PATH] [--shell PATH] [--foreground]

use std::path::PathBuf;

use clap::Parser;

use msh::config::Config;
use msh::error::fatal;
use msh::logging;
use msh::server::snoopsrv::{SnoopSettings, SNOOPSRV_VERSION};
use msh::server::{daemonize, SnoopServer};

#[derive(Debug, Parser)]
#[command(name = "snoopsrv", version, about = "Remote shell and session playback server")]
struct Cli {
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Recording written by rshell sessions and replayed by rsnoop.
    #[arg(long, value_name = "PATH")]
    snoop_file: Option<PathBuf>,

    /// Shell run on the pty of every session.
    #[arg(long, value_name = "PATH")]
    shell: Option<String>,

    #[arg(long)]
    foreground: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init("info");

    let mut cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => fatal("snoopsrv: config", &e),
    };
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if let Some(path) = cli.snoop_file {
        cfg.snoop_file = path;
    }
    if let Some(shell) = cli.shell {
        cfg.shell = shell;
    }

    println!("\nSnoop Server\nVersion: {SNOOPSRV_VERSION}\n");

    let settings = SnoopSettings {
        shell: cfg.shell.clone(),
        shell_args: cfg.shell_args.clone(),
        snoop_file: cfg.snoop_file.clone(),
    };
    let mut server = match SnoopServer::start(cfg.port, cfg.backlog, settings) {
        Ok(server) => server,
        Err(e) => fatal("snoopsrv: init", &e),
    };
    tracing::info!(port = server.port(), "snoop server initialized");

    if !cli.foreground {
        if let Err(e) = daemonize() {
            fatal("snoopsrv: daemonize", &e);
        }
    }

    if let Err(e) = server.serve() {
        fatal("snoopsrv: serve", &e);
    }
}
