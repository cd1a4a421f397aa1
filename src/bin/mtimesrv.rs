// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Micro time server.
//
// Usage:
//   mtimesrv [--config FILE] [--key N] [--log-file PATH] [--foreground]
//
// Appends stdout/stderr to the log file, detaches from the terminal, and
// serves the shared memory mailbox until the last registered client leaves.

use std::path::PathBuf;

use clap::Parser;

use msh::config::{parse_key, Config};
use msh::error::{fatal, report};
use msh::logging;
use msh::redirect::{self, RedirectMode, RedirectTarget};
use msh::server::{daemonize, timesrv::TIMESRV_VERSION, TimeServer};

#[derive(Debug, Parser)]
#[command(name = "mtimesrv", version, about = "Micro time server")]
struct Cli {
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// System V key of the mailbox (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_key)]
    key: Option<i32>,

    /// Log file receiving stdout and stderr (append mode).
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Stay attached to the terminal and log there.
    #[arg(long)]
    foreground: bool,
}

fn main() {
    let cli = Cli::parse();
    let mut cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => fatal("mtimesrv: config", &e),
    };
    if let Some(key) = cli.key {
        cfg.key = key;
    }
    if let Some(path) = cli.log_file {
        cfg.log_file = path;
    }

    println!("\nMicro Time Server\nVersion: {TIMESRV_VERSION}\n");
    if !cli.foreground {
        if let Err(e) = redirect::establish(
            &cfg.log_file,
            RedirectMode::Append,
            RedirectTarget::StdoutAndStderr,
        ) {
            fatal("mtimesrv: log redirection", &e);
        }
    }
    logging::init("info");

    let mut server = match TimeServer::start(cfg.key) {
        Ok(server) => server,
        Err(e) => fatal("mtimesrv: init", &e),
    };
    tracing::info!(key = cfg.key, "time server initialized");

    if !cli.foreground {
        if let Err(e) = daemonize() {
            server.cleanup();
            fatal("mtimesrv: daemonize", &e);
        }
    }

    match server.serve() {
        Ok(()) => {
            tracing::info!("shutting down");
            server.cleanup();
        }
        Err(e) => {
            report("mtimesrv: serve", &e);
            server.cleanup();
            std::process::exit(1);
        }
    }
}
