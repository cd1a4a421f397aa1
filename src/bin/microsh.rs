// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Interactive microshell client.
//
// Usage:
//   microsh [--config FILE] [--key N] [--port N] [--ping-period SECS] [--ack-timeout SECS]
//
// Runs local pipelines, talks to mtimesrv over shared memory after `open`,
// and to snoopsrv over TCP with `rshell <host>` / `rsnoop <host>`.

use std::path::PathBuf;

use clap::Parser;

use msh::config::{parse_key, Config};
use msh::error::fatal;
use msh::logging;
use msh::shell::{LineReader, Microshell};

#[derive(Debug, Parser)]
#[command(name = "microsh", version, about = "Microshell client")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// System V key of the time server (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_key)]
    key: Option<i32>,

    /// TCP port of the snoop server.
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between keep-alive pings once registered.
    #[arg(long, value_name = "SECS")]
    ping_period: Option<u64>,

    /// Seconds to wait for the server's ACK on disconnect.
    #[arg(long, value_name = "SECS")]
    ack_timeout: Option<u64>,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(key) = self.key {
            cfg.key = key;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(secs) = self.ping_period {
            cfg.ping_period_secs = secs;
        }
        if let Some(secs) = self.ack_timeout {
            cfg.ack_timeout_secs = secs;
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init("warn");

    let mut cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => fatal("microsh: config", &e),
    };
    cli.apply(&mut cfg);

    let mut shell = Microshell::new(cfg);
    let mut input = LineReader::stdin();
    if let Err(e) = shell.run(&mut input) {
        shell.disconnect();
        fatal("microsh: input", &e);
    }
}
