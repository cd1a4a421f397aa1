// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

pub mod client;
pub mod input;
pub mod parse;
pub mod pipeline;
pub mod session;

pub use client::Microshell;
pub use input::{AckTimer, LineReader, ReadOutcome};
pub use parse::{parse_command, ParseError, ParsedCommand, Pipeline, RemoteKind, Stage};
pub use session::{ShellMode, ShellSession};
