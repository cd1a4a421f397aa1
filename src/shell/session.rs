// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

use super::parse::{ParsedCommand, Pipeline, RemoteKind};

/// Where input lines go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShellMode {
    /// Lines are parsed as local commands.
    #[default]
    Listening,
    /// Lines are forwarded to a remote shell or snoop session.
    Remote { kind: RemoteKind, host: String },
    Quit,
}

/// State of the microshell between and during commands.
#[derive(Debug, Clone, Default)]
pub struct ShellSession {
    /// Registered with the time server.
    pub connected: bool,
    /// Private semaphore set guarding our reply mailbox.
    pub sem_id: i32,
    pub ping_count: u64,
    pub mode: ShellMode,
    pub last_command: Option<ParsedCommand>,
    pub pipeline: Option<Pipeline>,
    /// Raw text of the current line.
    pub cmdline: String,
}

impl ShellSession {
    pub fn new() -> Self {
        Self {
            sem_id: -1,
            ..Self::default()
        }
    }

    /// Clear per-command state. Connection state and remote mode survive.
    pub fn reset(&mut self) {
        self.last_command = None;
        self.pipeline = None;
        self.cmdline.clear();
    }

    pub fn pipe_count(&self) -> usize {
        self.pipeline.as_ref().map_or(0, Pipeline::pipe_count)
    }

    pub fn prompt(&self) -> &'static str {
        match &self.mode {
            ShellMode::Remote { kind, .. } => kind.prompt(),
            _ => "msh",
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.mode, ShellMode::Remote { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_keeps_connection() {
        let mut s = ShellSession::new();
        s.connected = true;
        s.cmdline.push_str("ls | wc");
        s.pipeline = Some(Pipeline::parse("ls | wc").unwrap());
        assert_eq!(s.pipe_count(), 1);
        s.reset();
        assert!(s.connected);
        assert_eq!(s.pipe_count(), 0);
        assert!(s.cmdline.is_empty());
    }

    #[test]
    fn prompt_follows_mode() {
        let mut s = ShellSession::new();
        assert_eq!(s.prompt(), "msh");
        s.mode = ShellMode::Remote {
            kind: RemoteKind::Snoop,
            host: "h".into(),
        };
        assert_eq!(s.prompt(), "rsnoop");
        assert!(s.is_remote());
    }
}
