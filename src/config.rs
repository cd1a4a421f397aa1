// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Runtime configuration shared by the three binaries. Loaded from an
// optional TOML file; command-line flags override individual fields.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::protocol::{SERVER_KEY, SERVER_PORT};
use crate::transport::{BACKLOG, SHM_LOOKUP_THRESHOLD};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn default_key() -> i32 {
    SERVER_KEY
}

fn default_port() -> u16 {
    SERVER_PORT
}

fn default_backlog() -> i32 {
    BACKLOG
}

fn default_lookup_threshold() -> usize {
    SHM_LOOKUP_THRESHOLD
}

fn default_ping_period() -> u64 {
    10
}

fn default_ack_timeout() -> u64 {
    5
}

fn default_remote_drain_ms() -> u64 {
    300
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_shell_args() -> Vec<String> {
    vec!["--".to_string()]
}

fn default_snoop_file() -> PathBuf {
    PathBuf::from("snoopfile")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("mtimesrv.log")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// System V key of the time server's mailbox.
    #[serde(default = "default_key")]
    pub key: i32,
    /// TCP port of the snoop server.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_lookup_threshold")]
    pub shm_lookup_threshold: usize,
    /// Keep-alive period after registration.
    #[serde(default = "default_ping_period")]
    pub ping_period_secs: u64,
    /// How long `disconnect` waits for the server's ACK.
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
    /// Quiet period that ends the output drain of a remote command.
    #[serde(default = "default_remote_drain_ms")]
    pub remote_drain_ms: u64,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_shell_args")]
    pub shell_args: Vec<String>,
    #[serde(default = "default_snoop_file")]
    pub snoop_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key: default_key(),
            port: default_port(),
            backlog: default_backlog(),
            shm_lookup_threshold: default_lookup_threshold(),
            ping_period_secs: default_ping_period(),
            ack_timeout_secs: default_ack_timeout(),
            remote_drain_ms: default_remote_drain_ms(),
            shell: default_shell(),
            shell_args: default_shell_args(),
            snoop_file: default_snoop_file(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// Load from `path`, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn remote_drain(&self) -> Duration {
        Duration::from_millis(self.remote_drain_ms)
    }
}

/// Parse a System V key given in decimal or `0x` hexadecimal.
pub fn parse_key(text: &str) -> Result<i32, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid key {text:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn partial_file_overrides_fields() {
        let cfg = Config::from_toml("key = 4242\nshell_args = []\nsnoop_file = \"/tmp/s\"\n").unwrap();
        assert_eq!(cfg.key, 4242);
        assert!(cfg.shell_args.is_empty());
        assert_eq!(cfg.snoop_file, PathBuf::from("/tmp/s"));
        assert_eq!(cfg.port, SERVER_PORT);
        assert_eq!(cfg.ping_period(), Duration::from_secs(10));
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(Config::from_toml("colour = \"blue\"").is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn keys_parse_in_decimal_and_hex() {
        assert_eq!(parse_key("0x666"), Ok(0x666));
        assert_eq!(parse_key("1638"), Ok(1638));
        assert!(parse_key("0xZZ").is_err());
    }

    #[test]
    fn no_path_gives_defaults() {
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }
}
