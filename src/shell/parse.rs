// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Command line parsing for the microshell.
//
// Built-in keywords are matched case-insensitively against the whole line
// (internal runs of blanks collapse to one space). Anything else is a
// pipeline: `cmd [args] [| cmd [args]]* [> file | >> file]`, whose text
// keeps its case.

use std::ffi::{CString, NulError};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;

use crate::redirect::RedirectMode;

/// Aliases expanded before pipeline parsing.
const ALIASES: &[(&str, &str)] = &[("ll", "ls -al")];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{0}: missing host name")]
    MissingHost(&'static str),
    #[error("empty command in pipeline stage {0}")]
    EmptyStage(usize),
    #[error("missing file name after redirection")]
    EmptyRedirect,
    #[error("invalid redirection target: {0}")]
    BadRedirect(String),
}

/// Which remote service a `rshell`/`rsnoop` line asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    Shell,
    Snoop,
}

impl RemoteKind {
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Shell => "rshell",
            Self::Snoop => "rsnoop",
        }
    }
}

/// One pipeline stage: the program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub args: Vec<String>,
}

impl Stage {
    pub fn program(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// Build the `execvp` argument vector for this stage.
    pub fn exec_argv(&self) -> Result<ExecArgv, NulError> {
        let strings = self
            .args
            .iter()
            .map(|a| CString::new(a.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut ptrs: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(ptr::null());
        Ok(ExecArgv { strings, ptrs })
    }
}

/// A null-terminated argv whose pointers borrow the owned strings.
#[derive(Debug)]
pub struct ExecArgv {
    strings: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl ExecArgv {
    pub fn program(&self) -> *const c_char {
        self.ptrs[0]
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    /// Number of entries including the trailing null.
    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_null_terminated(&self) -> bool {
        self.ptrs.last().is_some_and(|p| p.is_null())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub mode: RedirectMode,
    pub path: PathBuf,
}

/// Ordered stages plus an optional redirection of the last stage's stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub redirect: Option<Redirect>,
}

impl Pipeline {
    /// Number of `|` symbols.
    pub fn pipe_count(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let (body, redirect) = match text.find('>') {
            None => (text, None),
            Some(at) => {
                let (mode, rest) = match text[at + 1..].strip_prefix('>') {
                    Some(rest) => (RedirectMode::Append, rest),
                    None => (RedirectMode::Overwrite, &text[at + 1..]),
                };
                let target = rest.trim();
                if target.is_empty() {
                    return Err(ParseError::EmptyRedirect);
                }
                if target.contains(['>', '|']) {
                    return Err(ParseError::BadRedirect(target.to_string()));
                }
                let redirect = Redirect {
                    mode,
                    path: PathBuf::from(target),
                };
                (&text[..at], Some(redirect))
            }
        };

        let stages = body
            .split('|')
            .enumerate()
            .map(|(i, part)| {
                let args: Vec<String> = part.split_whitespace().map(str::to_string).collect();
                if args.is_empty() {
                    Err(ParseError::EmptyStage(i))
                } else {
                    Ok(Stage { args })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { stages, redirect })
    }
}

/// Result of parsing one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Blank,
    Quit,
    Register,
    ServerVersion,
    ElapsedTime,
    TimeOfDay,
    Help,
    Remote { kind: RemoteKind, host: String },
    Pipeline(Pipeline),
}

pub fn parse_command(line: &str) -> Result<ParsedCommand, ParseError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(ParsedCommand::Blank);
    }
    let normalized = words.join(" ").to_lowercase();

    let builtin = match normalized.as_str() {
        "q" | "quit" | "terminate" | "close" | "disconnect" | "exit" => Some(ParsedCommand::Quit),
        "open" | "connect" | "register" => Some(ParsedCommand::Register),
        "srvver" | "server version" => Some(ParsedCommand::ServerVersion),
        "eltime" | "elapsed time" => Some(ParsedCommand::ElapsedTime),
        "tod" | "time of the day" => Some(ParsedCommand::TimeOfDay),
        "help" | "?" => Some(ParsedCommand::Help),
        _ => None,
    };
    if let Some(cmd) = builtin {
        return Ok(cmd);
    }

    let remote = match words[0].to_lowercase().as_str() {
        "rshell" => Some((RemoteKind::Shell, "rshell")),
        "rsnoop" => Some((RemoteKind::Snoop, "rsnoop")),
        _ => None,
    };
    if let Some((kind, keyword)) = remote {
        let host = words.get(1).ok_or(ParseError::MissingHost(keyword))?;
        return Ok(ParsedCommand::Remote {
            kind,
            host: host.to_string(),
        });
    }

    if let Some((_, expansion)) = ALIASES.iter().find(|(alias, _)| *alias == normalized) {
        return Pipeline::parse(expansion).map(ParsedCommand::Pipeline);
    }

    Pipeline::parse(line).map(ParsedCommand::Pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pipeline(line: &str) -> Pipeline {
        match parse_command(line).unwrap() {
            ParsedCommand::Pipeline(p) => p,
            other => panic!("expected pipeline, got {other:?}"),
        }
    }

    #[test]
    fn keywords_ignore_case_and_spacing() {
        assert_eq!(parse_command("QUIT").unwrap(), ParsedCommand::Quit);
        assert_eq!(parse_command("  Server   Version ").unwrap(), ParsedCommand::ServerVersion);
        assert_eq!(parse_command("time of the day").unwrap(), ParsedCommand::TimeOfDay);
        assert_eq!(parse_command("?").unwrap(), ParsedCommand::Help);
        assert_eq!(parse_command(" \t ").unwrap(), ParsedCommand::Blank);
    }

    #[test]
    fn remote_needs_host_in_first_position() {
        assert_eq!(
            parse_command("RShell example.org").unwrap(),
            ParsedCommand::Remote {
                kind: RemoteKind::Shell,
                host: "example.org".into()
            }
        );
        assert_eq!(parse_command("rsnoop").unwrap_err(), ParseError::MissingHost("rsnoop"));
        // Not a keyword unless it leads the line.
        let p = pipeline("echo rshell");
        assert_eq!(p.stages[0].args, vec!["echo", "rshell"]);
    }

    #[test]
    fn alias_expands() {
        let p = pipeline("LL");
        assert_eq!(p.stages[0].args, vec!["ls", "-al"]);
    }

    #[test]
    fn pipeline_with_overwrite() {
        let p = pipeline("ls -al | grep c > out.txt");
        assert_eq!(p.pipe_count(), 1);
        assert_eq!(p.stages.len(), 2);
        assert_eq!(p.stages[0].args, vec!["ls", "-al"]);
        assert_eq!(p.stages[1].args, vec!["grep", "c"]);
        assert_eq!(
            p.redirect,
            Some(Redirect {
                mode: RedirectMode::Overwrite,
                path: PathBuf::from("out.txt")
            })
        );
    }

    #[test]
    fn double_gt_appends() {
        let p = pipeline("date >>log.txt");
        assert_eq!(p.redirect.unwrap().mode, RedirectMode::Append);
    }

    #[test]
    fn case_is_preserved_in_pipelines() {
        let p = pipeline("grep -R Foo");
        assert_eq!(p.stages[0].args, vec!["grep", "-R", "Foo"]);
    }

    #[test]
    fn trailing_blanks_do_not_add_arguments() {
        let p = pipeline("echo a \t ");
        assert_eq!(p.stages[0].args, vec!["echo", "a"]);
        assert_eq!(p.stages[0].exec_argv().unwrap().len(), 3);
    }

    #[test]
    fn n_pipes_give_n_plus_one_stages() {
        let p = pipeline("a | b | c | d");
        assert_eq!(p.pipe_count(), 3);
        assert_eq!(p.stages.len(), 4);
        for stage in &p.stages {
            let argv = stage.exec_argv().unwrap();
            assert_eq!(argv.len(), stage.args.len() + 1);
            assert!(argv.is_null_terminated());
        }
    }

    #[test]
    fn malformed_pipelines() {
        assert_eq!(parse_command("ls |").unwrap_err(), ParseError::EmptyStage(1));
        assert_eq!(parse_command("| wc").unwrap_err(), ParseError::EmptyStage(0));
        assert_eq!(parse_command("ls >").unwrap_err(), ParseError::EmptyRedirect);
        assert_eq!(parse_command("ls >>  ").unwrap_err(), ParseError::EmptyRedirect);
        assert!(matches!(parse_command("ls > a | b"), Err(ParseError::BadRedirect(_))));
    }
}
