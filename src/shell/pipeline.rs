// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Pipeline executor.
//
// Stages are spawned from the last to the first. Each stage reads from a
// fresh pipe and writes either to the pipe of the stage after it, to the
// redirect target (last stage), or to the inherited stdout. All pipe
// descriptors are close-on-exec, so a child only keeps the two it dup'ed.
// Everything a child touches is prepared before `fork`.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use crate::redirect;

use super::parse::{ExecArgv, Pipeline};

struct PreparedStage {
    argv: ExecArgv,
    /// Written by the child if `execvp` returns.
    failure: Vec<u8>,
}

fn prepare(pipeline: &Pipeline) -> io::Result<Vec<PreparedStage>> {
    pipeline
        .stages
        .iter()
        .map(|stage| {
            let argv = stage
                .exec_argv()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let failure = format!("msh: {}: cannot execute\n", stage.program()).into_bytes();
            Ok(PreparedStage { argv, failure })
        })
        .collect()
}

fn make_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Runs in the forked child; never returns.
fn exec_stage(stage: &PreparedStage, input: &OwnedFd, output: Option<&OwnedFd>) -> ! {
    unsafe {
        let wired = libc::dup2(input.as_raw_fd(), libc::STDIN_FILENO) >= 0
            && output.map_or(true, |fd| libc::dup2(fd.as_raw_fd(), libc::STDOUT_FILENO) >= 0);
        if wired {
            libc::execvp(stage.argv.program(), stage.argv.as_ptr());
        }
        libc::write(
            libc::STDERR_FILENO,
            stage.failure.as_ptr().cast(),
            stage.failure.len(),
        );
        libc::_exit(1)
    }
}

/// Spawn `stages` right to left. `downstream` is the write end the last of
/// `stages` outputs to; `None` means the pipeline's final output.
fn spawn(
    stages: &[PreparedStage],
    downstream: Option<OwnedFd>,
    final_output: Option<&OwnedFd>,
    spawned: &mut Vec<libc::pid_t>,
) -> io::Result<()> {
    let Some((stage, upstream)) = stages.split_last() else {
        // The first stage's input pipe: closing the write end gives it EOF.
        drop(downstream);
        return Ok(());
    };

    let (read_end, write_end) = make_pipe()?;
    let output = match &downstream {
        Some(fd) => Some(fd),
        None => final_output,
    };

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(io::Error::last_os_error());
    }
    if pid == 0 {
        exec_stage(stage, &read_end, output);
    }

    spawned.push(pid);
    drop(read_end);
    drop(downstream);
    spawn(upstream, Some(write_end), final_output, spawned)
}

fn reap(pids: &[libc::pid_t]) -> Vec<ExitStatus> {
    pids.iter()
        .map(|&pid| {
            let mut status = 0;
            loop {
                let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
                if ret >= 0 {
                    break;
                }
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    tracing::warn!(pid, error = %err, "waitpid failed");
                    break;
                }
            }
            ExitStatus::from_raw(status)
        })
        .collect()
}

/// Run `pipeline` to completion and return the exit status of every stage,
/// last stage first.
///
/// If a `pipe` or `fork` fails part way, the stages already running are
/// still waited for before the error is returned.
pub fn execute(pipeline: &Pipeline) -> io::Result<Vec<ExitStatus>> {
    let stages = prepare(pipeline)?;
    let final_output = match &pipeline.redirect {
        Some(r) => Some(redirect::open_target(&r.path, r.mode)?),
        None => None,
    };

    let mut spawned = Vec::with_capacity(stages.len());
    let built = spawn(&stages, None, final_output.as_ref(), &mut spawned);
    drop(final_output);

    let statuses = reap(&spawned);
    tracing::debug!(stages = stages.len(), waited = statuses.len(), "pipeline finished");
    built.map(|()| statuses)
}
