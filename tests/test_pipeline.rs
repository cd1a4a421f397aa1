// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Pipeline executor tests: real processes, pipes and output redirection.

use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;

use msh::shell::pipeline::execute;
use msh::shell::{parse_command, ParsedCommand, Pipeline};
use serial_test::serial;

fn pipeline(line: &str) -> Pipeline {
    match parse_command(line).expect("parse") {
        ParsedCommand::Pipeline(p) => p,
        other => panic!("not a pipeline: {other:?}"),
    }
}

fn run(line: &str) -> Vec<std::process::ExitStatus> {
    execute(&pipeline(line)).expect("execute")
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read output")
}

#[test]
#[serial]
fn listing_filtered_into_a_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("abc.txt"), "").unwrap();
    fs::write(dir.path().join("xyz.dat"), "").unwrap();
    let out = dir.path().join("out.txt");

    let statuses = run(&format!(
        "ls -al {} | grep abc > {}",
        dir.path().display(),
        out.display()
    ));
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.success()));

    let text = read(&out);
    assert!(text.contains("abc.txt"), "{text}");
    assert!(!text.contains("xyz.dat"), "{text}");
}

#[test]
#[serial]
fn three_stages_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("top");
    let statuses = run(&format!("seq 5 | sort -r | head -n 1 > {}", out.display()));
    assert_eq!(statuses.len(), 3);
    assert_eq!(read(&out), "5\n");
}

#[test]
#[serial]
fn single_gt_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("trunc");
    fs::write(&out, "previous content that is much longer\n").unwrap();
    run(&format!("echo hi > {}", out.display()));
    assert_eq!(read(&out), "hi\n");
}

#[test]
#[serial]
fn double_gt_appends() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("log");
    run(&format!("echo one >> {}", out.display()));
    run(&format!("echo two >> {}", out.display()));
    assert_eq!(read(&out), "one\ntwo\n");
}

#[test]
#[serial]
fn first_stage_reads_an_empty_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("empty");
    let statuses = run(&format!("cat > {}", out.display()));
    assert!(statuses[0].success());
    assert_eq!(read(&out), "");
}

#[test]
#[serial]
fn exit_status_of_each_stage_is_reported() {
    let statuses = run("false");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].code(), Some(1));

    let statuses = run("true | false");
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().any(|s| !s.success()));
    assert!(statuses.iter().any(|s| s.success()));
}

#[test]
#[serial]
fn unknown_program_fails_only_its_stage() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let statuses = run(&format!(
        "no-such-program-for-msh-tests | echo still > {}",
        out.display()
    ));
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().any(|s| s.code() == Some(1)));
    assert!(statuses.iter().all(|s| s.signal().is_none()));
    assert_eq!(read(&out), "still\n");
}

#[test]
#[serial]
fn unwritable_redirect_target_aborts_before_forking() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("missing-dir").join("out");
    let err = execute(&pipeline(&format!("echo hi > {}", out.display()))).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}
