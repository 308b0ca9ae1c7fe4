use pipespawn::{Command, Runnable, SpawnError, StreamMode};
use std::fs;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use tempfile::TempDir;

fn write_executable(path: &std::path::Path, content: &str) {
    fs::write(path, content).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("set perms");
}

#[test]
fn capture_round_trip() {
    let mut cmd = Command::new("echo hello", &[])
        .stdout(StreamMode::Capture)
        .expect("stdout mode");
    let done = cmd.run(None, None).expect("run echo");
    assert_eq!(done.code(), Some(0));
    assert_eq!(done.stdout.as_deref(), Some("hello\n".as_bytes()));
    assert!(done.stderr.is_none());
}

#[test]
fn eager_input_feeds_stdin() {
    let mut cmd = Command::new("cat", &[])
        .stdout(StreamMode::Capture)
        .expect("stdout mode");
    let done = cmd.run(Some(b"over the pipe\n"), None).expect("run cat");
    assert_eq!(done.stdout.as_deref(), Some("over the pipe\n".as_bytes()));
}

#[test]
fn template_placeholders_resolve_at_start() {
    let mut cmd = Command::new("printf %s", &["first-second"])
        .stdout(StreamMode::Capture)
        .expect("stdout mode");
    let done = cmd.run(None, None).expect("run printf");
    assert_eq!(done.argv, ["printf", "first-second"]);
    assert_eq!(done.stdout.as_deref(), Some("first-second".as_bytes()));
}

#[test]
fn too_few_args_fails_at_start() {
    let mut cmd = Command::new("printf %s-%s", &["only"])
        .stdout(StreamMode::Capture)
        .expect("stdout mode");
    let err = cmd.run(None, None).unwrap_err();
    assert!(matches!(err, SpawnError::MissingArgs { .. }));
}

#[test]
fn check_surfaces_exit_code() {
    let dir = TempDir::new().expect("temp dir");
    let script = dir.path().join("fail-two");
    write_executable(&script, "#!/bin/sh\nexit 2\n");

    let mut cmd = Command::new(script.to_str().expect("utf8 path"), &[]);
    let done = cmd.run(None, None).expect("run script");
    assert_eq!(done.code(), Some(2));
    match done.check().unwrap_err() {
        SpawnError::Failed { code, .. } => assert_eq!(code, 2),
        other => panic!("expected exit failure, got {other}"),
    }
}

#[test]
fn signal_death_is_distinguished() {
    let mut cmd = Command::new("sleep 30", &[]);
    cmd.start(None).expect("start sleep");
    cmd.kill().expect("kill");
    let done = cmd.wait(None).expect("reap");
    match done.check().unwrap_err() {
        SpawnError::Signaled { signal, .. } => assert_eq!(signal, 9),
        other => panic!("expected signal death, got {other}"),
    }
}

#[test]
fn wait_timeout_leaves_process_running() {
    let mut cmd = Command::new("sleep 30", &[]);
    cmd.start(None).expect("start sleep");
    let err = cmd.wait(Some(Duration::from_millis(50))).unwrap_err();
    assert!(matches!(err, SpawnError::Timeout { .. }));
    assert!(
        cmd.poll().expect("poll").is_none(),
        "process should still be alive after a timed-out wait"
    );
    cmd.kill().expect("kill");
    let done = cmd.wait(None).expect("reap");
    assert!(!done.success());
}

#[test]
fn poll_and_wait_are_idempotent_after_exit() {
    let mut cmd = Command::new("true", &[]);
    cmd.start(None).expect("start");
    let first = cmd.wait(None).expect("first wait");
    let second = cmd.wait(None).expect("second wait");
    assert_eq!(first.code(), second.code());
    assert_eq!(first.argv, second.argv);
    for _ in 0..3 {
        let status = cmd.poll().expect("poll").expect("exited");
        assert_eq!(status.code(), Some(0));
    }
}

#[test]
fn interact_stdin_accepts_send() {
    let mut cmd = Command::new("cat", &[])
        .stdin(StreamMode::Interact)
        .expect("stdin mode")
        .stdout(StreamMode::Capture)
        .expect("stdout mode");
    cmd.start(None).expect("start cat");
    cmd.send(b"line one\n").expect("send");
    cmd.send(b"line two\n").expect("send");
    // Closing the handle is the end-of-input signal.
    drop(cmd.take_input().expect("input handle"));
    let done = cmd.wait(None).expect("wait");
    assert_eq!(done.stdout.as_deref(), Some("line one\nline two\n".as_bytes()));
}

#[test]
fn eager_input_keeps_interact_handle_usable() {
    let mut cmd = Command::new("cat", &[])
        .stdin(StreamMode::Interact)
        .expect("stdin mode")
        .stdout(StreamMode::Capture)
        .expect("stdout mode");
    cmd.start(Some(b"eager\n")).expect("start cat");
    cmd.send(b"late\n").expect("send after eager input");
    drop(cmd.take_input().expect("input handle"));
    let done = cmd.wait(None).expect("wait");
    let stdout = String::from_utf8(done.stdout.expect("captured")).expect("utf8");
    assert!(stdout.contains("eager\n"), "missing eager input: {stdout:?}");
    assert!(stdout.contains("late\n"), "missing sent input: {stdout:?}");
}

#[test]
fn ignored_output_is_not_captured() {
    let mut cmd = Command::new("echo noise", &[])
        .stdout(StreamMode::Ignore)
        .expect("stdout mode");
    let done = cmd.run(None, None).expect("run");
    assert!(done.success());
    assert!(done.stdout.is_none());
}

#[test]
fn explicit_handle_redirects_to_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("out.txt");
    let file = File::create(&path).expect("create");

    let mut cmd = Command::new("echo to-file", &[])
        .stdout(StreamMode::Handle(OwnedFd::from(file)))
        .expect("stdout mode");
    let done = cmd.run(None, None).expect("run");
    assert!(done.success());
    assert_eq!(fs::read_to_string(&path).expect("read back"), "to-file\n");
}

#[test]
fn stderr_capture_is_separate() {
    let dir = TempDir::new().expect("temp dir");
    let script = dir.path().join("noisy");
    write_executable(&script, "#!/bin/sh\necho out\necho err >&2\n");

    let mut cmd = Command::new(script.to_str().expect("utf8 path"), &[])
        .stdout(StreamMode::Capture)
        .expect("stdout mode")
        .stderr(StreamMode::Capture)
        .expect("stderr mode");
    let done = cmd.run(None, None).expect("run");
    assert_eq!(done.stdout.as_deref(), Some("out\n".as_bytes()));
    assert_eq!(done.stderr.as_deref(), Some("err\n".as_bytes()));
}

#[test]
fn missing_program_is_reported() {
    let mut cmd = Command::new("definitely-not-a-real-binary-psn", &[]);
    let err = cmd.run(None, None).unwrap_err();
    assert!(matches!(err, SpawnError::CommandNotFound(_)));
}

#[test]
fn env_and_cwd_pass_through() {
    let dir = TempDir::new().expect("temp dir");
    let script = dir.path().join("show-env");
    write_executable(&script, "#!/bin/sh\nprintf '%s %s' \"$PSN_MARK\" \"$PWD\"\n");

    let mut cmd = Command::new(script.to_str().expect("utf8 path"), &[])
        .env("PSN_MARK", "set")
        .current_dir(dir.path())
        .stdout(StreamMode::Capture)
        .expect("stdout mode");
    let done = cmd.run(None, None).expect("run");
    let stdout = String::from_utf8(done.stdout.expect("captured")).expect("utf8");
    assert!(stdout.starts_with("set "), "env not forwarded: {stdout:?}");
}
