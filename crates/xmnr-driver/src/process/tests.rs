//! Supervision tests driving real `/bin/sh` children.

use std::os::unix::process::ExitStatusExt;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::protocol::{DriverEvent, DriverRequest};

const DEADLINE: Duration = Duration::from_secs(10);

#[fixture]
fn workdir() -> TempDir {
    tempfile::tempdir().expect("create working directory")
}

fn utf8(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path")
}

fn sh(script: &str, dir: &TempDir) -> LaunchSpec {
    LaunchSpec::new("/bin/sh", utf8(dir))
        .with_args(["-c", script])
        .with_poll_interval(Duration::from_millis(10))
}

fn drain(process: &mut DriverProcess) -> Vec<DriverEvent> {
    let started = Instant::now();
    let mut events = Vec::new();
    loop {
        assert!(started.elapsed() < DEADLINE, "driver output never closed");
        match process.receive::<DriverEvent>().expect("receive") {
            Received::Message(event) => events.push(event),
            Received::Idle => {}
            Received::Closed => return events,
        }
    }
}

fn wait_exit(process: &mut DriverProcess) -> ExitStatus {
    match process.wait(&AbortFlag::new()).expect("wait") {
        ExitOutcome::Exited(status) => status,
        ExitOutcome::Aborted => panic!("nothing requested an abort"),
    }
}

#[rstest]
fn events_are_received_until_exit(workdir: TempDir) {
    let script = r#"printf '{"kind":"progress","message":"start"}\n'
printf '{"kind":"summary","text":"done"}\n'"#;
    let mut process = DriverProcess::spawn(&sh(script, &workdir)).expect("spawn");

    let events = drain(&mut process);
    let status = wait_exit(&mut process);

    assert!(status.success());
    assert_eq!(
        events,
        vec![
            DriverEvent::Progress {
                message: "start".into()
            },
            DriverEvent::Summary {
                text: "done".into()
            },
        ]
    );
}

#[rstest]
fn request_reaches_driver_stdin(workdir: TempDir) {
    let script = r#"read -r line
case "$line" in
  *'"operation":"walk-states"'*'"rollback":"true"'*) printf '{"kind":"summary","text":"seen"}\n' ;;
  *) printf '{"kind":"error","message":"unexpected request"}\n' ;;
esac"#;
    let mut process = DriverProcess::spawn(&sh(script, &workdir)).expect("spawn");
    process
        .send(&DriverRequest::new("walk-states", "ios0").with_argument("rollback", "true"))
        .expect("send request");

    let events = drain(&mut process);

    assert_eq!(
        events,
        vec![DriverEvent::Summary {
            text: "seen".into()
        }]
    );
}

#[rstest]
fn nonzero_exit_and_stderr_are_captured(workdir: TempDir) {
    let mut process =
        DriverProcess::spawn(&sh("echo 'commit rejected' >&2; exit 2", &workdir)).expect("spawn");

    assert!(drain(&mut process).is_empty());
    let status = wait_exit(&mut process);

    assert_eq!(status.code(), Some(2));
    assert_eq!(process.stderr_output().expect("stderr"), "commit rejected\n");
    assert_eq!(process.status(), Some(status));
}

#[rstest]
fn driver_runs_in_requested_directory(workdir: TempDir) {
    let script = r#"printf '{"kind":"output","data":"%s"}\n' "$(pwd -P)""#;
    let mut process = DriverProcess::spawn(&sh(script, &workdir)).expect("spawn");

    let events = drain(&mut process);
    let expected = workdir.path().canonicalize().expect("canonical path");

    assert_eq!(
        events,
        vec![DriverEvent::Output {
            data: expected.to_string_lossy().into_owned()
        }]
    );
}

#[rstest]
fn wait_returns_when_abort_is_requested(workdir: TempDir) {
    let mut process = DriverProcess::spawn(&sh("sleep 30", &workdir)).expect("spawn");
    let abort = AbortFlag::new();
    abort.request();

    let outcome = process.wait(&abort).expect("wait");

    assert_eq!(outcome, ExitOutcome::Aborted);
    let status = process
        .terminate(Duration::from_secs(2))
        .expect("terminate");
    assert!(!status.success());
}

#[rstest]
fn terminate_stops_the_whole_group_and_is_idempotent(workdir: TempDir) {
    let mut process = DriverProcess::spawn(&sh("sleep 30 & wait", &workdir)).expect("spawn");
    let started = Instant::now();

    let first = process
        .terminate(Duration::from_secs(2))
        .expect("terminate");
    let second = process
        .terminate(Duration::from_secs(2))
        .expect("terminate again");

    assert!(started.elapsed() < DEADLINE);
    assert_eq!(first, second);
    assert_eq!(first.signal(), Some(Signal::SIGTERM as i32));
}

#[rstest]
fn terminate_escalates_when_sigterm_is_ignored(workdir: TempDir) {
    let script = "trap '' TERM; while :; do sleep 0.05; done";
    let mut process = DriverProcess::spawn(&sh(script, &workdir)).expect("spawn");
    // Give the shell time to install the trap.
    std::thread::sleep(Duration::from_millis(200));

    let status = process
        .terminate(Duration::from_millis(100))
        .expect("terminate");

    assert_eq!(status.signal(), Some(Signal::SIGKILL as i32));
}

#[rstest]
fn partial_output_is_discardable_only_until_terminate(workdir: TempDir) {
    let script = r#"printf '{"kind":"progress","mess'
sleep 30"#;
    let mut process = DriverProcess::spawn(&sh(script, &workdir)).expect("spawn");
    std::thread::sleep(Duration::from_millis(200));
    for _ in 0..3 {
        assert_eq!(process.receive::<DriverEvent>().expect("receive"), Received::Idle);
    }

    let discarded = process.discard_pending();
    process
        .terminate(Duration::from_secs(2))
        .expect("terminate");

    assert_eq!(discarded, r#"{"kind":"progress","mess"#.len());
    // Reaping drops the channel and its buffer with it.
    assert_eq!(process.discard_pending(), 0);
}

#[rstest]
fn reaped_driver_refuses_further_io(workdir: TempDir) {
    let mut process = DriverProcess::spawn(&sh("exit 0", &workdir)).expect("spawn");
    let started = Instant::now();
    while process.try_status().expect("status").is_none() {
        assert!(started.elapsed() < DEADLINE, "driver never exited");
        std::thread::sleep(Duration::from_millis(5));
    }

    let send = process.send(&DriverRequest::new("reset", "ios0"));
    let receive = process.receive::<DriverEvent>();

    assert!(matches!(send, Err(DriverError::ProcessReaped)));
    assert!(matches!(receive, Err(DriverError::ProcessReaped)));
}

#[rstest]
fn missing_binary_is_reported(workdir: TempDir) {
    let spec = LaunchSpec::new("/nonexistent/xmnr-driver", utf8(&workdir));

    let error = DriverProcess::spawn(&spec).expect_err("spawn should fail");

    assert!(matches!(error, DriverError::BinaryNotFound { .. }));
}

#[test]
fn launch_spec_clamps_zero_poll_interval() {
    let spec = LaunchSpec::new("driver", "/tmp").with_poll_interval(Duration::ZERO);
    assert_eq!(spec.poll_interval(), MIN_POLL_INTERVAL);
    assert!(spec.args().is_empty());
    assert_eq!(spec.program().as_str(), "driver");
    assert_eq!(spec.working_dir().as_str(), "/tmp");
}
