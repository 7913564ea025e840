// tests/child_supervisor.rs

mod common;

use std::time::Duration;

use common::{init_tracing, with_timeout};
use update_supervisor::exec::ChildSupervisor;

fn sh(script: &str) -> Vec<String> {
    vec!["-c".to_string(), script.to_string()]
}

#[tokio::test]
async fn cooperative_child_is_terminated_after_timeout() {
    init_tracing();
    let mut supervisor = ChildSupervisor::new(false);
    supervisor.start("sh", &sh("exec sleep 30")).unwrap();

    let code = with_timeout(supervisor.join(Duration::from_millis(200), Duration::from_secs(5)))
        .await
        .unwrap();

    assert_eq!(code, -15);
    assert!(!supervisor.is_running());
}

#[tokio::test]
async fn stubborn_child_is_killed_after_kill_timeout() {
    init_tracing();
    let mut supervisor = ChildSupervisor::new(false);
    supervisor
        .start("sh", &sh("trap '' TERM; echo ready; exec sleep 30"))
        .unwrap();

    let code = with_timeout(
        supervisor.join(Duration::from_millis(300), Duration::from_millis(300)),
    )
    .await
    .unwrap();

    assert_eq!(code, -9);
    assert_eq!(supervisor.trace().snapshot(), "ready\n");
}

#[tokio::test]
async fn every_line_of_both_streams_is_captured_once_in_order() {
    init_tracing();
    let mut supervisor = ChildSupervisor::new(false);
    supervisor
        .start(
            "sh",
            &sh("i=1; while [ $i -le 300 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done"),
        )
        .unwrap();

    let code = with_timeout(supervisor.join(Duration::from_secs(10), Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(code, 0);

    let trace = supervisor.trace().snapshot();
    let lines: Vec<&str> = trace.lines().collect();
    assert_eq!(lines.len(), 600);

    let expected_out: Vec<String> = (1..=300).map(|i| format!("out{i}")).collect();
    let expected_err: Vec<String> = (1..=300).map(|i| format!("err{i}")).collect();
    let out: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("out")).collect();
    let err: Vec<&str> = lines.iter().copied().filter(|l| l.starts_with("err")).collect();
    assert_eq!(out, expected_out);
    assert_eq!(err, expected_err);
}

#[tokio::test]
async fn missing_program_fails_to_start() {
    init_tracing();
    let mut supervisor = ChildSupervisor::new(false);
    assert!(
        supervisor
            .start("/nonexistent/update-engine", &[])
            .is_err()
    );
    assert!(!supervisor.is_running());
}
