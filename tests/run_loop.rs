// tests/run_loop.rs

mod common;

use std::fs;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use common::{ConfigBuilder, FakeRunner, RecordingNotifier, TestSetup, init_tracing, write_file};
use update_supervisor::engine::{EXIT_NOT_ACTIVE, RunLoop, RunOptions};
use update_supervisor::fs::RealFileSystem;
use update_supervisor::lock::ExclusiveLock;
use update_supervisor::notify::{CrashKind, Notification};

const T0: i64 = 1_700_000_000;

fn t0() -> DateTime<Local> {
    Local.timestamp_opt(T0, 0).unwrap()
}

fn opts() -> RunOptions {
    RunOptions {
        now: Some(t0()),
        ..RunOptions::default()
    }
}

async fn run(
    setup: &TestSetup,
    runner: FakeRunner,
    notifier: &RecordingNotifier,
    opts: RunOptions,
) -> i32 {
    let mut run_loop = RunLoop::new(
        setup.config.clone(),
        RealFileSystem,
        runner,
        notifier.clone(),
    );
    run_loop.run(opts).await.unwrap()
}

#[tokio::test]
async fn successful_run_reports_and_runs_hooks() {
    init_tracing();
    let setup = ConfigBuilder::new().build();
    let marker = setup.path("hook-ran");
    let runner = FakeRunner::new();
    let invocations = runner.invocations();
    let notifier = RecordingNotifier::new();

    let options = RunOptions {
        hooks: vec![format!("touch {}", marker.display())],
        ..opts()
    };
    let code = run(&setup, runner, &notifier, options).await;

    assert_eq!(code, 0);
    assert_eq!(notifier.events(), vec![Notification::Success]);
    assert_eq!(notifier.flushes(), 1);
    assert!(marker.exists());
    assert!(!setup.config.paths.lock_file.exists());
    assert!(!setup.config.paths.hook_file.exists());

    let invocations = invocations.lock().unwrap();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].program, "true");
    assert!(invocations[0].args.is_empty());
    assert!(!invocations[0].verbose);
}

#[tokio::test]
async fn internal_crash_is_reported_with_crash_log() {
    init_tracing();
    let setup = ConfigBuilder::new().build();
    let crash_log = setup.config.paths.crash_log.clone();
    let runner = FakeRunner::new()
        .with_outcome(1, "some output")
        .on_run(move |_| write_file(&crash_log, "lua stack trace"));
    let notifier = RecordingNotifier::new();

    let code = run(&setup, runner, &notifier, opts()).await;

    assert_eq!(code, 1);
    match notifier.events().as_slice() {
        [Notification::Crash(report)] => {
            assert_eq!(report.exit_code, 1);
            assert_eq!(
                report.kind,
                CrashKind::Internal {
                    crash_log: "lua stack trace".to_string()
                }
            );
        }
        other => panic!("unexpected events: {other:?}"),
    }
    assert!(!setup.config.paths.crash_log.exists());
}

#[tokio::test]
async fn stale_crash_log_is_cleared_before_running() {
    init_tracing();
    let setup = ConfigBuilder::new().build();
    write_file(&setup.config.paths.crash_log, "from an old run");
    let runner = FakeRunner::new().with_outcome(1, "");
    let notifier = RecordingNotifier::new();

    run(&setup, runner, &notifier, opts()).await;

    match notifier.events().as_slice() {
        [Notification::Crash(report)] => assert_eq!(report.kind, CrashKind::PackageFailure),
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn abnormal_exit_carries_trace() {
    init_tracing();
    let setup = ConfigBuilder::new().build();
    let runner = FakeRunner::new().with_outcome(-9, "partial output\n");
    let notifier = RecordingNotifier::new();

    let code = run(&setup, runner, &notifier, opts()).await;

    assert_eq!(code, -9);
    match notifier.events().as_slice() {
        [Notification::Crash(report)] => assert_eq!(
            report.kind,
            CrashKind::Abnormal {
                trace: "partial output\n".to_string()
            }
        ),
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn granted_plan_is_passed_to_engine() {
    init_tracing();
    let setup = ConfigBuilder::new().with_approvals(true).build();
    write_file(
        &setup.config.paths.ask_file,
        "abc\nupgrade\t2.0\tfoo\tnone\n",
    );
    write_file(
        &setup.config.paths.status_file,
        &format!("abc granted {}", T0 - 60),
    );
    let runner = FakeRunner::new();
    let invocations = runner.invocations();
    let notifier = RecordingNotifier::new();

    run(&setup, runner, &notifier, opts()).await;

    let invocations = invocations.lock().unwrap();
    assert_eq!(
        invocations[0].args,
        vec![
            format!("--ask-approval={}", setup.config.paths.ask_file.display()),
            "--approve=abc".to_string(),
        ]
    );
    assert_eq!(notifier.events(), vec![Notification::Success]);
}

#[tokio::test]
async fn new_request_is_announced_with_forecast() {
    init_tracing();
    let setup = ConfigBuilder::new()
        .with_approvals(true)
        .with_delay_hours(24)
        .build();
    write_file(
        &setup.config.paths.ask_file,
        "h1\ninstall\t1.0\tfoo\tdelayed\n",
    );
    let runner = FakeRunner::new();
    let invocations = runner.invocations();
    let notifier = RecordingNotifier::new();

    run(&setup, runner, &notifier, opts()).await;

    let events = notifier.events();
    match events.as_slice() {
        [
            Notification::ApprovalNeeded { request, forecast },
            Notification::Success,
        ] => {
            assert_eq!(request.hash, "h1");
            assert_eq!(request.plan.len(), 1);
            assert_eq!(*forecast, Some(t0() + chrono::Duration::hours(24)));
        }
        other => panic!("unexpected events: {other:?}"),
    }
    assert_eq!(
        fs::read_to_string(&setup.config.paths.status_file).unwrap(),
        format!("h1 asked {T0}")
    );
    let invocations = invocations.lock().unwrap();
    let args = &invocations[0].args;
    assert!(!args.iter().any(|a| a.starts_with("--approve=")));
}

#[tokio::test]
async fn elapsed_delay_approves_automatically() {
    init_tracing();
    let setup = ConfigBuilder::new()
        .with_approvals(true)
        .with_delay_hours(24)
        .build();
    write_file(&setup.config.paths.ask_file, "h1\n");
    write_file(
        &setup.config.paths.status_file,
        &format!("h1 asked {}", T0 - 25 * 3600),
    );
    let runner = FakeRunner::new();
    let invocations = runner.invocations();
    let notifier = RecordingNotifier::new();

    run(&setup, runner, &notifier, opts()).await;

    let invocations = invocations.lock().unwrap();
    let args = &invocations[0].args;
    assert!(args.contains(&"--approve=h1".to_string()));
}

#[tokio::test]
async fn denied_plan_is_not_approved() {
    init_tracing();
    let setup = ConfigBuilder::new()
        .with_approvals(true)
        .with_delay_hours(1)
        .build();
    write_file(&setup.config.paths.ask_file, "h1\n");
    write_file(
        &setup.config.paths.status_file,
        &format!("h1 denied {}", T0 - 25 * 3600),
    );
    let runner = FakeRunner::new();
    let invocations = runner.invocations();
    let notifier = RecordingNotifier::new();

    run(&setup, runner, &notifier, opts()).await;

    let invocations = invocations.lock().unwrap();
    let args = &invocations[0].args;
    assert!(!args.iter().any(|a| a.starts_with("--approve=")));
}

#[tokio::test]
async fn changes_are_reported_once() {
    init_tracing();
    let setup = ConfigBuilder::new().build();
    let changelog = setup.config.paths.changelog.clone();
    let notifier = RecordingNotifier::new();

    let runner = FakeRunner::new().on_run(move |_| {
        write_file(&changelog, "START\t100\nPKG\tfoo\t\t1.0\nEND\t110\n");
    });
    run(&setup, runner, &notifier, opts()).await;

    match notifier.events().as_slice() {
        [Notification::Success, Notification::Changes(transactions)] => {
            assert_eq!(transactions.len(), 1);
            assert_eq!(transactions[0].changes[0].name, "foo");
        }
        other => panic!("unexpected events: {other:?}"),
    }
    assert_eq!(
        fs::read_to_string(&setup.config.paths.changelog_last_report).unwrap(),
        "100"
    );

    let notifier = RecordingNotifier::new();
    run(&setup, FakeRunner::new(), &notifier, opts()).await;
    assert_eq!(notifier.events(), vec![Notification::Success]);
}

#[tokio::test]
async fn overrides_reach_the_engine() {
    init_tracing();
    let setup = ConfigBuilder::new()
        .with_command(&["pkgupdate", "--batch"])
        .build();
    let runner = FakeRunner::new();
    let invocations = runner.invocations();

    let options = RunOptions {
        timeout: Some(Duration::from_secs(7)),
        verbose: true,
        reinstall_all: true,
        ..opts()
    };
    run(&setup, runner, &RecordingNotifier::new(), options).await;

    let invocation = invocations.lock().unwrap()[0].clone();
    assert_eq!(invocation.program, "pkgupdate");
    assert_eq!(invocation.args, vec!["--batch", "--reinstall-all"]);
    assert_eq!(invocation.timeout, Duration::from_secs(7));
    assert_eq!(invocation.kill_timeout, Duration::from_secs(1));
    assert!(invocation.verbose);
}

#[tokio::test]
async fn active_instance_gets_the_hooks() {
    init_tracing();
    let setup = ConfigBuilder::new().build();

    // Pretend to be another supervisor: hold the lock with our own (live) pid.
    let mut other = ExclusiveLock::new(&setup.config.paths.lock_file);
    assert!(
        other
            .acquire(false, std::process::id().to_string().as_bytes())
            .unwrap()
    );
    other.downgrade().unwrap();

    let runner = FakeRunner::new();
    let invocations = runner.invocations();
    let notifier = RecordingNotifier::new();
    let options = RunOptions {
        hooks: vec!["echo queued".to_string()],
        ..opts()
    };

    let code = run(&setup, runner, &notifier, options).await;

    assert_eq!(code, EXIT_NOT_ACTIVE);
    assert!(invocations.lock().unwrap().is_empty());
    assert!(notifier.events().is_empty());
    assert_eq!(
        fs::read_to_string(&setup.config.paths.hook_file).unwrap(),
        "echo queued\n"
    );

    other.release().unwrap();
}
