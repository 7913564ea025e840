// src/exec/supervisor.rs

//! Supervised execution of the update engine.
//!
//! `start` spawns the child with stdin on `/dev/null` and one reader task
//! per output stream. `join` waits with a two stage deadline: after
//! `timeout` the child gets `SIGTERM`, after a further `kill_timeout` it gets
//! `SIGKILL`.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::Context;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::errors::{Result, SupervisorError};
use crate::exec::trace::ExecutionTrace;

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
pub struct ChildSupervisor {
    verbose: bool,
    trace: ExecutionTrace,
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
}

impl ChildSupervisor {
    /// With `verbose` the child's output is mirrored to our own
    /// stdout/stderr as it arrives.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            trace: ExecutionTrace::new(),
            child: None,
            readers: Vec::new(),
        }
    }

    pub fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn start(&mut self, program: &str, args: &[String]) -> Result<()> {
        if self.child.is_some() {
            return Err(SupervisorError::Usage(
                "update process is already running".to_string(),
            ));
        }
        self.trace.clear();

        info!(program, ?args, "starting update process");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning update process '{program}'"))?;

        if let Some(stdout) = child.stdout.take() {
            self.readers.push(tokio::spawn(pump(
                stdout,
                tokio::io::stdout(),
                self.trace.clone(),
                Stream::Stdout,
                self.verbose,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            self.readers.push(tokio::spawn(pump(
                stderr,
                tokio::io::stderr(),
                self.trace.clone(),
                Stream::Stderr,
                self.verbose,
            )));
        }

        self.child = Some(child);
        Ok(())
    }

    /// Wait for the child and both readers; returns the exit code
    /// (`-signal` when the child was killed by a signal).
    pub async fn join(&mut self, timeout: Duration, kill_timeout: Duration) -> Result<i32> {
        let child = self.child.as_mut().ok_or_else(|| {
            SupervisorError::Usage("join called without a started update process".to_string())
        })?;

        let status = match time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "update process timed out; terminating it"
                );
                terminate(child);
                match time::timeout(kill_timeout, child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(
                            kill_timeout_secs = kill_timeout.as_secs(),
                            "update process ignored termination; killing it"
                        );
                        child.start_kill()?;
                        child.wait().await?
                    }
                }
            }
        };
        self.child = None;

        for reader in self.readers.drain(..) {
            if let Err(e) = reader.await {
                warn!(error = %e, "output reader task failed");
            }
        }

        let code = exit_code(status);
        debug!(exit_code = code, "update process finished");
        Ok(code)
    }
}

impl Drop for ChildSupervisor {
    fn drop(&mut self) {
        // Never leave the update engine running behind our back.
        if let Some(child) = self.child.as_ref() {
            terminate(child);
        }
    }
}

fn terminate(child: &Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(pid, error = %e, "failed to send SIGTERM to update process");
    }
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

async fn pump<R, W>(source: R, mut mirror: W, trace: ExecutionTrace, stream: Stream, verbose: bool)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                trace.append(&String::from_utf8_lossy(&buf));
                if verbose {
                    if let Err(e) = mirror_line(&mut mirror, &buf).await {
                        debug!(?stream, error = %e, "failed to mirror update output");
                    }
                }
            }
            Err(e) => {
                warn!(?stream, error = %e, "failed reading update output");
                break;
            }
        }
    }
}

async fn mirror_line<W: AsyncWrite + Unpin>(out: &mut W, line: &[u8]) -> std::io::Result<()> {
    out.write_all(line).await?;
    out.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn double_start_is_usage_error() {
        let mut sup = ChildSupervisor::new(false);
        sup.start("sh", &sh("exec sleep 5")).unwrap();
        let err = sup.start("sh", &sh("true")).unwrap_err();
        assert!(matches!(err, SupervisorError::Usage(_)));
        assert!(sup.is_running());
    }

    #[tokio::test]
    async fn join_without_start_is_usage_error() {
        let mut sup = ChildSupervisor::new(false);
        let err = sup
            .join(Duration::from_secs(1), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Usage(_)));
    }

    #[tokio::test]
    async fn exit_code_and_both_streams_are_captured() {
        let mut sup = ChildSupervisor::new(false);
        sup.start("sh", &sh("echo out; echo err >&2; exit 3")).unwrap();
        let code = sup
            .join(Duration::from_secs(10), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(code, 3);
        let trace = sup.trace().snapshot();
        assert!(trace.contains("out\n"));
        assert!(trace.contains("err\n"));
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn restart_resets_trace() {
        let mut sup = ChildSupervisor::new(false);
        sup.start("sh", &sh("echo first")).unwrap();
        sup.join(Duration::from_secs(10), Duration::from_secs(1))
            .await
            .unwrap();
        sup.start("sh", &sh("echo second")).unwrap();
        sup.join(Duration::from_secs(10), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(sup.trace().snapshot(), "second\n");
    }

    #[test]
    fn signal_death_is_negative() {
        assert_eq!(exit_code(ExitStatus::from_raw(9)), -9);
        assert_eq!(exit_code(ExitStatus::from_raw(2 << 8)), 2);
    }
}
