// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::approvals::ApprovalGate;
use crate::changelog::Changelog;
use crate::config::ConfigFile;
use crate::errors::{Result, SupervisorError};
use crate::exec::{UpdateInvocation, UpdateOutcome, UpdateRunner};
use crate::fs::FileSystem;
use crate::hooks::HookQueue;
use crate::lock::{Acquisition, InstanceLock, off_runtime};
use crate::notify::{CrashReport, Notification, Notifier};

/// Exit code when another supervisor instance is already active.
pub const EXIT_NOT_ACTIVE: i32 = 75;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Ask an already active instance for another pass instead of just
    /// leaving it alone.
    pub ensure_run: bool,
    /// Overrides `[update] timeout-secs`.
    pub timeout: Option<Duration>,
    /// Overrides `[update] kill-timeout-secs`.
    pub kill_timeout: Option<Duration>,
    /// Mirror the engine's output.
    pub verbose: bool,
    pub reinstall_all: bool,
    /// Time the first pass evaluates approvals at; defaults to the actual
    /// time. Later passes always use the actual time.
    pub now: Option<DateTime<Local>>,
    /// Postrun hooks to register before anything runs.
    pub hooks: Vec<String>,
}

/// Runs the update engine until nobody asks for another pass.
///
/// The lock file and hook queue are always real files; approval records and
/// the changelog go through `F`.
pub struct RunLoop<F, R, N>
where
    F: FileSystem + Clone,
    R: UpdateRunner,
    N: Notifier,
{
    config: ConfigFile,
    fs: F,
    runner: R,
    notifier: N,
}

impl<F, R, N> fmt::Debug for RunLoop<F, R, N>
where
    F: FileSystem + Clone,
    R: UpdateRunner,
    N: Notifier,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoop")
            .field("config", &self.config)
            .field("fs", &self.fs)
            .finish_non_exhaustive()
    }
}

impl<F, R, N> RunLoop<F, R, N>
where
    F: FileSystem + Clone,
    R: UpdateRunner,
    N: Notifier,
{
    pub fn new(config: ConfigFile, fs: F, runner: R, notifier: N) -> Self {
        Self {
            config,
            fs,
            runner,
            notifier,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Become the active supervisor and run update passes.
    ///
    /// Returns the exit code of the last pass, or [`EXIT_NOT_ACTIVE`] when
    /// another instance is active (the hooks are then queued for it).
    pub async fn run(&mut self, opts: RunOptions) -> Result<i32> {
        let lock = InstanceLock::new(&self.config.paths.lock_file)?;
        let hooks = HookQueue::from_config(&self.config);

        let acquisition = {
            let lock = lock.clone();
            let ensure_run = opts.ensure_run;
            off_runtime(move || lock.acquire(ensure_run)).await?
        };
        let mut guard = match acquisition {
            Acquisition::Acquired(guard) => guard,
            other => {
                hooks.register_all(opts.hooks.as_slice()).await?;
                info!(?other, "another supervisor instance is active");
                return Ok(EXIT_NOT_ACTIVE);
            }
        };
        hooks.register_all(opts.hooks.as_slice()).await?;

        let gate = ApprovalGate::from_config(self.fs.clone(), &self.config);
        let changelog = Changelog::from_config(self.fs.clone(), &self.config);

        let mut now = opts.now.unwrap_or_else(Local::now);
        let exit_code = loop {
            guard.unblock_readers()?;
            self.announce_request(&gate, &now).await?;

            let approved = gate.is_pre_approved(&now)?;
            let invocation = self.invocation(&opts, approved.as_deref())?;

            self.fs.remove_file(&self.config.paths.crash_log)?;
            let outcome = self.runner.run_update(invocation).await?;
            let exit_code = outcome.exit_code;
            self.report_outcome(outcome).await?;

            self.announce_request(&gate, &Local::now()).await?;
            self.report_changes(&changelog).await?;

            guard = off_runtime(move || guard.block_readers().map(|()| guard)).await?;
            if !guard.rerun_requested() {
                break exit_code;
            }
            info!("rerunning update engine as requested");
            now = Local::now();
        };

        let ran = hooks.run_all().await?;
        debug!(hooks = ran, "postrun hooks finished");
        if let Err(e) = self.notifier.flush().await {
            warn!(error = %e, "flushing notifications failed");
        }

        guard.release()?;
        Ok(exit_code)
    }

    fn invocation(&self, opts: &RunOptions, approved: Option<&str>) -> Result<UpdateInvocation> {
        let update = &self.config.update;
        let Some((program, leading)) = update.command.split_first() else {
            return Err(SupervisorError::ConfigError(
                "update command is empty".to_string(),
            ));
        };

        let mut args = leading.to_vec();
        if self.config.autorun.approvals_enabled {
            args.push(format!(
                "--ask-approval={}",
                self.config.paths.ask_file.display()
            ));
            if let Some(hash) = approved {
                args.push(format!("--approve={hash}"));
            }
        }
        if opts.reinstall_all {
            args.push("--reinstall-all".to_string());
        }

        Ok(UpdateInvocation {
            program: program.clone(),
            args,
            timeout: opts.timeout.unwrap_or_else(|| update.timeout()),
            kill_timeout: opts.kill_timeout.unwrap_or_else(|| update.kill_timeout()),
            verbose: opts.verbose,
        })
    }

    async fn report_outcome(&mut self, outcome: UpdateOutcome) -> Result<()> {
        let crash_log_path = self.config.paths.crash_log.clone();
        let crash_log = if self.fs.is_file(&crash_log_path) {
            Some(self.fs.read_to_string(&crash_log_path)?)
        } else {
            None
        };

        match CrashReport::classify(outcome.exit_code, outcome.trace, crash_log) {
            None => {
                info!("update engine reported no errors");
                self.emit(Notification::Success).await;
            }
            Some(report) => {
                warn!(exit_code = report.exit_code, "update engine failed");
                self.emit(Notification::Crash(report)).await;
                self.fs.remove_file(&crash_log_path)?;
            }
        }
        Ok(())
    }

    async fn announce_request<Fs: FileSystem>(
        &mut self,
        gate: &ApprovalGate<Fs>,
        now: &DateTime<Local>,
    ) -> Result<()> {
        if let Some(request) = gate.refresh_status(now)? {
            let forecast = gate.forecast_next_approval(now);
            self.emit(Notification::ApprovalNeeded { request, forecast })
                .await;
        }
        Ok(())
    }

    async fn report_changes<Fs: FileSystem>(&mut self, changelog: &Changelog<Fs>) -> Result<()> {
        let transactions = changelog.unreported()?;
        let Some(newest) = transactions.iter().map(|t| t.start).max() else {
            return Ok(());
        };
        self.emit(Notification::Changes(transactions)).await;
        changelog.mark_reported(newest)
    }

    async fn emit(&mut self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(error = %e, "notification could not be delivered");
        }
    }
}
