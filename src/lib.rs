// src/lib.rs

pub mod approvals;
pub mod changelog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod hooks;
pub mod lock;
pub mod logging;
pub mod msgtrace;
pub mod notify;
pub mod prerun;
pub mod types;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, info};

use crate::approvals::ApproveWindow;
use crate::cli::{CliArgs, Commands, RunArgs};
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::engine::{RunLoop, RunOptions};
use crate::errors::SupervisorError;
use crate::exec::SupervisedRunner;
use crate::fs::RealFileSystem;
use crate::lock::ExclusiveLock;
use crate::notify::notifier_from_config;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// `run` daemonizes (when asked to) before the Tokio runtime exists, so the
/// runtime is built here instead of in `main`.
pub fn run(args: CliArgs) -> Result<i32> {
    let config_path = PathBuf::from(&args.config);
    let command = args
        .command
        .unwrap_or_else(|| Commands::Run(RunArgs::default()));
    let mut out = io::stdout();

    match command {
        Commands::Run(run_args) => {
            let cfg = load_and_validate(&config_path)?;
            run_updater(cfg, run_args)
        }
        Commands::Approve { hash } => {
            let cfg = load_and_validate(&config_path)?;
            commands::approve(&cfg, hash.as_deref(), &mut out)
        }
        Commands::Deny { hash } => {
            let cfg = load_and_validate(&config_path)?;
            commands::deny(&cfg, hash.as_deref(), &mut out)
        }
        Commands::Status => {
            let cfg = load_and_validate(&config_path)?;
            commands::status(&cfg, &mut out)
        }
        Commands::Hook { command } => {
            let cfg = load_and_validate(&config_path)?;
            runtime()?.block_on(commands::hook(&cfg, &command, &mut out))
        }
        Commands::Autorun(autorun_args) => {
            commands::autorun(&config_path, &autorun_args, &mut out)
        }
        Commands::Last => {
            let cfg = load_and_validate(&config_path)?;
            commands::last(&cfg, &mut out)
        }
    }
}

/// Whether some supervisor instance is running right now.
pub fn updater_supervised(cfg: &ConfigFile) -> errors::Result<bool> {
    ExclusiveLock::query_held(&cfg.paths.lock_file)
}

/// Fails with [`SupervisorError::Disabled`] unless automatic runs were
/// explicitly enabled.
pub fn ensure_autorun_enabled(cfg: &ConfigFile) -> errors::Result<()> {
    match cfg.autorun.autorun_enabled {
        Some(true) => Ok(()),
        _ => Err(SupervisorError::Disabled),
    }
}

fn run_updater(cfg: ConfigFile, args: RunArgs) -> Result<i32> {
    if args.autorun {
        if let Err(SupervisorError::Disabled) = ensure_autorun_enabled(&cfg) {
            println!("Updater autorun disabled.");
            return Ok(0);
        }
    }

    if args.daemon {
        nix::unistd::daemon(false, true).context("daemonizing supervisor")?;
        debug!(pid = std::process::id(), "running in background");
    }

    runtime()?.block_on(async move {
        let mut now = None;
        if let Some(max) = args.rand_sleep.filter(|secs| *secs > 0) {
            let max = chrono::Duration::from_std(std::time::Duration::from_secs(max))
                .context("random sleep is out of range")?;
            let window = ApproveWindow::from_config(&cfg.autorun);
            let plan = prerun::sleep_bounds(&Local::now(), max, window.as_ref());
            prerun::random_sleep(&plan).await;
            now = Some(plan.effective_now(Local::now()));
        }

        let opts = RunOptions {
            ensure_run: args.ensure_run,
            timeout: args.timeout.map(std::time::Duration::from_secs),
            kill_timeout: args.timeout_kill.map(std::time::Duration::from_secs),
            verbose: !args.quiet,
            reinstall_all: args.reinstall_all,
            now,
            hooks: args.hook,
        };

        let notifier = notifier_from_config(&cfg);
        let mut run_loop = RunLoop::new(cfg, RealFileSystem, SupervisedRunner, notifier);
        let exit_code = run_loop.run(opts).await?;
        info!(exit_code, "supervisor finished");
        Ok::<_, anyhow::Error>(exit_code)
    })
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building Tokio runtime")
}
