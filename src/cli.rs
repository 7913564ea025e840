// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `updater-supervisor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "updater-supervisor",
    version,
    about = "Supervise the system update engine: single instance, approvals and reporting.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        default_value = "/etc/updater-supervisor.toml"
    )]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SUPERVISOR_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Defaults to `run` with no options.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the update engine (the default).
    Run(RunArgs),
    /// Approve the pending update plan.
    Approve {
        /// Hash of the plan; approves whatever is pending when omitted.
        hash: Option<String>,
    },
    /// Deny the pending update plan.
    Deny {
        hash: Option<String>,
    },
    /// Show the supervisor state and the pending approval request.
    Status,
    /// Register a shell command to run after the updater finishes.
    Hook {
        command: String,
    },
    /// Show or change the automatic execution settings.
    Autorun(AutorunArgs),
    /// Show when updates were last checked for and last installed.
    Last,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Run supervisor in background (detach from terminal).
    #[arg(long, short = 'd')]
    pub daemon: bool,

    /// Automatic execution: do nothing when autorun is not enabled.
    #[arg(long, short = 'a')]
    pub autorun: bool,

    /// Sleep a random time of at most SECS before running (7200 when given
    /// without a value).
    #[arg(
        long,
        value_name = "SECS",
        num_args = 0..=1,
        default_missing_value = "7200"
    )]
    pub rand_sleep: Option<u64>,

    /// Make sure the engine runs at least once after now, even if another
    /// instance is already active.
    #[arg(long)]
    pub ensure_run: bool,

    /// Don't print the engine's output.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Seconds after which the engine is asked to terminate.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds after termination was requested until the engine is killed.
    #[arg(long, value_name = "SECS")]
    pub timeout_kill: Option<u64>,

    /// Reinstall every installed package.
    #[arg(long)]
    pub reinstall_all: bool,

    /// Shell command to run once the supervisor finishes (repeatable).
    #[arg(long, value_name = "CMD")]
    pub hook: Vec<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct AutorunArgs {
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    #[arg(long)]
    pub disable: bool,

    /// Require approval of update plans.
    #[arg(long, conflicts_with = "no_approvals")]
    pub approvals: bool,

    #[arg(long)]
    pub no_approvals: bool,

    /// Approve plans automatically after HOURS (0 switches it off).
    #[arg(long, value_name = "HOURS", allow_negative_numbers = true)]
    pub delay: Option<i64>,

    /// Cron expression opening the auto-approve window (repeatable).
    #[arg(long, value_name = "EXPR", requires = "window_end")]
    pub window_start: Vec<String>,

    /// Cron expression closing the auto-approve window (repeatable).
    #[arg(long, value_name = "EXPR", requires = "window_start")]
    pub window_end: Vec<String>,

    /// Remove the auto-approve window.
    #[arg(long, conflicts_with_all = ["window_start", "window_end"])]
    pub clear_window: bool,
}

impl AutorunArgs {
    pub fn changes_anything(&self) -> bool {
        self.enable
            || self.disable
            || self.approvals
            || self.no_approvals
            || self.delay.is_some()
            || !self.window_start.is_empty()
            || self.clear_window
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_runs() {
        let args = CliArgs::try_parse_from(["updater-supervisor"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.config, "/etc/updater-supervisor.toml");
    }

    #[test]
    fn rand_sleep_has_default_value() {
        let args = CliArgs::try_parse_from(["updater-supervisor", "run", "--rand-sleep"]).unwrap();
        let Some(Commands::Run(run)) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.rand_sleep, Some(7200));

        let args =
            CliArgs::try_parse_from(["updater-supervisor", "run", "--rand-sleep", "60", "-q"])
                .unwrap();
        let Some(Commands::Run(run)) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.rand_sleep, Some(60));
        assert!(run.quiet);
    }

    #[test]
    fn window_needs_both_ends() {
        assert!(
            CliArgs::try_parse_from(["updater-supervisor", "autorun", "--window-start", "0 2 * * *"])
                .is_err()
        );
        let args = CliArgs::try_parse_from([
            "updater-supervisor",
            "--config",
            "/tmp/x.toml",
            "autorun",
            "--window-start",
            "0 2 * * *",
            "--window-end",
            "0 5 * * *",
            "--delay",
            "-1",
        ])
        .unwrap();
        let Some(Commands::Autorun(autorun)) = args.command else {
            panic!("expected autorun");
        };
        assert_eq!(autorun.delay, Some(-1));
        assert!(autorun.changes_anything());
        assert_eq!(args.config, "/tmp/x.toml");
    }
}
