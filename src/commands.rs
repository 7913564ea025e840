// src/commands.rs

//! Subcommands other than `run`. Each one writes its report to `out`.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};

use crate::approvals::{ApprovalGate, ApproveWindow};
use crate::cli::AutorunArgs;
use crate::config::{ConfigFile, RawConfigFile, load_from_path, save_to_path};
use crate::fs::RealFileSystem;
use crate::hooks::{HookQueue, Registration};
use crate::msgtrace;
use crate::updater_supervised;

pub fn approve(cfg: &ConfigFile, hash: Option<&str>, out: &mut impl Write) -> Result<i32> {
    let gate = ApprovalGate::from_config(RealFileSystem, cfg);
    gate.approve(hash)?;
    writeln!(out, "Pending update approved.")?;
    Ok(0)
}

pub fn deny(cfg: &ConfigFile, hash: Option<&str>, out: &mut impl Write) -> Result<i32> {
    let gate = ApprovalGate::from_config(RealFileSystem, cfg);
    gate.deny(hash)?;
    writeln!(out, "Pending update denied.")?;
    Ok(0)
}

pub fn status(cfg: &ConfigFile, out: &mut impl Write) -> Result<i32> {
    let running = updater_supervised(cfg)?;
    writeln!(
        out,
        "Supervisor: {}",
        if running { "running" } else { "not running" }
    )?;

    let gate = ApprovalGate::from_config(RealFileSystem, cfg);
    let Some(request) = gate.current()? else {
        writeln!(out, "No approval pending.")?;
        return Ok(0);
    };

    writeln!(out, "Approval request {} ({})", request.hash, request.status)?;
    for pkg in &request.plan {
        writeln!(
            out,
            "  {} {} {}",
            pkg.op,
            pkg.name,
            pkg.new_version.as_deref().unwrap_or("-")
        )?;
    }
    if let Some(asked) = Local.timestamp_opt(request.time, 0).single() {
        writeln!(out, "Requested at {}", asked.to_rfc3339())?;
        match gate.forecast_next_approval(&asked) {
            Some(at) => writeln!(out, "Auto-approval after {}", at.to_rfc3339())?,
            None => writeln!(out, "Requires manual approval")?,
        }
    }
    Ok(0)
}

pub async fn hook(cfg: &ConfigFile, command: &str, out: &mut impl Write) -> Result<i32> {
    match HookQueue::from_config(cfg).register(command).await? {
        Registration::Queued => {
            writeln!(out, "Hook queued; it runs when the updater finishes.")?;
            Ok(0)
        }
        Registration::RanImmediately { exit_code } => {
            writeln!(out, "Updater is not running; hook ran with exit code {exit_code}.")?;
            Ok(exit_code)
        }
    }
}

/// Print the autorun settings, or change them and save the config.
pub fn autorun(config_path: &Path, args: &AutorunArgs, out: &mut impl Write) -> Result<i32> {
    let mut raw = load_from_path(config_path)?;
    if args.changes_anything() {
        apply_autorun_args(&mut raw, args);
        let cfg = ConfigFile::try_from(raw)?;
        save_to_path(config_path, &cfg)?;
        print_autorun(&cfg, out)?;
    } else {
        print_autorun(&ConfigFile::try_from(raw)?, out)?;
    }
    Ok(0)
}

fn apply_autorun_args(raw: &mut RawConfigFile, args: &AutorunArgs) {
    let autorun = &mut raw.autorun;
    if args.enable || args.disable {
        autorun.set_enabled(args.enable);
    }
    if args.approvals || args.no_approvals {
        autorun.set_approvals(args.approvals);
    }
    if let Some(hours) = args.delay {
        autorun.set_auto_approve_delay(hours);
    }
    if args.clear_window {
        autorun.set_window(None);
    } else if !args.window_start.is_empty() {
        autorun.set_window(Some((args.window_start.clone(), args.window_end.clone())));
    }
}

fn print_autorun(cfg: &ConfigFile, out: &mut impl Write) -> Result<()> {
    let autorun = &cfg.autorun;
    let on_off = |b: bool| if b { "enabled" } else { "disabled" };
    writeln!(
        out,
        "Autorun: {}",
        on_off(autorun.autorun_enabled == Some(true))
    )?;
    writeln!(out, "Approvals: {}", on_off(autorun.approvals_enabled))?;
    match autorun.auto_approve_delay() {
        Some(delay) => writeln!(out, "Auto-approve delay: {} hours", delay.num_hours())?,
        None => writeln!(out, "Auto-approve delay: off")?,
    }
    match ApproveWindow::from_config(autorun) {
        Some(window) => {
            writeln!(out, "Auto-approve window:")?;
            for expr in window.enables() {
                writeln!(out, "  opens  {expr}")?;
            }
            for expr in window.disables() {
                writeln!(out, "  closes {expr}")?;
            }
            if let Some(span) = window.next_window(&Local::now()) {
                writeln!(out, "  next   {}", describe_span(&span.start, span.end.as_ref()))?;
            }
        }
        None => writeln!(out, "Auto-approve window: none")?,
    }
    Ok(())
}

fn describe_span(start: &DateTime<Local>, end: Option<&DateTime<Local>>) -> String {
    match end {
        Some(end) => format!("{} .. {}", start.to_rfc3339(), end.to_rfc3339()),
        None => format!("{} ..", start.to_rfc3339()),
    }
}

pub fn last(cfg: &ConfigFile, out: &mut impl Write) -> Result<i32> {
    let show = |d: Option<chrono::NaiveDateTime>| {
        d.map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    };
    writeln!(out, "Last check: {}", show(msgtrace::last_check(&cfg.paths.syslog)?))?;
    writeln!(out, "Last run: {}", show(msgtrace::last_run(&cfg.paths.syslog)?))?;
    Ok(0)
}
