// src/config/validate.rs

use crate::approvals::window::compile_trigger;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SupervisorError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SupervisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.paths,
            raw.update,
            raw.autorun,
            raw.notify,
        ))
    }
}

/// Upper bound for `auto-approve-delay-hours`, about ten years.
pub const MAX_AUTO_APPROVE_DELAY_HOURS: u64 = 10 * 366 * 24;

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_update(cfg)?;
    validate_delay(cfg)?;
    validate_triggers(cfg)?;
    validate_notify(cfg)?;
    Ok(())
}

fn validate_update(cfg: &RawConfigFile) -> Result<()> {
    match cfg.update.command.first() {
        Some(program) if !program.trim().is_empty() => {}
        _ => {
            return Err(SupervisorError::ConfigError(
                "[update].command must name the update program".to_string(),
            ));
        }
    }

    if cfg.update.timeout_secs == 0 {
        return Err(SupervisorError::ConfigError(
            "[update].timeout-secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.update.kill_timeout_secs == 0 {
        return Err(SupervisorError::ConfigError(
            "[update].kill-timeout-secs must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_delay(cfg: &RawConfigFile) -> Result<()> {
    let hours = cfg.autorun.auto_approve_delay_hours;
    if hours > MAX_AUTO_APPROVE_DELAY_HOURS {
        return Err(SupervisorError::ConfigError(format!(
            "[autorun].auto-approve-delay-hours must be <= {MAX_AUTO_APPROVE_DELAY_HOURS} (got {hours})"
        )));
    }
    Ok(())
}

fn validate_triggers(cfg: &RawConfigFile) -> Result<()> {
    let autorun = &cfg.autorun;
    for expr in autorun
        .auto_approve_enable_triggers
        .iter()
        .chain(autorun.auto_approve_disable_triggers.iter())
    {
        compile_trigger(expr)?;
    }
    Ok(())
}

fn validate_notify(cfg: &RawConfigFile) -> Result<()> {
    for (key, argv) in [
        ("command", &cfg.notify.command),
        ("flush-command", &cfg.notify.flush_command),
    ] {
        if let Some(argv) = argv {
            if argv.is_empty() {
                return Err(SupervisorError::ConfigError(format!(
                    "[notify].{key} must not be an empty list; omit it instead"
                )));
            }
        }
    }
    Ok(())
}
