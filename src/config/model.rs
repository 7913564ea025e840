// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raw configuration as read from TOML, before validation.
///
/// ```toml
/// [paths]
/// lock-file = "/var/run/updater-supervisor.pid"
///
/// [update]
/// command = ["pkgupdate", "--batch", "--state-log"]
/// timeout-secs = 3000
///
/// [autorun]
/// autorun-enabled = true
/// approvals-enabled = true
/// auto-approve-delay-hours = 24
/// auto-approve-enable-triggers = ["0 2 * * *"]
/// auto-approve-disable-triggers = ["0 5 * * *"]
///
/// [notify]
/// command = ["create_notification"]
/// flush-command = ["notifier"]
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfigFile {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub update: UpdateSection,
    #[serde(default)]
    pub autorun: AutorunSection,
    #[serde(default)]
    pub notify: NotifySection,
}

/// Validated configuration. Construct through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub update: UpdateSection,
    pub autorun: AutorunSection,
    pub notify: NotifySection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        paths: PathsSection,
        update: UpdateSection,
        autorun: AutorunSection,
        notify: NotifySection,
    ) -> Self {
        Self {
            paths,
            update,
            autorun,
            notify,
        }
    }

    pub fn into_raw(self) -> RawConfigFile {
        RawConfigFile {
            paths: self.paths,
            update: self.update,
            autorun: self.autorun,
            notify: self.notify,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let raw = RawConfigFile::default();
        Self::new_unchecked(raw.paths, raw.update, raw.autorun, raw.notify)
    }
}

/// `[paths]` section: every file the supervisor touches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PathsSection {
    pub lock_file: PathBuf,
    pub hook_file: PathBuf,
    /// Written by the update engine when it wants a plan approved.
    pub ask_file: PathBuf,
    /// Owned by the supervisor: `hash status unix-time`.
    pub status_file: PathBuf,
    /// Present after an internal crash of the update engine.
    pub crash_log: PathBuf,
    pub changelog: PathBuf,
    /// Start time of the last transaction we told the user about.
    pub changelog_last_report: PathBuf,
    /// System logs searched by `last`, newest first.
    pub syslog: Vec<PathBuf>,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            lock_file: PathBuf::from("/var/run/updater-supervisor.pid"),
            hook_file: PathBuf::from("/var/run/updater-postrun-hook"),
            ask_file: PathBuf::from("/usr/share/updater/need_approval"),
            status_file: PathBuf::from("/usr/share/updater/approvals"),
            crash_log: PathBuf::from("/tmp/updater_crash.log"),
            changelog: PathBuf::from("/usr/share/updater/changelog"),
            changelog_last_report: PathBuf::from("/usr/share/updater/changelog.last"),
            syslog: vec![
                PathBuf::from("/var/log/messages"),
                PathBuf::from("/var/log/messages.1"),
            ],
        }
    }
}

/// `[update]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UpdateSection {
    /// Program and leading arguments of the update engine.
    pub command: Vec<String>,
    /// Graceful termination is requested after this many seconds.
    pub timeout_secs: u64,
    /// The engine is killed this many seconds after termination was requested.
    pub kill_timeout_secs: u64,
}

impl UpdateSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            command: vec![
                "pkgupdate".to_string(),
                "--batch".to_string(),
                "--state-log".to_string(),
            ],
            timeout_secs: 3000,
            kill_timeout_secs: 60,
        }
    }
}

/// `[autorun]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AutorunSection {
    /// `None` when nobody configured it yet; treated as disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autorun_enabled: Option<bool>,
    pub approvals_enabled: bool,
    /// Zero disables delayed auto-approval.
    pub auto_approve_delay_hours: u64,
    pub auto_approve_enable_triggers: Vec<String>,
    pub auto_approve_disable_triggers: Vec<String>,
}

impl AutorunSection {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.autorun_enabled = Some(enabled);
    }

    pub fn set_approvals(&mut self, enabled: bool) {
        self.approvals_enabled = enabled;
    }

    /// Non-positive values switch the delay off.
    pub fn set_auto_approve_delay(&mut self, hours: i64) {
        self.auto_approve_delay_hours = u64::try_from(hours).unwrap_or(0);
    }

    /// `None` removes the window altogether.
    pub fn set_window(&mut self, window: Option<(Vec<String>, Vec<String>)>) {
        let (enable, disable) = window.unwrap_or_default();
        self.auto_approve_enable_triggers = enable;
        self.auto_approve_disable_triggers = disable;
    }

    pub fn auto_approve_delay(&self) -> Option<chrono::Duration> {
        if self.auto_approve_delay_hours == 0 {
            return None;
        }
        i64::try_from(self.auto_approve_delay_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
    }

    /// A window only exists when both trigger lists are non-empty.
    pub fn has_window(&self) -> bool {
        !self.auto_approve_enable_triggers.is_empty()
            && !self.auto_approve_disable_triggers.is_empty()
    }
}

/// `[notify]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NotifySection {
    /// Argv prefix of the notification creation program.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Run once after all postrun hooks to deliver collected notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flush_command: Option<Vec<String>>,
}
