use std::path::PathBuf;

use tempfile::TempDir;
use update_supervisor::config::{ConfigFile, RawConfigFile};

/// Config plus the temporary directory every path of it points into.
pub struct TestSetup {
    pub dir: TempDir,
    pub config: ConfigFile,
}

impl TestSetup {
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts with every file inside a fresh temp dir, `true` as the update
/// command and short timeouts.
pub struct ConfigBuilder {
    dir: TempDir,
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = RawConfigFile::default();

        let paths = &mut config.paths;
        paths.lock_file = dir.path().join("supervisor.pid");
        paths.hook_file = dir.path().join("postrun-hook");
        paths.ask_file = dir.path().join("need_approval");
        paths.status_file = dir.path().join("approvals");
        paths.crash_log = dir.path().join("crash.log");
        paths.changelog = dir.path().join("changelog");
        paths.changelog_last_report = dir.path().join("changelog.last");
        paths.syslog = vec![dir.path().join("messages")];

        config.update.command = vec!["true".to_string()];
        config.update.timeout_secs = 5;
        config.update.kill_timeout_secs = 1;

        Self { dir, config }
    }

    pub fn with_command(mut self, argv: &[&str]) -> Self {
        self.config.update.command = argv.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_approvals(mut self, enabled: bool) -> Self {
        self.config.autorun.set_approvals(enabled);
        self
    }

    pub fn with_delay_hours(mut self, hours: i64) -> Self {
        self.config.autorun.set_auto_approve_delay(hours);
        self
    }

    pub fn with_window(mut self, enable: &str, disable: &str) -> Self {
        self.config
            .autorun
            .set_window(Some((vec![enable.to_string()], vec![disable.to_string()])));
        self
    }

    pub fn with_autorun(mut self, enabled: bool) -> Self {
        self.config.autorun.set_enabled(enabled);
        self
    }

    pub fn build(self) -> TestSetup {
        let config =
            ConfigFile::try_from(self.config).expect("Failed to build valid config from builder");
        TestSetup {
            dir: self.dir,
            config,
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
