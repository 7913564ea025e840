// src/approvals/gate.rs

//! Decides whether the pending plan may be applied without a human.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone};
use tracing::{debug, info};

use crate::approvals::request::{ApprovalRequest, AskFile, StatusRecord};
use crate::approvals::window::ApproveWindow;
use crate::config::{AutorunSection, ConfigFile};
use crate::errors::{Result, SupervisorError};
use crate::fs::FileSystem;
use crate::types::ApprovalStatus;

/// Auto-approval settings taken from `[autorun]`.
#[derive(Debug, Clone, Default)]
pub struct GatePolicy {
    pub approvals_enabled: bool,
    pub delay: Option<Duration>,
    pub window: Option<ApproveWindow>,
}

impl GatePolicy {
    pub fn from_config(autorun: &AutorunSection) -> Self {
        Self {
            approvals_enabled: autorun.approvals_enabled,
            delay: autorun.auto_approve_delay(),
            window: ApproveWindow::from_config(autorun),
        }
    }

    /// Whether anything besides an explicit `approve` can grant a request.
    pub fn auto_approves(&self) -> bool {
        self.delay.is_some() || self.window.is_some()
    }
}

#[derive(Debug)]
pub struct ApprovalGate<F: FileSystem> {
    fs: F,
    ask_file: PathBuf,
    status_file: PathBuf,
    policy: GatePolicy,
}

impl<F: FileSystem> ApprovalGate<F> {
    pub fn new(
        fs: F,
        ask_file: impl Into<PathBuf>,
        status_file: impl Into<PathBuf>,
        policy: GatePolicy,
    ) -> Self {
        Self {
            fs,
            ask_file: ask_file.into(),
            status_file: status_file.into(),
            policy,
        }
    }

    pub fn from_config(fs: F, cfg: &ConfigFile) -> Self {
        Self::new(
            fs,
            &cfg.paths.ask_file,
            &cfg.paths.status_file,
            GatePolicy::from_config(&cfg.autorun),
        )
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    pub fn approvals_enabled(&self) -> bool {
        self.policy.approvals_enabled
    }

    pub fn ask_file(&self) -> &Path {
        &self.ask_file
    }

    /// The pending request, if approvals are enabled and both files agree.
    pub fn current(&self) -> Result<Option<ApprovalRequest>> {
        if !self.policy.approvals_enabled {
            return Ok(None);
        }
        let (Some(ask), Some(status)) = (self.read_ask()?, self.read_status()?) else {
            return Ok(None);
        };
        Ok(ApprovalRequest::combine(ask, status))
    }

    /// Hash of the plan that may be applied right now, if any.
    pub fn is_pre_approved<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<Option<String>> {
        let Some(request) = self.current()? else {
            return Ok(None);
        };

        let approved = match request.status {
            ApprovalStatus::Granted => true,
            ApprovalStatus::Denied => false,
            ApprovalStatus::Asked => self.auto_approved(request.time, now),
        };

        if approved {
            debug!(hash = %request.hash, status = %request.status, "plan is approved");
        }
        Ok(approved.then_some(request.hash))
    }

    /// Configured delay and window must both agree; either alone suffices
    /// when the other one is not configured.
    fn auto_approved<Tz: TimeZone>(&self, asked_at: i64, now: &DateTime<Tz>) -> bool {
        if !self.policy.auto_approves() {
            return false;
        }
        let delay_elapsed = self
            .policy
            .delay
            .is_none_or(|delay| now.timestamp() > asked_at.saturating_add(delay.num_seconds()));
        let window_open = self
            .policy
            .window
            .as_ref()
            .is_none_or(|window| window.in_window(now));
        delay_elapsed && window_open
    }

    /// Earliest instant a request asked at `now` could be approved
    /// automatically. `None` means only manual approval is possible.
    pub fn forecast_next_approval<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        if !self.policy.auto_approves() {
            return None;
        }
        let delay = self.policy.delay.unwrap_or_else(Duration::zero);
        let earliest = now.clone().checked_add_signed(delay)?;
        match &self.policy.window {
            Some(window) => window
                .next_window(&earliest)
                .map(|span| span.start.max(earliest)),
            None => Some(earliest),
        }
    }

    /// Bring the status record in line with the ask-file.
    ///
    /// Returns the request when a new one was just created (the caller
    /// announces it). A missing ask-file or disabled approvals drop any
    /// stale record.
    pub fn refresh_status<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<Option<ApprovalRequest>> {
        let asked = if self.policy.approvals_enabled {
            self.read_ask_hash()?
        } else {
            None
        };

        let Some(hash) = asked else {
            if self.fs.is_file(&self.status_file) {
                debug!(path = %self.status_file.display(), "dropping stale approval status");
                self.fs.remove_file(&self.status_file)?;
            }
            return Ok(None);
        };

        if let Some(record) = self.read_status()? {
            if record.hash == hash {
                return Ok(None);
            }
        }

        info!(hash = %hash, "generating new approval request");
        let record = StatusRecord {
            hash,
            status: ApprovalStatus::Asked,
            time: now.timestamp(),
        };
        self.fs
            .write(&self.status_file, record.render().as_bytes())?;

        self.current()
    }

    /// Grant the pending plan. `None` skips the hash check.
    pub fn approve(&self, hash: Option<&str>) -> Result<()> {
        self.set_status(ApprovalStatus::Granted, hash)
    }

    /// Refuse the pending plan; it will never be approved automatically.
    pub fn deny(&self, hash: Option<&str>) -> Result<()> {
        self.set_status(ApprovalStatus::Denied, hash)
    }

    fn set_status(&self, status: ApprovalStatus, hash: Option<&str>) -> Result<()> {
        if !self.policy.approvals_enabled || !self.fs.is_file(&self.ask_file) {
            return Err(SupervisorError::NoPendingApproval);
        }
        let mut record = self
            .read_status()?
            .ok_or(SupervisorError::NoPendingApproval)?;

        if let Some(given) = hash {
            if given != record.hash {
                return Err(SupervisorError::InvalidApproval {
                    expected: record.hash,
                    given: given.to_string(),
                });
            }
        }

        record.status = status;
        self.fs
            .write(&self.status_file, record.render().as_bytes())?;
        info!(hash = %record.hash, status = %status, "approval status changed");
        Ok(())
    }

    fn read_ask(&self) -> Result<Option<AskFile>> {
        if !self.fs.is_file(&self.ask_file) {
            return Ok(None);
        }
        Ok(AskFile::parse(&self.fs.read_to_string(&self.ask_file)?))
    }

    fn read_ask_hash(&self) -> Result<Option<String>> {
        if !self.fs.is_file(&self.ask_file) {
            return Ok(None);
        }
        Ok(AskFile::parse_hash(&self.fs.read_to_string(&self.ask_file)?))
    }

    fn read_status(&self) -> Result<Option<StatusRecord>> {
        if !self.fs.is_file(&self.status_file) {
            return Ok(None);
        }
        Ok(StatusRecord::parse(&self.fs.read_to_string(&self.status_file)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use chrono::Utc;

    const ASK: &str = "/ask";
    const STATUS: &str = "/status";
    const T0: i64 = 1_700_000_000;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn gate(fs: &MockFileSystem, policy: GatePolicy) -> ApprovalGate<MockFileSystem> {
        ApprovalGate::new(fs.clone(), ASK, STATUS, policy)
    }

    fn enabled() -> GatePolicy {
        GatePolicy {
            approvals_enabled: true,
            ..GatePolicy::default()
        }
    }

    #[test]
    fn fresh_request_needs_manual_approval() {
        let fs = MockFileSystem::new();
        fs.add_file(ASK, "abc\ninstall\t2.0\tfoo\tnone\n");
        let gate = gate(&fs, enabled());

        let created = gate.refresh_status(&ts(T0)).unwrap().unwrap();
        assert_eq!(created.hash, "abc");
        assert_eq!(created.status, ApprovalStatus::Asked);
        assert_eq!(created.plan.len(), 1);
        assert_eq!(fs.contents(STATUS).unwrap(), format!("abc asked {T0}"));
        assert_eq!(gate.is_pre_approved(&ts(T0 + 10)).unwrap(), None);

        // Same plan again: nothing new to announce, time is kept.
        assert!(gate.refresh_status(&ts(T0 + 100)).unwrap().is_none());
        assert_eq!(fs.contents(STATUS).unwrap(), format!("abc asked {T0}"));

        gate.approve(Some("abc")).unwrap();
        assert_eq!(fs.contents(STATUS).unwrap(), format!("abc granted {T0}"));
        assert_eq!(
            gate.is_pre_approved(&ts(T0 + 20)).unwrap().as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn wrong_hash_leaves_status_untouched() {
        let fs = MockFileSystem::new();
        fs.add_file(ASK, "abc\n");
        let gate = gate(&fs, enabled());
        gate.refresh_status(&ts(T0)).unwrap();

        let err = gate.approve(Some("def")).unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidApproval { .. }));
        assert_eq!(fs.contents(STATUS).unwrap(), format!("abc asked {T0}"));

        gate.deny(None).unwrap();
        assert_eq!(fs.contents(STATUS).unwrap(), format!("abc denied {T0}"));
    }

    #[test]
    fn approve_without_request_fails() {
        let fs = MockFileSystem::new();
        let gate = gate(&fs, enabled());
        assert!(matches!(
            gate.approve(None),
            Err(SupervisorError::NoPendingApproval)
        ));
    }

    #[test]
    fn delay_approves_after_it_elapsed() {
        let fs = MockFileSystem::new();
        fs.add_file(ASK, "abc\n");
        fs.add_file(STATUS, format!("abc asked {T0}"));
        let gate = gate(
            &fs,
            GatePolicy {
                delay: Some(Duration::hours(1)),
                ..enabled()
            },
        );

        assert_eq!(gate.is_pre_approved(&ts(T0 + 30 * 60)).unwrap(), None);
        assert_eq!(
            gate.is_pre_approved(&ts(T0 + 61 * 60)).unwrap().as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn denied_request_is_never_auto_approved() {
        let fs = MockFileSystem::new();
        fs.add_file(ASK, "abc\n");
        fs.add_file(STATUS, format!("abc denied {T0}"));
        let gate = gate(
            &fs,
            GatePolicy {
                delay: Some(Duration::hours(1)),
                ..enabled()
            },
        );
        assert_eq!(gate.is_pre_approved(&ts(T0 + 48 * 3600)).unwrap(), None);
    }

    #[test]
    fn window_and_delay_must_both_hold() {
        // 2023-11-14T22:13:20Z is T0.
        let fs = MockFileSystem::new();
        fs.add_file(ASK, "abc\n");
        fs.add_file(STATUS, format!("abc asked {T0}"));
        let gate = gate(
            &fs,
            GatePolicy {
                delay: Some(Duration::hours(1)),
                window: Some(ApproveWindow::new(["0 0 2 * * *"], ["0 0 5 * * *"])),
                ..enabled()
            },
        );

        // Delay elapsed, window closed.
        assert_eq!(gate.is_pre_approved(&ts(T0 + 2 * 3600)).unwrap(), None);
        // 2023-11-15T03:00:00Z: window open, delay elapsed.
        let inside = DateTime::parse_from_rfc3339("2023-11-15T03:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            gate.is_pre_approved(&inside).unwrap().as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn stale_status_is_dropped() {
        let fs = MockFileSystem::new();
        fs.add_file(STATUS, format!("abc asked {T0}"));
        let gate = gate(&fs, enabled());

        assert!(gate.refresh_status(&ts(T0)).unwrap().is_none());
        assert!(fs.contents(STATUS).is_none());
    }

    #[test]
    fn disabled_approvals_hide_request() {
        let fs = MockFileSystem::new();
        fs.add_file(ASK, "abc\n");
        fs.add_file(STATUS, format!("abc granted {T0}"));
        let gate = gate(&fs, GatePolicy::default());

        assert!(gate.current().unwrap().is_none());
        assert_eq!(gate.is_pre_approved(&ts(T0)).unwrap(), None);
        gate.refresh_status(&ts(T0)).unwrap();
        assert!(fs.contents(STATUS).is_none());
    }

    #[test]
    fn forecast_follows_policy() {
        let fs = MockFileSystem::new();
        let now = ts(T0);

        assert_eq!(gate(&fs, enabled()).forecast_next_approval(&now), None);

        let delayed = gate(
            &fs,
            GatePolicy {
                delay: Some(Duration::hours(3)),
                ..enabled()
            },
        );
        assert_eq!(delayed.forecast_next_approval(&now), Some(ts(T0 + 3 * 3600)));

        let windowed = gate(
            &fs,
            GatePolicy {
                delay: Some(Duration::hours(1)),
                window: Some(ApproveWindow::new(["0 0 2 * * *"], ["0 0 5 * * *"])),
                ..enabled()
            },
        );
        let expected = DateTime::parse_from_rfc3339("2023-11-15T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(windowed.forecast_next_approval(&now), Some(expected));
    }

    #[test]
    fn huge_delay_forecasts_manual_approval_only() {
        let fs = MockFileSystem::new();
        fs.add_file(ASK, "abc\n");
        let policy = GatePolicy {
            delay: Duration::try_hours(10_000_000_000),
            ..enabled()
        };
        assert!(policy.delay.is_some());
        let gate = gate(&fs, policy);

        let now = ts(T0);
        assert!(gate.refresh_status(&now).unwrap().is_some());
        assert_eq!(gate.forecast_next_approval(&now), None);
        assert_eq!(gate.is_pre_approved(&now).unwrap(), None);
    }

    #[test]
    fn far_future_status_time_does_not_overflow() {
        let fs = MockFileSystem::new();
        fs.add_file(ASK, "abc\n");
        fs.add_file(STATUS, format!("abc asked {}", i64::MAX));
        let gate = gate(
            &fs,
            GatePolicy {
                delay: Some(Duration::hours(1)),
                ..enabled()
            },
        );

        assert_eq!(gate.is_pre_approved(&ts(T0)).unwrap(), None);
    }
}
