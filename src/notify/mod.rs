// src/notify/mod.rs

//! Events the run loop reports to the user.
//!
//! The run loop only produces structured [`Notification`]s. Rendering them
//! to text lives in [`render`]; delivery is behind the [`Notifier`] trait
//! with [`command::CommandNotifier`] (external notification tool) and
//! [`LogNotifier`] (just logs) as implementations.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Local};
use tracing::info;

use crate::approvals::ApprovalRequest;
use crate::changelog::Transaction;
use crate::config::ConfigFile;
use crate::errors::Result;

pub mod command;
pub mod render;

pub use command::CommandNotifier;
pub use render::render;

/// Exit code the engine uses for failures it handled itself.
pub const HANDLED_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrashKind {
    /// The engine crashed internally and left a crash log behind.
    Internal { crash_log: String },
    /// Package installation failed; details come through the changelog.
    PackageFailure,
    /// Anything else, e.g. killed after a timeout.
    Abnormal { trace: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    pub exit_code: i32,
    pub kind: CrashKind,
}

impl CrashReport {
    /// Classify a finished run. `None` for a successful one.
    pub fn classify(exit_code: i32, trace: String, crash_log: Option<String>) -> Option<Self> {
        let kind = match (exit_code, crash_log) {
            (0, _) => return None,
            (HANDLED_FAILURE_EXIT_CODE, Some(crash_log)) => CrashKind::Internal { crash_log },
            (HANDLED_FAILURE_EXIT_CODE, None) => CrashKind::PackageFailure,
            _ => CrashKind::Abnormal { trace },
        };
        Some(Self { exit_code, kind })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Crash(CrashReport),
    Success,
    /// Finished transactions not reported before.
    Changes(Vec<Transaction>),
    ApprovalNeeded {
        request: ApprovalRequest,
        /// When the plan gets approved automatically, if ever.
        forecast: Option<DateTime<Local>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Update,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Update => "update",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery of notifications.
///
/// Failing to deliver is the implementation's business to report; the run
/// loop only logs returned errors.
pub trait Notifier: Send {
    fn notify(
        &mut self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Called once after all postrun hooks ran.
    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(
        &mut self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        (**self).notify(notification)
    }

    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        (**self).flush()
    }
}

/// Writes rendered notifications to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(
        &mut self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for (severity, text) in render(&notification) {
                info!(%severity, "{}", text);
            }
            Ok(())
        })
    }

    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// Notifier selected by `[notify]`.
pub fn notifier_from_config(cfg: &ConfigFile) -> Box<dyn Notifier> {
    match &cfg.notify.command {
        Some(command) => Box::new(CommandNotifier::new(
            command.clone(),
            cfg.notify.flush_command.clone(),
        )),
        None => Box::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_classification() {
        assert_eq!(CrashReport::classify(0, "t".into(), Some("log".into())), None);
        assert_eq!(
            CrashReport::classify(1, "t".into(), Some("lua trace".into()))
                .unwrap()
                .kind,
            CrashKind::Internal {
                crash_log: "lua trace".into()
            }
        );
        assert_eq!(
            CrashReport::classify(1, "t".into(), None).unwrap().kind,
            CrashKind::PackageFailure
        );
        assert_eq!(
            CrashReport::classify(-15, "partial".into(), Some("x".into()))
                .unwrap()
                .kind,
            CrashKind::Abnormal {
                trace: "partial".into()
            }
        );
    }
}
