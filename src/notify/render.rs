// src/notify/render.rs

//! Human readable texts of notifications.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat};

use crate::changelog::{PackageChange, ScriptFailure, Transaction};
use crate::notify::{CrashKind, CrashReport, Notification, Severity};
use crate::types::RebootRequirement;

/// Render a notification into messages; some notifications produce none
/// (success, handled package failures) or two (changes plus script errors).
pub fn render(notification: &Notification) -> Vec<(Severity, String)> {
    match notification {
        Notification::Success => Vec::new(),
        Notification::Crash(report) => crash_text(report)
            .map(|text| vec![(Severity::Error, text)])
            .unwrap_or_default(),
        Notification::Changes(transactions) => {
            let mut out = Vec::new();
            let changes = changes_text(transactions);
            if !changes.is_empty() {
                out.push((Severity::Update, changes));
            }
            let failures = failures_text(transactions);
            if !failures.is_empty() {
                out.push((Severity::Error, failures));
            }
            out
        }
        Notification::ApprovalNeeded { request, forecast } => {
            let mut text = String::from(
                "Your approval is required to apply pending updates. You can grant it in the \
                 Foris administrative interface in the 'Updater' menu.",
            );
            match request.reboot {
                RebootRequirement::Immediate => text.push_str(
                    "\nWarning: Reboot of the device is going to be performed automatically \
                     as part of update process.",
                ),
                RebootRequirement::Delayed => text.push_str(
                    "\nReboot of the device is going to be required to fully apply this update.",
                ),
                RebootRequirement::None => {}
            }
            for pkg in &request.plan {
                text.push_str(&format!(
                    "\n • {} {} {}",
                    title_case(pkg.op.as_str()),
                    pkg.name,
                    pkg.new_version.as_deref().unwrap_or("")
                ));
            }
            if let Some(at) = forecast {
                text.push_str(&format!(
                    "\n\nThe update is going to be automatically updated some time after {} \
                     unless there a newer update.",
                    at.to_rfc3339_opts(SecondsFormat::Secs, false)
                ));
            }
            vec![(Severity::Update, text)]
        }
    }
}

fn crash_text(report: &CrashReport) -> Option<String> {
    let detail = match &report.kind {
        CrashKind::PackageFailure => return None,
        CrashKind::Internal { crash_log } => crash_log.clone(),
        CrashKind::Abnormal { trace } if !trace.is_empty() => {
            format!("{trace}\n\nExit code: {}", report.exit_code)
        }
        CrashKind::Abnormal { .. } => format!("Unknown error (Exit code: {})", report.exit_code),
    };
    Some(format!("Updater execution failed:\n{detail}"))
}

fn changes_text(transactions: &[Transaction]) -> String {
    let mut text = String::new();
    for transaction in transactions {
        text.push_str(&format!(
            "Changes performed by updater at {}\n",
            utc_date(transaction.start)
        ));
        for change in &transaction.changes {
            text.push_str(&format!(" • {}\n", describe_change(change)));
        }
    }
    text
}

fn describe_change(change: &PackageChange) -> String {
    let PackageChange {
        name,
        old_version: old,
        new_version: new,
    } = change;
    if old.is_empty() {
        return format!("Installed package {name} version {new}");
    }
    if new.is_empty() {
        return format!("Removed package {name} version {old}");
    }
    match compare_versions(old, new) {
        Ordering::Greater => {
            format!("Downgraded package {name} from version {old} to version {new}")
        }
        Ordering::Less => format!("Updated package {name} from version {old} to version {new}"),
        Ordering::Equal => format!("Reinstalled package {name} version {old}"),
    }
}

fn failures_text(transactions: &[Transaction]) -> String {
    let mut text = String::new();
    for transaction in transactions {
        let date = utc_date(transaction.start);
        for failure in &transaction.failures {
            text.push_str(&describe_failure(failure, &date));
        }
    }
    text
}

fn describe_failure(failure: &ScriptFailure, date: &str) -> String {
    let script = match failure.script.as_str() {
        "preinst" => "pre-installation",
        "prerm" => "pre-removal",
        "postinst" => "post-installation",
        "postrm" => "post-removal",
        other => other,
    };
    let mut text = format!(
        "Package's {} {script} script exited with error (exit code: {}) during update at {date}\n",
        failure.package, failure.exit_code
    );
    if !failure.output.is_empty() {
        text.push_str("Captured output:\n");
        for line in &failure.output {
            text.push_str(&format!("> {line}\n"));
        }
    }
    text.push('\n');
    text
}

fn utc_date(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, false))
        .unwrap_or_else(|| timestamp.to_string())
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Compare package versions segment by segment.
///
/// Segments are split on `.`, `-`, `_` and `~`; numeric segments compare as
/// numbers, others lexically, and a numeric segment sorts after a textual one
/// (`1.0.1 > 1.0.rc1`). A missing segment sorts first.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |v: &'_ str| -> Vec<String> {
        v.split(['.', '-', '_', '~'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    let (a, b) = (split(a), split(b));

    for (x, y) in a.iter().zip(b.iter()) {
        let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => Ordering::Greater,
            (Err(_), Ok(_)) => Ordering::Less,
            (Err(_), Err(_)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
