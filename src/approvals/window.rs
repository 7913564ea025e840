// src/approvals/window.rs

//! Recurring auto-approve window.
//!
//! The window is described by two sets of cron triggers. Enable triggers
//! open it, disable triggers close it. At any instant the window is open iff
//! the most recent trigger (over both sets) is an enable one. An enable and
//! a disable firing at the same instant leave the window open, and a trigger
//! firing exactly at `now` counts as already passed.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, SubsecRound, TimeZone};
use cron::Schedule;
use regex::{Captures, Regex};
use tracing::warn;

use crate::config::AutorunSection;
use crate::errors::{Result, SupervisorError};

static DOW_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[,\-])([0-7])").expect("valid day-of-week regex"));

/// Compile a trigger expression.
///
/// Classic five-field crontab lines (`min hour dom mon dow`, Sunday = 0 or 7)
/// are accepted next to the six/seven-field form with seconds.
pub fn compile_trigger(expr: &str) -> Result<Schedule> {
    let normalized = normalize_expression(expr);
    Schedule::from_str(&normalized).map_err(|e| SupervisorError::InvalidTrigger {
        expression: expr.to_string(),
        reason: e.to_string(),
    })
}

fn normalize_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return fields.join(" ");
    }

    let dow = DOW_NUMBER.replace_all(fields[4], |caps: &Captures| {
        let name = match &caps[2] {
            "1" => "MON",
            "2" => "TUE",
            "3" => "WED",
            "4" => "THU",
            "5" => "FRI",
            "6" => "SAT",
            _ => "SUN",
        };
        format!("{}{}", &caps[1], name)
    });

    format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], dow
    )
}

/// Closest window around or after some instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpan<Tz: TimeZone> {
    /// In the past when the window is currently open.
    pub start: DateTime<Tz>,
    /// `None` when no disable trigger ever fires after `start`.
    pub end: Option<DateTime<Tz>>,
}

#[derive(Debug, Clone, Default)]
pub struct ApproveWindow {
    enables: BTreeSet<String>,
    disables: BTreeSet<String>,
    /// Compiled schedules keyed by expression.
    compiled: BTreeMap<String, Schedule>,
}

impl ApproveWindow {
    pub fn new<E, D>(enables: E, disables: D) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let mut window = Self::default();
        window.set_triggers(
            enables.into_iter().map(Into::into).collect(),
            disables.into_iter().map(Into::into).collect(),
        );
        window
    }

    /// Window configured in `[autorun]`, if both trigger lists are set.
    pub fn from_config(autorun: &AutorunSection) -> Option<Self> {
        autorun.has_window().then(|| {
            Self::new(
                autorun.auto_approve_enable_triggers.iter().cloned(),
                autorun.auto_approve_disable_triggers.iter().cloned(),
            )
        })
    }

    /// Replace both trigger sets. Expressions that do not compile are
    /// reported and ignored; already compiled ones are reused.
    pub fn set_triggers(&mut self, enables: BTreeSet<String>, disables: BTreeSet<String>) {
        self.enables = enables;
        self.disables = disables;

        for expr in self.enables.iter().chain(self.disables.iter()) {
            if self.compiled.contains_key(expr) {
                continue;
            }
            match compile_trigger(expr) {
                Ok(schedule) => {
                    self.compiled.insert(expr.clone(), schedule);
                }
                Err(e) => warn!(error = %e, "ignoring approve window trigger"),
            }
        }

        let (enables, disables) = (&self.enables, &self.disables);
        self.compiled
            .retain(|expr, _| enables.contains(expr) || disables.contains(expr));
    }

    /// Add an enable trigger, rejecting invalid expressions.
    pub fn add_enable(&mut self, expr: &str) -> Result<()> {
        let schedule = compile_trigger(expr)?;
        self.compiled.insert(expr.to_string(), schedule);
        self.enables.insert(expr.to_string());
        Ok(())
    }

    /// Add a disable trigger, rejecting invalid expressions.
    pub fn add_disable(&mut self, expr: &str) -> Result<()> {
        let schedule = compile_trigger(expr)?;
        self.compiled.insert(expr.to_string(), schedule);
        self.disables.insert(expr.to_string());
        Ok(())
    }

    pub fn enables(&self) -> impl Iterator<Item = &str> {
        self.enables.iter().map(String::as_str)
    }

    pub fn disables(&self) -> impl Iterator<Item = &str> {
        self.disables.iter().map(String::as_str)
    }

    pub fn in_window<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        let Some(enabled) = latest(self.schedules(&self.enables), now) else {
            return false;
        };
        match latest(self.schedules(&self.disables), now) {
            Some(disabled) => enabled >= disabled,
            None => true,
        }
    }

    /// The window we are in, or the next one to come.
    pub fn next_window<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<WindowSpan<Tz>> {
        let start = if self.in_window(now) {
            latest(self.schedules(&self.enables), now)?
        } else {
            earliest_after(self.schedules(&self.enables), now)?
        };
        let end = earliest_after(self.schedules(&self.disables), &start);
        Some(WindowSpan { start, end })
    }

    fn schedules<'a>(&'a self, exprs: &'a BTreeSet<String>) -> impl Iterator<Item = &'a Schedule> {
        exprs.iter().filter_map(|expr| self.compiled.get(expr))
    }
}

/// Most recent event at or before `now` over all schedules.
fn latest<'a, Tz: TimeZone>(
    schedules: impl Iterator<Item = &'a Schedule>,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    // Events fire on whole seconds; searching backwards from the next whole
    // second makes an event at exactly `now` count.
    let probe = now.clone().trunc_subsecs(0) + Duration::seconds(1);
    schedules
        .filter_map(|schedule| schedule.after(&probe).next_back())
        .max()
}

/// First event strictly after `t` over all schedules.
fn earliest_after<'a, Tz: TimeZone>(
    schedules: impl Iterator<Item = &'a Schedule>,
    t: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    schedules
        .filter_map(|schedule| schedule.after(t).next())
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn night_window() -> ApproveWindow {
        ApproveWindow::new(["0 0 2 * * *"], ["0 0 5 * * *"])
    }

    #[test]
    fn open_between_enable_and_disable() {
        let w = night_window();
        assert!(w.in_window(&at("2026-03-10T03:00:00Z")));
        assert!(!w.in_window(&at("2026-03-10T06:00:00Z")));
        assert!(!w.in_window(&at("2026-03-10T01:59:59Z")));
    }

    #[test]
    fn event_at_now_counts_as_passed() {
        let w = night_window();
        assert!(w.in_window(&at("2026-03-10T02:00:00Z")));
        assert!(!w.in_window(&at("2026-03-10T05:00:00Z")));
    }

    #[test]
    fn simultaneous_enable_and_disable_leave_window_open() {
        let w = ApproveWindow::new(["0 0 2 * * *"], ["0 0 2 * * *", "0 0 4 * * *"]);
        assert!(w.in_window(&at("2026-03-10T02:30:00Z")));
        assert!(!w.in_window(&at("2026-03-10T04:30:00Z")));
    }

    #[test]
    fn next_window_inside_starts_in_the_past() {
        let w = night_window();
        let span = w.next_window(&at("2026-03-10T03:00:00Z")).unwrap();
        assert_eq!(span.start, at("2026-03-10T02:00:00Z"));
        assert_eq!(span.end, Some(at("2026-03-10T05:00:00Z")));
    }

    #[test]
    fn next_window_outside_is_the_upcoming_one() {
        let w = night_window();
        let span = w.next_window(&at("2026-03-10T06:00:00Z")).unwrap();
        assert_eq!(span.start, at("2026-03-11T02:00:00Z"));
        assert_eq!(span.end, Some(at("2026-03-11T05:00:00Z")));
    }

    #[test]
    fn five_field_expressions_are_accepted() {
        // 2026-10-18 is a Sunday.
        let w = ApproveWindow::new(["0 2 * * 0"], ["0 5 * * 7"]);
        let span = w.next_window(&at("2026-10-15T12:00:00Z")).unwrap();
        assert_eq!(span.start, at("2026-10-18T02:00:00Z"));
        assert_eq!(span.end, Some(at("2026-10-18T05:00:00Z")));
    }

    #[test]
    fn weekday_ranges_are_translated() {
        assert_eq!(normalize_expression("30 1 * * 1-5"), "0 30 1 * * MON-FRI");
        assert_eq!(normalize_expression("0 3 * * 0,6"), "0 0 3 * * SUN,SAT");
        assert_eq!(normalize_expression("*/5 * * * */2"), "0 */5 * * * */2");
        assert_eq!(normalize_expression("0  0 2 * * *"), "0 0 2 * * *");
    }

    #[test]
    fn invalid_triggers_are_skipped_on_update_but_rejected_on_add() {
        let mut w = ApproveWindow::new(["0 0 2 * * *", "nonsense"], ["0 0 5 * * *"]);
        assert!(w.in_window(&at("2026-03-10T03:00:00Z")));

        let err = w.add_enable("61 * * * *").unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidTrigger { .. }));
        w.add_disable("0 0 3 * * *").unwrap();
        assert!(!w.in_window(&at("2026-03-10T03:30:00Z")));
    }

    #[test]
    fn empty_window_is_never_open() {
        let w = ApproveWindow::default();
        assert!(!w.in_window(&at("2026-03-10T03:00:00Z")));
        assert!(w.next_window(&at("2026-03-10T03:00:00Z")).is_none());
    }
}
