// src/prerun.rs

//! Random start delay applied before the instance lock is taken.
//!
//! Spreads automatic runs of many devices over time. When an approve window
//! is configured the sleep is bent so the run lands inside the next window
//! whenever that window overlaps the sleep range.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;
use tracing::info;

use crate::approvals::ApproveWindow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepPlan<Tz: TimeZone> {
    /// Shortest sleep, relative to the time the plan was made.
    pub min: Duration,
    pub max: Duration,
    /// Latest instant the sleep may end at.
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> SleepPlan<Tz> {
    /// Time the run should consider "now" after sleeping. A sleep that
    /// overshoots its end still counts as ending at `end`.
    pub fn effective_now(&self, actual: DateTime<Tz>) -> DateTime<Tz> {
        actual.min(self.end.clone())
    }
}

pub fn sleep_bounds<Tz: TimeZone>(
    now: &DateTime<Tz>,
    max_sleep: Duration,
    window: Option<&ApproveWindow>,
) -> SleepPlan<Tz> {
    let mut start = now.clone();
    let mut end = now
        .clone()
        .checked_add_signed(max_sleep)
        .unwrap_or_else(|| DateTime::<Utc>::MAX_UTC.with_timezone(&now.timezone()));

    if let Some(span) = window.and_then(|w| w.next_window(now)) {
        if span.start <= end {
            start = start.max(span.start);
        }
        if let Some(window_end) = span.end {
            if window_end >= start {
                end = end.min(window_end);
            }
        }
    }

    SleepPlan {
        min: start - now.clone(),
        max: end.clone() - now.clone(),
        end,
    }
}

/// Sleep a random time within the plan's bounds. An empty or inverted range
/// does not sleep at all. Returns the time slept.
pub async fn random_sleep<Tz: TimeZone>(plan: &SleepPlan<Tz>) -> std::time::Duration {
    let (min, max) = (plan.min.num_seconds(), plan.max.num_seconds());
    if max <= 0 || max < min {
        return std::time::Duration::ZERO;
    }

    let secs = rand::rng().random_range(min.max(0)..=max);
    let suspend = std::time::Duration::from_secs(u64::try_from(secs).unwrap_or(0));
    if !suspend.is_zero() {
        info!(seconds = secs, "suspending updater start");
        tokio::time::sleep(suspend).await;
    }
    suspend
}
