// src/approvals/request.rs

//! Text formats of the approval ask-file and status record.

use tracing::warn;

use crate::types::{ApprovalStatus, PlanOperation, RebootRequirement};

/// One planned package operation from the ask-file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPackage {
    pub name: String,
    pub op: PlanOperation,
    /// Installed version, when the engine provides it.
    pub current_version: Option<String>,
    /// Target version; `None` for removals.
    pub new_version: Option<String>,
    pub reboot: RebootRequirement,
}

/// Content of the ask-file produced by the update engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskFile {
    pub hash: String,
    pub plan: Vec<PlannedPackage>,
}

impl AskFile {
    /// Parse the ask-file. Returns `None` when it has no hash line.
    ///
    /// Lines: `op \t new-version-or-dash \t name \t reboot [\t current-version]`.
    pub fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines();
        let hash = lines.next()?.trim();
        if hash.is_empty() {
            return None;
        }

        let plan = lines
            .filter(|line| !line.trim().is_empty())
            .filter_map(parse_plan_line)
            .collect();

        Some(Self {
            hash: hash.to_string(),
            plan,
        })
    }

    /// Hash line only; the plan is not needed to detect a new request.
    pub fn parse_hash(content: &str) -> Option<String> {
        content
            .lines()
            .next()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
    }
}

fn parse_plan_line(line: &str) -> Option<PlannedPackage> {
    let cols: Vec<&str> = line.split('\t').map(str::trim).collect();
    if cols.len() < 4 {
        warn!(line, "ignoring malformed approval plan line");
        return None;
    }

    let reboot = cols[3].parse::<RebootRequirement>().unwrap_or_else(|e: String| {
        warn!(line, error = %e, "unknown reboot marker; assuming none");
        RebootRequirement::None
    });

    Some(PlannedPackage {
        op: PlanOperation::from(cols[0]),
        new_version: version_column(cols[1]),
        name: cols[2].to_string(),
        reboot,
        current_version: cols.get(4).copied().and_then(version_column),
    })
}

fn version_column(col: &str) -> Option<String> {
    match col {
        "" | "-" => None,
        v => Some(v.to_string()),
    }
}

/// The single-line status record: `hash status unix-time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub hash: String,
    pub status: ApprovalStatus,
    /// Creation time of the request (unix seconds).
    pub time: i64,
}

impl StatusRecord {
    pub fn parse(content: &str) -> Option<Self> {
        let mut cols = content.lines().next()?.split_whitespace();
        let hash = cols.next()?.to_string();
        let status = match cols.next()?.parse() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "corrupted approval status record");
                return None;
            }
        };
        let time = cols.next()?.parse().ok()?;
        Some(Self { hash, status, time })
    }

    pub fn render(&self) -> String {
        format!("{} {} {}", self.hash, self.status, self.time)
    }
}

/// A pending plan whose ask-file and status record agree on the hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub hash: String,
    pub status: ApprovalStatus,
    pub time: i64,
    pub plan: Vec<PlannedPackage>,
    /// Most disruptive reboot requirement over the whole plan.
    pub reboot: RebootRequirement,
}

impl ApprovalRequest {
    /// Combine both files; `None` if they describe different plans.
    pub fn combine(ask: AskFile, status: StatusRecord) -> Option<Self> {
        if ask.hash != status.hash {
            return None;
        }
        let reboot = ask
            .plan
            .iter()
            .map(|p| p.reboot)
            .max()
            .unwrap_or_default();
        Some(Self {
            hash: status.hash,
            status: status.status,
            time: status.time,
            plan: ask.plan,
            reboot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_file_with_plan() {
        let ask = AskFile::parse(
            "abc\ninstall\t2.0\tfoo\tnone\nremove\t-\tbar\tdelayed\t1.1\ngarbage\n",
        )
        .unwrap();
        assert_eq!(ask.hash, "abc");
        assert_eq!(ask.plan.len(), 2);
        assert_eq!(ask.plan[0].op, PlanOperation::Install);
        assert_eq!(ask.plan[0].new_version.as_deref(), Some("2.0"));
        assert_eq!(ask.plan[1].new_version, None);
        assert_eq!(ask.plan[1].current_version.as_deref(), Some("1.1"));
        assert_eq!(ask.plan[1].reboot, RebootRequirement::Delayed);
    }

    #[test]
    fn empty_ask_file_has_no_request() {
        assert!(AskFile::parse("").is_none());
        assert!(AskFile::parse_hash("\n").is_none());
    }

    #[test]
    fn status_record_parses_and_renders() {
        let rec = StatusRecord::parse("abc granted 1700000000\n").unwrap();
        assert_eq!(rec.status, ApprovalStatus::Granted);
        assert_eq!(rec.time, 1_700_000_000);
        assert_eq!(rec.render(), "abc granted 1700000000");

        assert!(StatusRecord::parse("abc granted").is_none());
        assert!(StatusRecord::parse("abc whatever 1").is_none());
    }

    #[test]
    fn mismatching_hash_invalidates_request() {
        let ask = AskFile::parse("new\ninstall\t1\tfoo\tfinished\n").unwrap();
        let stale = StatusRecord::parse("old asked 1").unwrap();
        assert!(ApprovalRequest::combine(ask.clone(), stale).is_none());

        let fresh = StatusRecord::parse("new asked 1").unwrap();
        let req = ApprovalRequest::combine(ask, fresh).unwrap();
        assert_eq!(req.reboot, RebootRequirement::Immediate);
    }
}
