// src/types.rs

use std::fmt;
use std::str::FromStr;

/// Decision state of a pending approval request as stored in the status
/// record.
///
/// - `Asked`: request was created and nobody decided yet (default).
/// - `Granted`: request was approved and may be applied.
/// - `Denied`: request was refused; it is never approved automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Asked,
    Granted,
    Denied,
}

impl Default for ApprovalStatus {
    fn default() -> Self {
        ApprovalStatus::Asked
    }
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Asked => "asked",
            ApprovalStatus::Granted => "granted",
            ApprovalStatus::Denied => "denied",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asked" => Ok(ApprovalStatus::Asked),
            "granted" => Ok(ApprovalStatus::Granted),
            "denied" => Ok(ApprovalStatus::Denied),
            other => Err(format!(
                "invalid approval status: {other} (expected \"asked\", \"granted\" or \"denied\")"
            )),
        }
    }
}

/// Reboot requirement of a plan, ordered from least to most disruptive so
/// the requirement of a whole plan is the maximum over its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RebootRequirement {
    /// `none`
    None,
    /// `delayed`: a reboot is needed to fully apply the update later.
    Delayed,
    /// `finished`: the device is rebooted right after the update.
    Immediate,
}

impl Default for RebootRequirement {
    fn default() -> Self {
        RebootRequirement::None
    }
}

impl FromStr for RebootRequirement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(RebootRequirement::None),
            "delayed" => Ok(RebootRequirement::Delayed),
            // Older engines wrote "immediate".
            "finished" | "immediate" => Ok(RebootRequirement::Immediate),
            other => Err(format!("invalid reboot marker: {other}")),
        }
    }
}

/// Kind of a planned package operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOperation {
    Install,
    Upgrade,
    Downgrade,
    Reinstall,
    Remove,
    /// Anything the engine invents later; kept verbatim.
    Other(String),
}

impl PlanOperation {
    pub fn as_str(&self) -> &str {
        match self {
            PlanOperation::Install => "install",
            PlanOperation::Upgrade => "upgrade",
            PlanOperation::Downgrade => "downgrade",
            PlanOperation::Reinstall => "reinstall",
            PlanOperation::Remove => "remove",
            PlanOperation::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for PlanOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for PlanOperation {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "install" => PlanOperation::Install,
            "upgrade" => PlanOperation::Upgrade,
            "downgrade" => PlanOperation::Downgrade,
            "reinstall" => PlanOperation::Reinstall,
            "remove" | "removal" => PlanOperation::Remove,
            other => PlanOperation::Other(other.to_string()),
        }
    }
}
