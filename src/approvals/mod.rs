// src/approvals/mod.rs

//! Approval of update plans.
//!
//! - [`request`] parses the ask-file and the status record.
//! - [`window`] evaluates the recurring auto-approve window.
//! - [`gate`] combines both with the configured policy.

pub mod gate;
pub mod request;
pub mod window;

pub use gate::{ApprovalGate, GatePolicy};
pub use request::{ApprovalRequest, AskFile, PlannedPackage, StatusRecord};
pub use window::{ApproveWindow, WindowSpan, compile_trigger};
