// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for running the update engine with
//! `tokio::process::Command` and handing its result back to the run loop.
//!
//! - [`supervisor`] owns the child process, its output readers and the
//!   terminate/kill escalation.
//! - [`trace`] is the shared buffer the readers append to.
//! - [`backend`] provides the `UpdateRunner` trait and the production
//!   `SupervisedRunner`, which tests replace with a fake implementation.

pub mod backend;
pub mod supervisor;
pub mod trace;

pub use backend::{SupervisedRunner, UpdateInvocation, UpdateOutcome, UpdateRunner};
pub use supervisor::ChildSupervisor;
pub use trace::ExecutionTrace;
