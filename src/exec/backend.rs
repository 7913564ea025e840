// src/exec/backend.rs

//! Pluggable update runner abstraction.
//!
//! The run loop talks to an `UpdateRunner` instead of spawning processes
//! itself. This makes it easy to swap in a fake runner in tests while the
//! production implementation stays in [`SupervisedRunner`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::errors::Result;
use crate::exec::supervisor::ChildSupervisor;

/// One invocation of the update engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub kill_timeout: Duration,
    /// Mirror the engine's output to our own stdout/stderr.
    pub verbose: bool,
}

/// What came out of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub exit_code: i32,
    pub trace: String,
}

/// Trait abstracting how the update engine is executed.
///
/// Production code uses [`SupervisedRunner`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait UpdateRunner: Send {
    fn run_update(
        &mut self,
        invocation: UpdateInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<UpdateOutcome>> + Send + '_>>;
}

/// Runs the engine under a [`ChildSupervisor`].
#[derive(Debug, Default)]
pub struct SupervisedRunner;

impl UpdateRunner for SupervisedRunner {
    fn run_update(
        &mut self,
        invocation: UpdateInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<UpdateOutcome>> + Send + '_>> {
        Box::pin(async move {
            let mut supervisor = ChildSupervisor::new(invocation.verbose);
            supervisor.start(&invocation.program, &invocation.args)?;
            let exit_code = supervisor
                .join(invocation.timeout, invocation.kill_timeout)
                .await?;
            Ok(UpdateOutcome {
                exit_code,
                trace: supervisor.trace().snapshot(),
            })
        })
    }
}
