// src/engine/mod.rs

//! Orchestration of update passes.
//!
//! [`runtime::RunLoop`] ties together:
//! - the instance lock (single active supervisor, rerun requests)
//! - the approval gate (which plan may be applied)
//! - the update runner (the supervised engine process)
//! - reporting (crashes, changes, approval requests)
//! - postrun hooks

pub mod runtime;

pub use runtime::{EXIT_NOT_ACTIVE, RunLoop, RunOptions};
