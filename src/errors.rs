// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlWriteError(#[from] toml::ser::Error),

    /// Programming-contract violation (double start, release without
    /// acquire, ...). Never retried.
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Lock file {0:?} is unusable: holder can't be identified or overtaken")]
    LockUnusable(PathBuf),

    #[error("Signal delivery failed: {0}")]
    Signal(#[from] nix::errno::Errno),

    #[error("Invalid approval: pending plan is '{expected}' but '{given}' was given")]
    InvalidApproval { expected: String, given: String },

    #[error("There is no pending approval request")]
    NoPendingApproval,

    #[error("Invalid hook command (must be a single line): {0:?}")]
    InvalidHookCommand(String),

    #[error("Invalid trigger expression '{expression}': {reason}")]
    InvalidTrigger { expression: String, reason: String },

    #[error("Updater is configured to be disabled")]
    Disabled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SupervisorError>;
