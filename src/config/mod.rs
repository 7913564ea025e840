// src/config/mod.rs

//! Configuration loading and validation for the supervisor.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load and save the config file (`loader.rs`).
//! - Validate command, timeouts and trigger expressions (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, save_to_path};
pub use model::{
    AutorunSection, ConfigFile, NotifySection, PathsSection, RawConfigFile, UpdateSection,
};
