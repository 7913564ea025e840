// src/hooks.rs

//! Postrun hooks: shell commands run once the active supervisor finishes.
//!
//! Anyone can register a hook. If no supervisor is active the command runs
//! right away, otherwise it is appended to the hook file which the active
//! instance consumes after its last update pass.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ConfigFile;
use crate::errors::{Result, SupervisorError};
use crate::exec::supervisor::exit_code;
use crate::lock::exclusive::ExclusiveLock;
use crate::lock::identity::{LockMode, Verified, open_locked};
use crate::lock::off_runtime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Appended to the queue of the active supervisor.
    Queued,
    /// No supervisor was active, so the command already ran.
    RanImmediately { exit_code: i32 },
}

#[derive(Debug, Clone)]
pub struct HookQueue {
    hook_file: PathBuf,
    lock_file: PathBuf,
}

impl HookQueue {
    pub fn new(hook_file: impl Into<PathBuf>, lock_file: impl Into<PathBuf>) -> Self {
        Self {
            hook_file: hook_file.into(),
            lock_file: lock_file.into(),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(&cfg.paths.hook_file, &cfg.paths.lock_file)
    }

    /// Register a single-line shell command.
    pub async fn register(&self, command: &str) -> Result<Registration> {
        if command.contains('\n') || command.contains('\r') {
            return Err(SupervisorError::InvalidHookCommand(command.to_string()));
        }

        if let Some(parent) = self.hook_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        let mut file = match self.lock_hook_file(options).await? {
            Verified::Locked(file) => file,
            Verified::Missing | Verified::Contended => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("can't open hook file {:?}", self.hook_file),
                )
                .into());
            }
        };

        if !ExclusiveLock::query_held(&self.lock_file)? {
            drop(file);
            let exit_code = run_command(command).await?;
            return Ok(Registration::RanImmediately { exit_code });
        }

        writeln!(file, "{command}")?;
        info!(command, "postrun hook registered");
        Ok(Registration::Queued)
    }

    pub async fn register_all<S: AsRef<str>>(&self, commands: &[S]) -> Result<()> {
        for command in commands {
            self.register(command.as_ref()).await?;
        }
        Ok(())
    }

    /// Run every queued command in registration order and remove the queue.
    ///
    /// Failing hooks are reported and do not stop the others. Returns the
    /// number of commands run.
    pub async fn run_all(&self) -> Result<usize> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        let mut file = match self.lock_hook_file(options).await? {
            Verified::Locked(file) => file,
            Verified::Missing | Verified::Contended => return Ok(0),
        };

        let mut content = String::new();
        file.read_to_string(&mut content)?;

        let mut ran = 0;
        for command in content.lines().filter(|l| !l.trim().is_empty()) {
            match run_command(command).await {
                Ok(0) => {}
                Ok(code) => warn!(command, exit_code = code, "postrun hook failed"),
                Err(e) => warn!(command, error = %e, "postrun hook could not be run"),
            }
            ran += 1;
        }

        match fs::remove_file(&self.hook_file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        drop(file);

        Ok(ran)
    }

    /// The lock can be held for a whole `run_all` of another process.
    async fn lock_hook_file(&self, options: OpenOptions) -> Result<Verified> {
        let path = self.hook_file.clone();
        off_runtime(move || Ok(open_locked(&path, &options, LockMode::Exclusive)?)).await
    }
}

async fn run_command(command: &str) -> Result<i32> {
    info!(command, "running hook command");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("spawning hook command '{command}'"))?;

    for line in String::from_utf8_lossy(&output.stdout)
        .lines()
        .chain(String::from_utf8_lossy(&output.stderr).lines())
    {
        info!(command, "{}", line);
    }

    let code = exit_code(output.status);
    if code != 0 {
        warn!(command, exit_code = code, "command failed");
    }
    Ok(code)
}
