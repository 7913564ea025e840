// src/changelog.rs

//! Parser of the update engine's changelog.
//!
//! The changelog records transactions (sets of changes) the engine applied:
//!
//! ```text
//! START\t<unix-time>
//! PKG\t<name>\t<old-version>\t<new-version>
//! SCRIPT\t<package>\t<script>\t<exit-code>
//! |<captured script output>
//! END\t<unix-time>
//! ```

use std::path::PathBuf;

use tracing::warn;

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::fs::FileSystem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    pub name: String,
    /// Empty when the package was newly installed.
    pub old_version: String,
    /// Empty when the package was removed.
    pub new_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    /// `preinst`, `prerm`, `postinst` or `postrm`.
    pub script: String,
    pub package: String,
    pub exit_code: i32,
    pub output: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub start: i64,
    /// `None` while the transaction is unfinished (or was interrupted).
    pub end: Option<i64>,
    pub changes: Vec<PackageChange>,
    pub failures: Vec<ScriptFailure>,
}

/// Parse changelog text. Unknown or malformed lines are reported and skipped.
pub fn parse(content: &str) -> Vec<Transaction> {
    let mut transactions: Vec<Transaction> = Vec::new();

    for line in content.lines() {
        if let Some(output) = line.strip_prefix('|') {
            match transactions.last_mut().and_then(|t| t.failures.last_mut()) {
                Some(failure) => failure.output.push(output.to_string()),
                None => warn!(line, "script output without a script in changelog"),
            }
            continue;
        }

        let cols: Vec<&str> = line.split('\t').collect();
        match cols.as_slice() {
            ["START", ts] => match ts.trim().parse() {
                Ok(start) => transactions.push(Transaction {
                    start,
                    end: None,
                    changes: Vec::new(),
                    failures: Vec::new(),
                }),
                Err(_) => warn!(line, "invalid transaction start in changelog"),
            },
            ["END", ts] => match (transactions.last_mut(), ts.trim().parse()) {
                (Some(t), Ok(end)) => t.end = Some(end),
                _ => warn!(line, "unexpected transaction end in changelog"),
            },
            ["PKG", name, old, new] => match transactions.last_mut() {
                Some(t) => t.changes.push(PackageChange {
                    name: name.to_string(),
                    old_version: old.to_string(),
                    new_version: new.to_string(),
                }),
                None => warn!(line, "package change outside of transaction in changelog"),
            },
            ["SCRIPT", package, script, code] => {
                match (transactions.last_mut(), code.trim().parse()) {
                    (Some(t), Ok(exit_code)) => t.failures.push(ScriptFailure {
                        script: script.to_string(),
                        package: package.to_string(),
                        exit_code,
                        output: Vec::new(),
                    }),
                    _ => warn!(line, "unexpected script record in changelog"),
                }
            }
            [""] => {}
            _ => warn!(line, "unknown line in changelog"),
        }
    }

    transactions
}

/// Changelog file plus the marker of what was already reported.
#[derive(Debug, Clone)]
pub struct Changelog<F: FileSystem> {
    fs: F,
    path: PathBuf,
    last_report: PathBuf,
}

impl<F: FileSystem> Changelog<F> {
    pub fn new(fs: F, path: impl Into<PathBuf>, last_report: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
            last_report: last_report.into(),
        }
    }

    pub fn from_config(fs: F, cfg: &ConfigFile) -> Self {
        Self::new(fs, &cfg.paths.changelog, &cfg.paths.changelog_last_report)
    }

    /// All transactions; a missing changelog has none.
    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        if !self.fs.is_file(&self.path) {
            return Ok(Vec::new());
        }
        Ok(parse(&self.fs.read_to_string(&self.path)?))
    }

    /// Start time of the newest transaction already reported.
    pub fn last_reported(&self) -> Result<i64> {
        if !self.fs.is_file(&self.last_report) {
            return Ok(0);
        }
        let content = self.fs.read_to_string(&self.last_report)?;
        Ok(content.trim().parse().unwrap_or_else(|_| {
            warn!(path = %self.last_report.display(), "corrupted changelog report marker");
            0
        }))
    }

    /// Finished transactions not reported yet.
    pub fn unreported(&self) -> Result<Vec<Transaction>> {
        let last = self.last_reported()?;
        Ok(self
            .transactions()?
            .into_iter()
            .filter(|t| t.start > last && t.end.is_some())
            .collect())
    }

    pub fn mark_reported(&self, start: i64) -> Result<()> {
        self.fs
            .write(&self.last_report, start.to_string().as_bytes())?;
        Ok(())
    }
}
