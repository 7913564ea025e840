// src/msgtrace.rs

//! Classification of the update engine's syslog messages.
//!
//! Used to tell when the engine last checked for updates and when it last
//! installed something. Syslog can be rotated away, disabled or simply not
//! contain the lines, so every answer here is best effort.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDateTime, Utc};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdaterMessage {
    /// Usually the first line of a run.
    TargetOs { version: String },
    Queue {
        operation: String,
        name: String,
        repo: String,
        version: String,
        /// Installed version for upgrades and downgrades.
        current_version: Option<String>,
    },
    PackageScript { script: String, package: String },
    Hook { kind: String, name: String },
    DownloadingPackages,
    Unpacking,
    CheckingForCollisions,
    /// Packages are being merged into the root file system.
    Install,
    Removing,
    PostScripts,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    TargetOs,
    Queue,
    PackageScript,
    Hook,
    DownloadingPackages,
    Unpacking,
    CheckingForCollisions,
    Install,
    Removing,
    PostScripts,
    Cleanup,
}

impl UpdaterMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            UpdaterMessage::TargetOs { .. } => MessageKind::TargetOs,
            UpdaterMessage::Queue { .. } => MessageKind::Queue,
            UpdaterMessage::PackageScript { .. } => MessageKind::PackageScript,
            UpdaterMessage::Hook { .. } => MessageKind::Hook,
            UpdaterMessage::DownloadingPackages => MessageKind::DownloadingPackages,
            UpdaterMessage::Unpacking => MessageKind::Unpacking,
            UpdaterMessage::CheckingForCollisions => MessageKind::CheckingForCollisions,
            UpdaterMessage::Install => MessageKind::Install,
            UpdaterMessage::Removing => MessageKind::Removing,
            UpdaterMessage::PostScripts => MessageKind::PostScripts,
            UpdaterMessage::Cleanup => MessageKind::Cleanup,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedMessage {
    /// Syslog time stamp (syslog logs in UTC).
    pub date: NaiveDateTime,
    pub message: UpdaterMessage,
}

type Builder = fn(&Captures<'_>) -> UpdaterMessage;

static ENVELOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([^ ]+ +[^ ]+ [^ ]+) [^ ]+ updater\[\d+\]: [^ :]+:\d+ \([^)]*\): (.*)$",
    )
    .expect("valid syslog envelope regex")
});

/// Tried in order; the first full match wins.
static MESSAGES: LazyLock<Vec<(Regex, Builder)>> = LazyLock::new(|| {
    let table: [(&str, Builder); 11] = [
        (r"Target Turris OS: (.*)", |c| UpdaterMessage::TargetOs {
            version: c[1].to_string(),
        }),
        (
            r"Queue ([^ ]+) of ([^/]+)/(.+)/([^/\[]+)(\[(.*)\])?",
            |c| UpdaterMessage::Queue {
                operation: c[1].to_string(),
                name: c[2].to_string(),
                repo: c[3].to_string(),
                version: c[4].to_string(),
                current_version: c.get(6).map(|m| m.as_str().to_string()),
            },
        ),
        (r"Running ([^ ]+) of (.*)", |c| UpdaterMessage::PackageScript {
            script: c[1].to_string(),
            package: c[2].to_string(),
        }),
        (r"Executing ([^ ]+) hook: ([^ ]+)", |c| UpdaterMessage::Hook {
            kind: c[1].to_string(),
            name: c[2].to_string(),
        }),
        (r"Downloading packages", |_| UpdaterMessage::DownloadingPackages),
        (r"Unpacking download packages", |_| UpdaterMessage::Unpacking),
        (r"Checking for file collisions between packages", |_| {
            UpdaterMessage::CheckingForCollisions
        }),
        (
            r"Running pre-install and pre-rm scripts and merging packages to root file system",
            |_| UpdaterMessage::Install,
        ),
        (r"Removing packages and leftover files", |_| UpdaterMessage::Removing),
        (r"Running post-install and post-rm scripts", |_| UpdaterMessage::PostScripts),
        (r"Cleaning up control files", |_| UpdaterMessage::Cleanup),
    ];

    table
        .into_iter()
        .map(|(pattern, build)| {
            let re = Regex::new(&format!("^(?:{pattern})$")).expect("valid message regex");
            (re, build)
        })
        .collect()
});

/// Classify one syslog line. `now` resolves the missing year.
pub fn classify_line(line: &str, now: NaiveDateTime) -> Option<LoggedMessage> {
    let envelope = ENVELOPE.captures(line.trim_end_matches(['\n', '\r']))?;
    let body = envelope.get(2)?.as_str();

    let message = MESSAGES
        .iter()
        .find_map(|(re, build)| re.captures(body).map(|c| build(&c)))?;

    let Some(date) = parse_date(&envelope[1], now) else {
        debug!(stamp = &envelope[1], "unparsable syslog time stamp");
        return None;
    };
    Some(LoggedMessage { date, message })
}

/// Syslog has no year: assume the current one unless that would put the
/// message in the future month-wise.
fn parse_date(stamp: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let stamp = stamp.split_whitespace().collect::<Vec<_>>().join(" ");
    let at = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{year} {stamp}"), "%Y %b %d %H:%M:%S").ok()
    };

    match at(now.year()) {
        Some(date) if date.month() <= now.month() => Some(date),
        _ => at(now.year() - 1),
    }
}

/// Iterates over the classified updater messages of a log.
pub struct LogReader<R: BufRead> {
    reader: R,
    now: NaiveDateTime,
    pending: VecDeque<LoggedMessage>,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(reader: R, now: NaiveDateTime) -> Self {
        Self {
            reader,
            now,
            pending: VecDeque::new(),
        }
    }

    /// Skip to the latest message of `kind` and return it. Iteration then
    /// continues with the messages logged after it.
    pub fn seek_latest(&mut self, kind: MessageKind) -> Option<LoggedMessage> {
        let mut latest = None;
        let mut after = VecDeque::new();
        while let Some(msg) = self.next() {
            if msg.message.kind() == kind {
                latest = Some(msg);
                after.clear();
            } else if latest.is_some() {
                after.push_back(msg);
            }
        }
        self.pending = after;
        latest
    }

    fn read_line(&mut self) -> Option<String> {
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => Some(String::from_utf8_lossy(&buf).into_owned()),
            Err(e) => {
                warn!(error = %e, "reading system log failed");
                None
            }
        }
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = LoggedMessage;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(msg) = self.pending.pop_front() {
            return Some(msg);
        }
        loop {
            let line = self.read_line()?;
            if let Some(msg) = classify_line(&line, self.now) {
                return Some(msg);
            }
        }
    }
}

/// Date of the latest message of `kind` in the first log that has one.
pub fn latest_message(paths: &[PathBuf], kind: MessageKind) -> Result<Option<NaiveDateTime>> {
    let now = Utc::now().naive_utc();
    for path in paths.iter().filter(|p| p.is_file()) {
        let mut reader = LogReader::new(BufReader::new(File::open(path)?), now);
        if let Some(msg) = reader.seek_latest(kind) {
            return Ok(Some(msg.date));
        }
    }
    Ok(None)
}

/// When the engine last checked for updates.
pub fn last_check(paths: &[PathBuf]) -> Result<Option<NaiveDateTime>> {
    latest_message(paths, MessageKind::TargetOs)
}

/// When the engine last installed anything.
pub fn last_run(paths: &[PathBuf]) -> Result<Option<NaiveDateTime>> {
    latest_message(paths, MessageKind::Install)
}
