// src/notify/command.rs

//! Delivery through an external notification tool.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::exec::supervisor::exit_code;
use crate::notify::{Notification, Notifier, render};

/// Runs `<command...> -s <severity> <text>` for every rendered message and
/// `<flush_command...>` on flush.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: Vec<String>,
    flush_command: Option<Vec<String>>,
}

impl CommandNotifier {
    pub fn new(command: Vec<String>, flush_command: Option<Vec<String>>) -> Self {
        Self {
            command,
            flush_command,
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(
        &mut self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for (severity, text) in render(&notification) {
                let args = ["-s".to_string(), severity.to_string(), text];
                let code = run(&self.command, &args).await?;
                if code != 0 {
                    warn!(%severity, exit_code = code, "notification creation failed");
                }
            }
            Ok(())
        })
    }

    fn flush(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let Some(command) = &self.flush_command else {
                return Ok(());
            };
            let code = run(command, &[]).await?;
            if code != 0 {
                warn!(exit_code = code, "notifier failed");
            }
            Ok(())
        })
    }
}

async fn run(command: &[String], extra: &[String]) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        return Ok(0);
    };
    debug!(program, "running notification command");
    let status = Command::new(program)
        .args(args)
        .args(extra)
        .stdin(Stdio::null())
        .status()
        .await
        .with_context(|| format!("spawning notification command '{program}'"))?;
    Ok(exit_code(status))
}
