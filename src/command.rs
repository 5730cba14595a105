//! Thin wrappers around external networking tools.
//!
//! Backend commands are side effects whose failure is logged but never
//! aborts the workflow, so most callers use [`report`] and move on.

use anyhow::{Context, Result};
use log::{error, info};
use std::process::Output;
use tokio::process::Command;

/// Run a command to completion and capture its output
pub async fn run(program: &str, args: &[&str]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .context(format!("failed to spawn {program}"))
}

/// Run a command, log it and report whether it exited successfully
pub async fn report(program: &str, args: &[&str]) -> bool {
    let line = command_line(program, args);
    info!("command: {line}");

    match run(program, args).await {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            error!(
                "{line} failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            error!("{line} failed: {e:#}");
            false
        }
    }
}

/// Run a command without logging it and report whether it succeeded
pub async fn succeeds(program: &str, args: &[&str]) -> bool {
    run(program, args)
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run a command and return its stdout, or an empty string on any failure
pub async fn stdout(program: &str, args: &[&str]) -> String {
    match run(program, args).await {
        Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
        Err(e) => {
            error!("{} failed: {e:#}", command_line(program, args));
            String::new()
        }
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
