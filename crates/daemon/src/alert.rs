// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Alert formatting and dispatch.
//!
//! Each check sweep dispatches its accumulated alerts once: a text
//! rendering piped to the text-alert command, a JSON array piped to the
//! JSON-alert command, and/or warn-level log lines. A failing alert command
//! is itself only a logged warning.

use cellcc_core::config::AlertConfig;
use cellcc_core::{Job, JobState};
use serde::Serialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertKind {
    #[serde(rename = "ALERT_RETRY")]
    Retry,
    #[serde(rename = "ALERT_ERRORLIMIT")]
    ErrorLimit,
    #[serde(rename = "ALERT_EXPIRED")]
    Expired,
    #[serde(rename = "ALERT_STALE")]
    Stale,
    #[serde(rename = "ALERT_OLD")]
    Old,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Retry => "ALERT_RETRY",
            AlertKind::ErrorLimit => "ALERT_ERRORLIMIT",
            AlertKind::Expired => "ALERT_EXPIRED",
            AlertKind::Stale => "ALERT_STALE",
            AlertKind::Old => "ALERT_OLD",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub jobid: i64,
    pub volname: String,
    pub src_cell: String,
    pub dst_cell: String,
    pub state: JobState,
    pub errors: u32,
    pub message: String,
}

impl Alert {
    pub fn for_job(kind: AlertKind, job: &Job, message: String) -> Self {
        Self {
            kind,
            jobid: job.jobid,
            volname: job.volname.clone(),
            src_cell: job.src_cell.clone(),
            dst_cell: job.dst_cell.clone(),
            state: job.state,
            errors: job.errors,
            message,
        }
    }

    fn text_line(&self) -> String {
        format!(
            "{}: job {} vol {} {} -> {} (state {}): {}",
            self.kind, self.jobid, self.volname, self.src_cell, self.dst_cell, self.state,
            self.message
        )
    }
}

/// One text line per alert, newline-terminated.
pub fn format_text(alerts: &[Alert]) -> String {
    let mut out = String::new();
    for alert in alerts {
        out.push_str(&alert.text_line());
        out.push('\n');
    }
    out
}

/// Dispatch all of a sweep's alerts per the configured switches.
pub async fn dispatch(config: &AlertConfig, alerts: &[Alert]) {
    if alerts.is_empty() {
        return;
    }

    if config.log {
        for alert in alerts {
            tracing::warn!(
                kind = %alert.kind,
                jobid = alert.jobid,
                volume = %alert.volname,
                dst_cell = %alert.dst_cell,
                "{}",
                alert.message
            );
        }
    }

    if let Some(command) = &config.text_command {
        pipe_to_command(command, format_text(alerts).into_bytes(), "text").await;
    }

    if let Some(command) = &config.json_command {
        match serde_json::to_vec(alerts) {
            Ok(body) => pipe_to_command(command, body, "json").await,
            Err(err) => tracing::warn!(error = %err, "could not encode alerts as json"),
        }
    }
}

async fn pipe_to_command(command: &str, body: Vec<u8>, flavor: &'static str) {
    let spawned = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(error = %err, flavor, "could not spawn alert command");
            return;
        }
    };
    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = stdin.write_all(&body).await {
            tracing::warn!(error = %err, flavor, "could not write to alert command");
        }
    }
    match child.wait_with_output().await {
        Ok(output) if output.status.success() => {}
        Ok(output) => tracing::warn!(
            flavor,
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "alert command failed"
        ),
        Err(err) => tracing::warn!(error = %err, flavor, "alert command did not run"),
    }
}

#[cfg(test)]
#[path = "alert_tests.rs"]
mod tests;
