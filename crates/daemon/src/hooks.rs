// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator hook commands: the volume filter and the site picker.
//!
//! Both are shell commands talked to over environment variables and stdout.
//! Blank lines and `#` comments are tolerated; anything else must match the
//! expected shape exactly, and a non-zero exit is fatal.

use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("spawning hook command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("hook command failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("bad hook output: {0}")]
    BadOutput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Include,
    Exclude,
}

/// Environment handed to the volume-filter hook.
#[derive(Debug, Clone)]
pub struct FilterRequest<'a> {
    pub volume: &'a str,
    pub src_cell: &'a str,
    pub dst_cell: &'a str,
    pub qname: &'a str,
    /// `sync` or `delete`.
    pub operation: &'a str,
}

/// One `server partition` line from the site picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePick {
    pub server: String,
    pub partition: String,
}

async fn run_hook(command: &str, envs: &[(&str, &str)]) -> Result<String, HookError> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(HookError::Spawn)?;
    if !output.status.success() {
        return Err(HookError::Failed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Lines that carry payload: not blank, not `#` comments.
fn payload_lines(out: &str) -> impl Iterator<Item = &str> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

/// Ask the volume filter whether to include this (volume, destination).
pub async fn run_volume_filter(
    command: &str,
    req: &FilterRequest<'_>,
) -> Result<FilterDecision, HookError> {
    let envs = [
        ("CELLCC_FILTER_VOLUME", req.volume),
        ("CELLCC_FILTER_SRC_CELL", req.src_cell),
        ("CELLCC_FILTER_DST_CELL", req.dst_cell),
        ("CELLCC_FILTER_QNAME", req.qname),
        ("CELLCC_FILTER_OPERATION", req.operation),
    ];
    let out = run_hook(command, &envs).await?;
    parse_filter_output(&out)
}

pub(crate) fn parse_filter_output(out: &str) -> Result<FilterDecision, HookError> {
    let mut lines = payload_lines(out);
    let first = lines
        .next()
        .ok_or_else(|| HookError::BadOutput("filter produced no decision".to_string()))?;
    if lines.next().is_some() {
        return Err(HookError::BadOutput(
            "filter produced more than one decision line".to_string(),
        ));
    }
    match first {
        "include" => Ok(FilterDecision::Include),
        "exclude" => Ok(FilterDecision::Exclude),
        other => Err(HookError::BadOutput(format!(
            "filter said {other:?}, expected include or exclude"
        ))),
    }
}

/// Ask the site picker where to create a volume in `dst_cell`.
///
/// The first returned site hosts the RW volume (and a replica); the rest
/// are additional replica sites.
pub async fn run_site_picker(
    command: &str,
    volume: &str,
    src_cell: &str,
    dst_cell: &str,
) -> Result<Vec<SitePick>, HookError> {
    let envs = [
        ("CELLCC_PS_VOLUME", volume),
        ("CELLCC_PS_SRC_CELL", src_cell),
        ("CELLCC_PS_DST_CELL", dst_cell),
        ("CELLCC_PS_CELL", dst_cell),
    ];
    let out = run_hook(command, &envs).await?;
    parse_site_picker_output(&out)
}

pub(crate) fn parse_site_picker_output(out: &str) -> Result<Vec<SitePick>, HookError> {
    let mut sites = Vec::new();
    for line in payload_lines(out) {
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(server), Some(partition), None) => sites.push(SitePick {
                server: server.to_string(),
                partition: partition.to_string(),
            }),
            _ => {
                return Err(HookError::BadOutput(format!(
                    "expected \"server partition\", got {line:?}"
                )))
            }
        }
    }
    if sites.is_empty() {
        return Err(HookError::BadOutput(
            "site picker produced no sites".to_string(),
        ));
    }
    Ok(sites)
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
