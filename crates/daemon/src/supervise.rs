// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child supervision with scheduled progress callbacks.
//!
//! A stage worker spawns its external command with stdout/stderr captured to
//! files, then monitors it against an interval schedule: after each entry
//! elapses, the progress callback runs with the *next* interval as its
//! argument (the final entry repeats forever). Callers use that argument to
//! push the job's database timeout past the next quiet period.
//!
//! If monitoring fails (the callback errors, typically on an optimistic-
//! concurrency conflict), the child is killed before the error propagates,
//! so no dump or restore process outlives its supervisor. Children are also
//! spawned with `kill_on_drop` as a backstop for task cancellation.

use futures_util::future::BoxFuture;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

#[derive(Debug, thiserror::Error)]
pub enum SuperviseError {
    #[error("spawning {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("child exited with status {code}")]
    Exited { code: i32 },

    #[error("child terminated by signal {signal}")]
    Signaled { signal: i32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Progress-callback schedule in seconds, e.g. `[1, 1, 5, 30]`.
#[derive(Debug, Clone)]
pub struct IntervalSchedule {
    intervals: Vec<i64>,
}

impl IntervalSchedule {
    /// Falls back to a single 30s interval if handed an empty list.
    pub fn new(intervals: Vec<i64>) -> Self {
        let intervals = if intervals.is_empty() {
            vec![30]
        } else {
            intervals
        };
        Self { intervals }
    }

    /// The interval at position `i`; past the end, the final entry repeats.
    pub fn get(&self, i: usize) -> i64 {
        let last = self.intervals.len() - 1;
        self.intervals[i.min(last)]
    }

    /// First sleep of the schedule.
    pub fn first(&self) -> i64 {
        self.intervals[0]
    }
}

/// An external command with its capture files.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub command: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    /// Stdout capture file; discarded when absent.
    pub stdout: Option<PathBuf>,
    /// Stderr capture file, read back on failure.
    pub stderr: PathBuf,
}

/// Spawn the child with output captured and `kill_on_drop` set.
pub fn spawn_child(spec: &ChildSpec) -> Result<Child, SuperviseError> {
    let spawn_err = |source| SuperviseError::Spawn {
        command: spec.command.clone(),
        source,
    };
    let stdout = match &spec.stdout {
        Some(path) => Stdio::from(std::fs::File::create(path).map_err(spawn_err)?),
        None => Stdio::null(),
    };
    let stderr = Stdio::from(std::fs::File::create(&spec.stderr).map_err(spawn_err)?);

    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);
    cmd.spawn().map_err(spawn_err)
}

/// Wait for the child, firing `progress` on the schedule.
///
/// On a non-zero exit or signal, every non-blank line of the stderr capture
/// is logged before the failure is returned. A progress error kills and
/// reaps the child first.
pub async fn monitor_child<E, F>(
    child: &mut Child,
    stderr_path: &Path,
    schedule: &IntervalSchedule,
    mut progress: F,
) -> Result<(), E>
where
    E: From<SuperviseError>,
    F: FnMut(i64) -> BoxFuture<'static, Result<(), E>>,
{
    let mut idx = 0usize;
    loop {
        let sleep_secs = schedule.get(idx).max(1) as u64;
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(SuperviseError::Io)?;
                return finish(status, stderr_path).map_err(E::from);
            }
            _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {
                idx += 1;
                if let Err(err) = progress(schedule.get(idx)).await {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(err);
                }
            }
        }
    }
}

/// Monitor an in-process operation on the same schedule.
///
/// Dropping `fut` on a progress failure cancels the operation; callers that
/// wrap child processes keep the no-orphan contract via `kill_on_drop`.
pub async fn monitor_future<T, E, Fut, F>(
    fut: Fut,
    schedule: &IntervalSchedule,
    mut progress: F,
) -> Result<T, E>
where
    Fut: std::future::Future<Output = Result<T, E>>,
    F: FnMut(i64) -> BoxFuture<'static, Result<(), E>>,
{
    tokio::pin!(fut);
    let mut idx = 0usize;
    loop {
        let sleep_secs = schedule.get(idx).max(1) as u64;
        tokio::select! {
            result = &mut fut => return result,
            _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {
                idx += 1;
                progress(schedule.get(idx)).await?;
            }
        }
    }
}

fn finish(status: std::process::ExitStatus, stderr_path: &Path) -> Result<(), SuperviseError> {
    if status.success() {
        return Ok(());
    }
    for line in std::fs::read_to_string(stderr_path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
    {
        tracing::error!(stderr = line, "child stderr");
    }
    match (status.code(), status.signal()) {
        (_, Some(signal)) => Err(SuperviseError::Signaled { signal }),
        (Some(code), None) => Err(SuperviseError::Exited { code }),
        (None, None) => Err(SuperviseError::Exited { code: -1 }),
    }
}

#[cfg(test)]
#[path = "supervise_tests.rs"]
mod tests;
