// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The five pipeline stage workers.
//!
//! Every stage follows the same shape: a tick claims jobs out of the stage's
//! input state with `find_and_advance`, a bounded pool runs one worker per
//! job, and each worker claims `START -> WORK`, runs its external operation,
//! and publishes `WORK -> DONE`. Workers recover nothing themselves: any
//! failure becomes a `job_error` transition and the worker exits; the check
//! engine is the only retry authority. Losing a dv race at any point means
//! the job changed hands, and the worker abandons it without touching
//! `errors`.

pub mod delete;
pub mod dump;
pub mod release;
pub mod restore;
pub mod xfer;

use crate::hooks::HookError;
use crate::supervise::SuperviseError;
use crate::vos::VosError;
use cellcc_core::{ChecksumError, Clock, ConfigError, Job, JobState, JobUpdate, UpdateCtx};
use cellcc_remctl::RemctlError;
use cellcc_store::{Store, StoreError};

/// Deadline stamped on `*_START` rows waiting for a worker slot.
pub(crate) const START_TIMEOUT: i64 = 3600;

/// Deadline stamped when a worker claims `START -> WORK`, covering the
/// pre-command checks; supervised commands extend it as they report.
pub(crate) const CLAIM_TIMEOUT: i64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Supervise(#[from] SuperviseError),
    #[error(transparent)]
    Vos(#[from] VosError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Remctl(#[from] RemctlError),
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl StageError {
    /// An optimistic-concurrency loss: abandon the job, do not record an
    /// error against it.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StageError::Store(StoreError::JobConflict { .. }))
    }
}

/// Claim a job for this worker: `START -> WORK` under the dv + state guard.
pub(crate) async fn claim<C: Clock>(
    store: &Store<C>,
    ctx: &mut UpdateCtx,
    from: JobState,
    to: JobState,
    description: &str,
) -> Result<(), StageError> {
    store
        .update_job(
            ctx,
            &JobUpdate::default()
                .state(to)
                .timeout(CLAIM_TIMEOUT)
                .description(description),
            Some(from),
        )
        .await?;
    Ok(())
}

/// Record a worker's outcome against the job row.
pub(crate) async fn settle<C: Clock>(
    store: &Store<C>,
    job: &Job,
    ctx: &mut UpdateCtx,
    stage: &'static str,
    result: Result<(), StageError>,
) {
    match result {
        Ok(()) => {}
        Err(err) if err.is_conflict() => {
            tracing::info!(
                jobid = job.jobid,
                volume = %job.volname,
                stage,
                "job changed hands mid-stage, abandoning"
            );
        }
        Err(err) => {
            tracing::error!(
                jobid = job.jobid,
                volume = %job.volname,
                stage,
                error = %err,
                "stage failed"
            );
            store.job_error(ctx, &err.to_string()).await;
        }
    }
}

/// A metadata column required by this stage but absent from the row.
pub(crate) fn required<T>(field: Option<T>, name: &str) -> Result<T, StageError> {
    field.ok_or_else(|| StageError::Other(format!("job is missing {name}")))
}

/// Human-readable byte count for progress descriptions.
pub(crate) fn fmt_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_formatting() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KiB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024 + 256 * 1024), "5.3 MiB");
    }

    #[test]
    fn conflict_detection() {
        let conflict = StageError::Store(StoreError::JobConflict { jobid: 1, dv: 2 });
        assert!(conflict.is_conflict());
        assert!(!StageError::Other("x".to_string()).is_conflict());
    }
}
