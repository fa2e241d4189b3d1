// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The check engine: the only retry authority in the system.
//!
//! Each sweep walks every job oldest-first and applies at most one rule:
//! reset (retry a failed job, or raise the error-limit alarm), done
//! (archive and delete finished jobs), expired, stale, old. Alerts
//! accumulate across the sweep and are dispatched once by the caller.

use crate::alert::{Alert, AlertKind};
use crate::stages::StageError;
use cellcc_core::{Clock, Config, Job, JobFilter, JobState, JobUpdate};
use cellcc_store::{Store, StoreError};

/// One full sweep. Returns the alerts to dispatch.
pub async fn run_check<C: Clock>(
    store: &Store<C>,
    config: &Config,
) -> Result<Vec<Alert>, StageError> {
    let now = store.clock().now_epoch();
    let jobs = store.find_jobs(&JobFilter::default()).await?;
    let mut alerts = Vec::new();
    for job in jobs {
        match check_one(store, config, &job, now).await {
            Ok(Some(alert)) => alerts.push(alert),
            Ok(None) => {}
            Err(err) if err.is_conflict() => {
                tracing::debug!(jobid = job.jobid, "job changed hands during check, skipping");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(alerts)
}

async fn check_one<C: Clock>(
    store: &Store<C>,
    config: &Config,
    job: &Job,
    now: i64,
) -> Result<Option<Alert>, StageError> {
    // Reset rule: failed jobs below the error limit go back to the retry
    // state derived from where they failed; at the limit we alarm instead,
    // rate-limited through errorlimit_mtime.
    if job.state == JobState::Error {
        if job.errors < config.check.error_limit {
            let target = job
                .last_good_state
                .map(|s| s.retry_target())
                .unwrap_or(JobState::New);
            let mut ctx = job.update_ctx();
            store
                .update_job(
                    &mut ctx,
                    &JobUpdate {
                        state: Some(target),
                        last_good_state: Some(None),
                        timeout: Some(None),
                        description: Some(format!("retrying after: {}", job.description)),
                        ..JobUpdate::default()
                    },
                    Some(JobState::Error),
                )
                .await?;
            tracing::info!(
                jobid = job.jobid,
                volume = %job.volname,
                target = %target,
                errors = job.errors,
                "retrying failed job"
            );
            return Ok(Some(Alert::for_job(
                AlertKind::Retry,
                job,
                format!("retrying in {} (error {} of {})", target, job.errors, config.check.error_limit),
            )));
        }

        let due = job
            .errorlimit_mtime
            .is_none_or(|at| now - at >= config.check.errorlimit_alert_interval);
        if due {
            let mut ctx = job.update_ctx();
            store
                .update_job(
                    &mut ctx,
                    &JobUpdate {
                        errorlimit_mtime: Some(Some(now)),
                        ..JobUpdate::default()
                    },
                    Some(JobState::Error),
                )
                .await?;
            return Ok(Some(Alert::for_job(
                AlertKind::ErrorLimit,
                job,
                format!(
                    "failed {} times (limit {}); manual intervention required: {}",
                    job.errors, config.check.error_limit, job.description
                ),
            )));
        }
        return Ok(None);
    }

    // Done rule: archive (or just delete) terminal jobs.
    if job.state.is_terminal() {
        let result = if config.check.archive_jobs {
            store.archive_job(job.jobid).await
        } else {
            store.kill_job(job.jobid).await
        };
        match result {
            Ok(()) => {
                tracing::info!(jobid = job.jobid, volume = %job.volname, "finished job removed");
            }
            // Another check server got there first.
            Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        return Ok(None);
    }

    // Expired rule: past the deadline means the owning worker is gone;
    // push the job into ERROR so the reset rule picks it up next sweep.
    if job.expired(now) {
        let mut ctx = job.update_ctx();
        store.job_error(&mut ctx, "deadline exceeded").await;
        return Ok(Some(Alert::for_job(
            AlertKind::Expired,
            job,
            format!("deadline exceeded in {}", job.state),
        )));
    }

    // Stale rule: nothing has touched the row in too long.
    if now - job.mtime > config.check.stale_seconds {
        return Ok(Some(Alert::for_job(
            AlertKind::Stale,
            job,
            format!("no progress for {} seconds", now - job.mtime),
        )));
    }

    // Old rule: the job has existed for too long overall.
    if now - job.ctime > config.check.old_seconds {
        return Ok(Some(Alert::for_job(
            AlertKind::Old,
            job,
            format!("job is {} seconds old", now - job.ctime),
        )));
    }

    Ok(None)
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
