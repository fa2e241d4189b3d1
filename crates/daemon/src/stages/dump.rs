// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dump stage: runs where the source volume lives.
//!
//! Claims `NEW` jobs, sizes the dump against scratch space, runs the dump
//! command under the supervisor (reporting transfer progress into the job
//! description and pushing the deadline forward), then records the blob's
//! name, size, and checksum and advances to `DUMP_DONE`.

use crate::pool::WorkerPool;
use crate::scratch;
use crate::stages::{claim, fmt_bytes, settle, StageError, START_TIMEOUT};
use crate::supervise::{monitor_child, spawn_child, IntervalSchedule};
use crate::vos::{Vos, VosError};
use cellcc_core::{Checksum, Clock, Config, Job, JobFilter, JobState, JobUpdate, UpdateCtx};
use cellcc_store::Store;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Advance `NEW` jobs for this source and run one dump worker per claim.
pub async fn tick<C: Clock + 'static>(
    store: &Store<C>,
    config: &Arc<Config>,
    dump_host: &str,
    src_cell: &str,
    dst_cells: &[String],
) -> Result<(), StageError> {
    let filter = JobFilter::default()
        .with_src_cell(src_cell)
        .with_dst_cells(dst_cells.to_vec());
    let jobs = store
        .find_and_advance(
            JobState::New,
            JobState::DumpStart,
            &filter,
            Some(START_TIMEOUT),
            "waiting for a dump worker",
        )
        .await?;
    if jobs.is_empty() {
        return Ok(());
    }

    let mut pool = WorkerPool::new(config.dump.max_parallel);
    for job in jobs {
        let store = store.clone();
        let config = Arc::clone(config);
        let host = dump_host.to_string();
        pool.dispatch(async move {
            let mut ctx = job.update_ctx();
            let result = dump_one(&store, &config, &host, &job, &mut ctx).await;
            settle(&store, &job, &mut ctx, "dump", result).await;
        })
        .await;
    }
    pool.join_all().await;
    Ok(())
}

/// Incremental baseline decision for one job.
enum Baseline {
    Full,
    Incremental(i64),
    /// Destination and source update stamps match.
    Unchanged(i64),
}

#[derive(Debug, thiserror::Error)]
enum BaselineError {
    /// Never subject to fulldump-on-error: the destination being ahead of
    /// the source means something else is writing it.
    #[error("destination copy of {volname} is newer than the source ({dst} > {src})")]
    DestinationNewer { volname: String, dst: i64, src: i64 },
    #[error(transparent)]
    Vos(#[from] VosError),
}

async fn incremental_baseline(
    vos: &Vos,
    volname: &str,
    src_cell: &str,
    dst_cell: &str,
) -> Result<Baseline, BaselineError> {
    if !vos.exists(volname, dst_cell).await? {
        return Ok(Baseline::Full);
    }
    let src = vos.examine(volname, src_cell).await?;
    let dst = vos.examine(volname, dst_cell).await?;
    if dst.lastupdate > src.lastupdate {
        return Err(BaselineError::DestinationNewer {
            volname: volname.to_string(),
            dst: dst.lastupdate,
            src: src.lastupdate,
        });
    }
    if dst.lastupdate == 0 {
        return Ok(Baseline::Full);
    }
    if dst.lastupdate == src.lastupdate {
        return Ok(Baseline::Unchanged(dst.lastupdate));
    }
    Ok(Baseline::Incremental(dst.lastupdate))
}

async fn dump_one<C: Clock + 'static>(
    store: &Store<C>,
    config: &Arc<Config>,
    dump_host: &str,
    job: &Job,
    ctx: &mut UpdateCtx,
) -> Result<(), StageError> {
    claim(
        store,
        ctx,
        JobState::DumpStart,
        JobState::DumpWork,
        "examining volume",
    )
    .await?;
    let vos = Vos::from_config(&config.vos);

    let inc = &config.dump.incremental;
    let baseline = if inc.enabled {
        match incremental_baseline(&vos, &job.volname, &job.src_cell, &job.dst_cell).await {
            Ok(Baseline::Unchanged(_)) if inc.skip_unchanged => {
                store
                    .update_job(
                        ctx,
                        &JobUpdate::default()
                            .state(JobState::ReleaseDone)
                            .clear_timeout()
                            .description("destination already current; dump skipped"),
                        Some(JobState::DumpWork),
                    )
                    .await?;
                tracing::info!(
                    jobid = job.jobid,
                    volume = %job.volname,
                    "destination unchanged, short-circuiting to RELEASE_DONE"
                );
                return Ok(());
            }
            Ok(Baseline::Unchanged(ts)) | Ok(Baseline::Incremental(ts)) => Some(ts),
            Ok(Baseline::Full) => None,
            Err(err @ BaselineError::DestinationNewer { .. }) => {
                return Err(StageError::Other(err.to_string()));
            }
            Err(BaselineError::Vos(err)) if inc.fulldump_on_error => {
                tracing::warn!(
                    jobid = job.jobid,
                    error = %err,
                    "incremental baseline failed, falling back to a full dump"
                );
                None
            }
            Err(BaselineError::Vos(err)) => return Err(err.into()),
        }
    } else {
        None
    };

    let scratch_dir = config.dump_scratch_dir()?.to_path_buf();
    let size = vos.size(&job.volname, &job.src_cell, baseline).await?;
    if !scratch::has_free_space(&scratch_dir, size.max(0) as u64, config.dump.scratch_min_free)? {
        // Not a failure: return the job to its pre-WORK state with no
        // deadline and let a later tick try again.
        store
            .update_job(
                ctx,
                &JobUpdate::default()
                    .state(JobState::DumpStart)
                    .clear_timeout()
                    .description("waiting for scratch space"),
                Some(JobState::DumpWork),
            )
            .await?;
        tracing::warn!(
            jobid = job.jobid,
            volume = %job.volname,
            needed = size,
            "insufficient scratch space, job returned to queue"
        );
        return Ok(());
    }

    let filename = scratch::dump_filename(&job.volname, job.jobid);
    let blob = scratch_dir.join(&filename);
    let stderr_path = scratch_dir.join(scratch::stderr_filename(&filename));
    let schedule = IntervalSchedule::new(config.dump.monitor_intervals.clone());

    store
        .update_job(
            ctx,
            &JobUpdate::default()
                .description("dumping volume")
                .timeout(schedule.first() + config.dump.timeout_slack),
            Some(JobState::DumpWork),
        )
        .await?;

    let dumped = run_dump(
        store, config, &vos, job, ctx, baseline, size as u64, &blob, &stderr_path, &schedule,
    )
    .await;
    if let Err(err) = dumped {
        let _ = std::fs::remove_file(&blob);
        let _ = std::fs::remove_file(&stderr_path);
        return Err(err);
    }
    let _ = std::fs::remove_file(&stderr_path);

    let algo = config.checksum_algo()?;
    let blob_for_digest = blob.clone();
    let checksum =
        tokio::task::spawn_blocking(move || Checksum::file(algo, &blob_for_digest))
            .await
            .map_err(|e| StageError::Other(format!("checksum task failed: {e}")))??;
    let filesize = std::fs::metadata(&blob)?.len() as i64;

    let update = JobUpdate {
        state: Some(JobState::DumpDone),
        dump_fqdn: Some(Some(dump_host.to_string())),
        dump_method: Some(Some("remctl".to_string())),
        dump_port: Some(config.remctl.port.map(i64::from)),
        dump_filename: Some(Some(filename)),
        dump_checksum: Some(Some(checksum.to_string())),
        dump_filesize: Some(Some(filesize)),
        vol_lastupdate: Some(baseline.unwrap_or(0)),
        timeout: Some(None),
        description: Some("dump complete; waiting for transfer".to_string()),
        ..JobUpdate::default()
    };
    if let Err(err) = store.update_job(ctx, &update, Some(JobState::DumpWork)).await {
        let _ = std::fs::remove_file(&blob);
        return Err(err.into());
    }
    tracing::info!(
        jobid = job.jobid,
        volume = %job.volname,
        bytes = filesize,
        "dump complete"
    );
    Ok(())
}

struct Progress {
    ctx: UpdateCtx,
    last_bytes: u64,
    last_at: Instant,
}

#[allow(clippy::too_many_arguments)]
async fn run_dump<C: Clock + 'static>(
    store: &Store<C>,
    config: &Arc<Config>,
    vos: &Vos,
    job: &Job,
    ctx: &mut UpdateCtx,
    baseline: Option<i64>,
    expected: u64,
    blob: &Path,
    stderr_path: &Path,
    schedule: &IntervalSchedule,
) -> Result<(), StageError> {
    let spec = vos.dump_spec(&job.volname, &job.src_cell, baseline, blob, stderr_path);
    let mut child = spawn_child(&spec)?;

    let progress = Arc::new(Mutex::new(Progress {
        ctx: *ctx,
        last_bytes: 0,
        last_at: Instant::now(),
    }));
    let cb_store = store.clone();
    let cb_progress = Arc::clone(&progress);
    let cb_blob = blob.to_path_buf();
    let slack = config.dump.timeout_slack;

    let result = monitor_child(
        &mut child,
        stderr_path,
        schedule,
        move |next: i64| -> BoxFuture<'static, Result<(), StageError>> {
            let store = cb_store.clone();
            let progress = Arc::clone(&cb_progress);
            let blob = cb_blob.clone();
            Box::pin(async move {
                let bytes = tokio::fs::metadata(&blob).await.map(|m| m.len()).unwrap_or(0);
                let (mut ctx, rate) = {
                    let mut p = progress.lock();
                    let elapsed = p.last_at.elapsed().as_secs_f64().max(0.001);
                    let rate = bytes.saturating_sub(p.last_bytes) as f64 / elapsed;
                    p.last_bytes = bytes;
                    p.last_at = Instant::now();
                    (p.ctx, rate)
                };
                let desc = format!(
                    "transferred {} / {} ({}/s)",
                    fmt_bytes(bytes),
                    fmt_bytes(expected),
                    fmt_bytes(rate as u64)
                );
                store
                    .update_job(
                        &mut ctx,
                        &JobUpdate::default().description(desc).timeout(next + slack),
                        Some(JobState::DumpWork),
                    )
                    .await?;
                progress.lock().ctx = ctx;
                Ok(())
            })
        },
    )
    .await;

    // Pick up any dv advances the progress callback made.
    *ctx = progress.lock().ctx;
    result
}
