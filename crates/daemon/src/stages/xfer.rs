// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transfer stage: runs on the destination-cell restore host.
//!
//! Pulls the dump blob from the origin host over the remote-command channel,
//! verifies size and checksum against the job row, asks the origin to drop
//! its copy, and advances to `XFER_DONE`. A verification mismatch deletes
//! the local blob and fails the job so the check engine can retry the fetch.

use crate::pool::WorkerPool;
use crate::scratch;
use crate::stages::{claim, fmt_bytes, required, settle, StageError, START_TIMEOUT};
use crate::supervise::{monitor_future, IntervalSchedule};
use cellcc_core::{Checksum, Clock, Config, Job, JobFilter, JobState, JobUpdate, UpdateCtx};
use cellcc_remctl::RemctlClient;
use cellcc_store::Store;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;

/// Fetch progress-callback schedule; the blob sizes are known, so there is
/// no need for the dump stage's fast early samples.
const XFER_INTERVALS: [i64; 2] = [5, 30];

/// Seconds of deadline slack past each progress interval.
const XFER_SLACK: i64 = 120;

pub async fn tick<C: Clock + 'static>(
    store: &Store<C>,
    config: &Arc<Config>,
    dst_cell: &str,
    qname: &str,
    pool_size: usize,
) -> Result<(), StageError> {
    let filter = JobFilter::default()
        .with_dst_cells(vec![dst_cell.to_string()])
        .with_qname(qname);
    let jobs = store
        .find_and_advance(
            JobState::DumpDone,
            JobState::XferStart,
            &filter,
            Some(START_TIMEOUT),
            "waiting for a transfer worker",
        )
        .await?;
    if jobs.is_empty() {
        return Ok(());
    }

    let mut pool = WorkerPool::new(pool_size);
    for job in jobs {
        let store = store.clone();
        let config = Arc::clone(config);
        pool.dispatch(async move {
            let mut ctx = job.update_ctx();
            let result = xfer_one(&store, &config, &job, &mut ctx).await;
            settle(&store, &job, &mut ctx, "transfer", result).await;
        })
        .await;
    }
    pool.join_all().await;
    Ok(())
}

async fn xfer_one<C: Clock + 'static>(
    store: &Store<C>,
    config: &Arc<Config>,
    job: &Job,
    ctx: &mut UpdateCtx,
) -> Result<(), StageError> {
    claim(
        store,
        ctx,
        JobState::XferStart,
        JobState::XferWork,
        "preparing to fetch dump",
    )
    .await?;

    let dump_fqdn = required(job.dump_fqdn.clone(), "dump_fqdn")?;
    let dump_filename = required(job.dump_filename.clone(), "dump_filename")?;
    let dump_checksum = required(job.dump_checksum.clone(), "dump_checksum")?;
    let dump_filesize = required(job.dump_filesize, "dump_filesize")?;
    let expected = Checksum::parse(&dump_checksum)?;

    let scratch_dir = config.restore_scratch_dir()?.to_path_buf();
    if !scratch::has_free_space(
        &scratch_dir,
        dump_filesize.max(0) as u64,
        config.restore.scratch_min_free,
    )? {
        store
            .update_job(
                ctx,
                &JobUpdate::default()
                    .state(JobState::XferStart)
                    .clear_timeout()
                    .description("waiting for scratch space"),
                Some(JobState::XferWork),
            )
            .await?;
        tracing::warn!(
            jobid = job.jobid,
            volume = %job.volname,
            needed = dump_filesize,
            "insufficient scratch space, job returned to queue"
        );
        return Ok(());
    }

    let local_name = scratch::dump_filename(&job.volname, job.jobid);
    let local_path = scratch_dir.join(&local_name);
    let client = RemctlClient::new(config.remctl.command.clone(), config.remctl.port);
    let schedule = IntervalSchedule::new(XFER_INTERVALS.to_vec());

    store
        .update_job(
            ctx,
            &JobUpdate::default()
                .description("fetching dump from origin")
                .timeout(schedule.first() + XFER_SLACK),
            Some(JobState::XferWork),
        )
        .await?;

    let fetch = {
        let client = client.clone();
        let host = dump_fqdn.clone();
        let name = dump_filename.clone();
        let dest = local_path.clone();
        async move {
            client
                .get_dump(&host, &name, &dest)
                .await
                .map_err(StageError::from)
        }
    };
    let progress_ctx = Arc::new(Mutex::new(*ctx));
    let cb_store = store.clone();
    let cb_ctx = Arc::clone(&progress_ctx);
    let cb_path = local_path.clone();
    let total = dump_filesize.max(0) as u64;
    let fetched = monitor_future(
        fetch,
        &schedule,
        move |next: i64| -> BoxFuture<'static, Result<(), StageError>> {
            let store = cb_store.clone();
            let shared = Arc::clone(&cb_ctx);
            let path = cb_path.clone();
            Box::pin(async move {
                let bytes = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
                let desc = format!("transferred {} / {}", fmt_bytes(bytes), fmt_bytes(total));
                let mut ctx = *shared.lock();
                store
                    .update_job(
                        &mut ctx,
                        &JobUpdate::default().description(desc).timeout(next + XFER_SLACK),
                        Some(JobState::XferWork),
                    )
                    .await?;
                *shared.lock() = ctx;
                Ok(())
            })
        },
    )
    .await;
    *ctx = *progress_ctx.lock();
    if let Err(err) = fetched {
        let _ = std::fs::remove_file(&local_path);
        return Err(err);
    }

    store
        .update_job(
            ctx,
            &JobUpdate::default()
                .restore_filename(local_name.clone())
                .description("verifying dump"),
            Some(JobState::XferWork),
        )
        .await?;

    if let Err(err) = verify_blob(&local_path, dump_filesize, &expected).await {
        let _ = std::fs::remove_file(&local_path);
        store
            .update_job(
                ctx,
                &JobUpdate::default().clear_restore_filename(),
                Some(JobState::XferWork),
            )
            .await?;
        return Err(err);
    }

    // Drop the origin copy first; only then forget the remote filename.
    client.remove_dump(&dump_fqdn, &dump_filename).await?;
    store
        .update_job(
            ctx,
            &JobUpdate {
                state: Some(JobState::XferDone),
                dump_filename: Some(None),
                timeout: Some(None),
                description: Some("transfer complete; waiting for restore".to_string()),
                ..JobUpdate::default()
            },
            Some(JobState::XferWork),
        )
        .await?;
    tracing::info!(
        jobid = job.jobid,
        volume = %job.volname,
        bytes = dump_filesize,
        "transfer complete"
    );
    Ok(())
}

async fn verify_blob(
    path: &std::path::Path,
    expected_size: i64,
    expected: &Checksum,
) -> Result<(), StageError> {
    let actual_size = std::fs::metadata(path)?.len() as i64;
    if actual_size != expected_size {
        return Err(StageError::Other(format!(
            "dump size mismatch: expected {expected_size}, fetched {actual_size}"
        )));
    }
    let path = path.to_path_buf();
    let expected = expected.clone();
    tokio::task::spawn_blocking(move || expected.verify_file(&path))
        .await
        .map_err(|e| StageError::Other(format!("checksum task failed: {e}")))??;
    Ok(())
}
