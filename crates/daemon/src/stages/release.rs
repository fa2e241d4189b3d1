// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Release stage: publishes the restored RW volume to its replicas.
//!
//! Runs the release command with the queue's configured flag map, then
//! re-examines the volume: any replica still marked stale, or a lingering
//! lock, fails the job.

use crate::pool::WorkerPool;
use crate::stages::{claim, settle, StageError, START_TIMEOUT};
use crate::vos::Vos;
use cellcc_core::{Clock, Config, Job, JobFilter, JobState, JobUpdate, UpdateCtx};
use cellcc_store::Store;
use std::sync::Arc;

/// Deadline while the release command runs.
const RELEASE_TIMEOUT: i64 = 3600;

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
            JobState::RestoreDone,
            JobState::ReleaseStart,
            &filter,
            Some(START_TIMEOUT),
            "waiting for a release worker",
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
            let result = release_one(&store, &config, &job, &mut ctx).await;
            settle(&store, &job, &mut ctx, "release", result).await;
        })
        .await;
    }
    pool.join_all().await;
    Ok(())
}

async fn release_one<C: Clock>(
    store: &Store<C>,
    config: &Arc<Config>,
    job: &Job,
    ctx: &mut UpdateCtx,
) -> Result<(), StageError> {
    claim(
        store,
        ctx,
        JobState::ReleaseStart,
        JobState::ReleaseWork,
        "releasing volume",
    )
    .await?;
    store
        .update_job(
            ctx,
            &JobUpdate::default().timeout(RELEASE_TIMEOUT),
            Some(JobState::ReleaseWork),
        )
        .await?;

    let vos = Vos::from_config(&config.vos);
    let flags = config.queue_release_flags(&job.qname);
    vos.release(&job.volname, &job.dst_cell, &flags).await?;

    let info = vos.examine(&job.volname, &job.dst_cell).await?;
    let stale: Vec<String> = info
        .stale_sites()
        .map(|s| format!("{} {}", s.server, s.partition))
        .collect();
    if !stale.is_empty() {
        return Err(StageError::Other(format!(
            "release left stale replicas: {}",
            stale.join(", ")
        )));
    }
    if info.locked {
        return Err(StageError::Other(format!(
            "{} is still locked after release",
            job.volname
        )));
    }

    store
        .update_job(
            ctx,
            &JobUpdate {
                state: Some(JobState::ReleaseDone),
                timeout: Some(None),
                description: Some("release complete".to_string()),
                ..JobUpdate::default()
            },
            Some(JobState::ReleaseWork),
        )
        .await?;
    tracing::info!(jobid = job.jobid, volume = %job.volname, "release complete");
    Ok(())
}
