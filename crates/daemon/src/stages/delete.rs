// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delete stage: removes a volume from the destination cell.
//!
//! Sites go in the order RO -> BK -> RW so replica removals precede the
//! authoritative copy. A volume that is already gone is success.

use crate::pool::WorkerPool;
use crate::stages::{claim, settle, StageError, START_TIMEOUT};
use crate::vos::{SiteKind, Vos};
use cellcc_core::{Clock, Config, Job, JobFilter, JobState, JobUpdate, UpdateCtx};
use cellcc_store::Store;
use std::sync::Arc;

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
            JobState::DeleteNew,
            JobState::DeleteDestStart,
            &filter,
            Some(START_TIMEOUT),
            "waiting for a delete worker",
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
            let result = delete_one(&store, &config, &job, &mut ctx).await;
            settle(&store, &job, &mut ctx, "delete", result).await;
        })
        .await;
    }
    pool.join_all().await;
    Ok(())
}

async fn delete_one<C: Clock>(
    store: &Store<C>,
    config: &Arc<Config>,
    job: &Job,
    ctx: &mut UpdateCtx,
) -> Result<(), StageError> {
    claim(
        store,
        ctx,
        JobState::DeleteDestStart,
        JobState::DeleteDestWork,
        "removing volume sites",
    )
    .await?;

    let vos = Vos::from_config(&config.vos);
    if vos.exists(&job.volname, &job.dst_cell).await? {
        remove_sites(&vos, job).await?;
    } else {
        tracing::info!(
            jobid = job.jobid,
            volume = %job.volname,
            "volume already absent from destination"
        );
    }

    store
        .update_job(
            ctx,
            &JobUpdate {
                state: Some(JobState::DeleteDestDone),
                timeout: Some(None),
                description: Some("deletion complete".to_string()),
                ..JobUpdate::default()
            },
            Some(JobState::DeleteDestWork),
        )
        .await?;
    tracing::info!(jobid = job.jobid, volume = %job.volname, "deletion complete");
    Ok(())
}

async fn remove_sites(vos: &Vos, job: &Job) -> Result<(), StageError> {
    let info = vos.examine(&job.volname, &job.dst_cell).await?;

    let by_kind = |kind: SiteKind| info.sites.iter().filter(move |s| s.kind == kind);
    for site in by_kind(SiteKind::Ro) {
        vos.remove(
            &site.server,
            &site.partition,
            &format!("{}.readonly", job.volname),
            &job.dst_cell,
        )
        .await?;
    }
    for site in by_kind(SiteKind::Bk) {
        vos.remove(
            &site.server,
            &site.partition,
            &format!("{}.backup", job.volname),
            &job.dst_cell,
        )
        .await?;
    }
    // The backup volume shadows the RW site even when it is not listed.
    if let Some(rw) = info.rw_site() {
        vos.remove(
            &rw.server,
            &rw.partition,
            &format!("{}.backup", job.volname),
            &job.dst_cell,
        )
        .await?;
        vos.remove(&rw.server, &rw.partition, &job.volname, &job.dst_cell)
            .await?;
    }
    Ok(())
}
