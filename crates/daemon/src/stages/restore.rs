// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restore stage: materializes the fetched blob into the destination cell.
//!
//! A destination volume that does not exist yet is created at the sites the
//! site-picker hook names (first line RW plus replica, rest RO replicas)
//! with a minimal quota, then taken offline before the restore overwrites
//! it.

use crate::hooks;
use crate::pool::WorkerPool;
use crate::stages::{claim, required, settle, StageError, START_TIMEOUT};
use crate::vos::Vos;
use cellcc_core::{Clock, Config, ConfigError, Job, JobFilter, JobState, JobUpdate, UpdateCtx};
use cellcc_store::Store;
use std::sync::Arc;

/// Quota (KB) for freshly created destination volumes; the restore
/// overwrites it with the dump's own quota.
const CREATE_QUOTA_KB: u64 = 1;

/// Deadline while the restore command runs.
const RESTORE_TIMEOUT: i64 = 3600;

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
            JobState::XferDone,
            JobState::RestoreStart,
            &filter,
            Some(START_TIMEOUT),
            "waiting for a restore worker",
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
            let result = restore_one(&store, &config, &job, &mut ctx).await;
            settle(&store, &job, &mut ctx, "restore", result).await;
        })
        .await;
    }
    pool.join_all().await;
    Ok(())
}

async fn restore_one<C: Clock>(
    store: &Store<C>,
    config: &Arc<Config>,
    job: &Job,
    ctx: &mut UpdateCtx,
) -> Result<(), StageError> {
    claim(
        store,
        ctx,
        JobState::RestoreStart,
        JobState::RestoreWork,
        "preparing restore",
    )
    .await?;

    let restore_filename = required(job.restore_filename.clone(), "restore_filename")?;
    let blob = config.restore_scratch_dir()?.join(&restore_filename);
    if !blob.exists() {
        return Err(StageError::Other(format!(
            "local dump {restore_filename} is missing"
        )));
    }
    let vos = Vos::from_config(&config.vos);

    if !vos.exists(&job.volname, &job.dst_cell).await? {
        create_destination_volume(&vos, config, job).await?;
    }

    let info = vos.examine(&job.volname, &job.dst_cell).await?;
    let rw = info.rw_site().ok_or_else(|| {
        StageError::Other(format!("{} has no RW site in {}", job.volname, job.dst_cell))
    })?;

    store
        .update_job(
            ctx,
            &JobUpdate::default()
                .description("restoring volume")
                .timeout(RESTORE_TIMEOUT),
            Some(JobState::RestoreWork),
        )
        .await?;

    let incremental = job.vol_lastupdate > 0;
    vos.restore(
        &rw.server,
        &rw.partition,
        &job.volname,
        &job.dst_cell,
        &blob,
        incremental,
    )
    .await?;
    let _ = std::fs::remove_file(&blob);

    store
        .update_job(
            ctx,
            &JobUpdate {
                state: Some(JobState::RestoreDone),
                restore_filename: Some(None),
                timeout: Some(None),
                description: Some("restore complete; waiting for release".to_string()),
                ..JobUpdate::default()
            },
            Some(JobState::RestoreWork),
        )
        .await?;
    tracing::info!(
        jobid = job.jobid,
        volume = %job.volname,
        incremental,
        "restore complete"
    );
    Ok(())
}

/// Create the volume at the picked sites: RW at the first site (which also
/// gets a replica), RO replicas at the rest, then offline for the restore.
async fn create_destination_volume(
    vos: &Vos,
    config: &Arc<Config>,
    job: &Job,
) -> Result<(), StageError> {
    let command = config
        .restore
        .pick_sites_command
        .as_deref()
        .ok_or_else(|| {
            StageError::Config(ConfigError::Missing("restore/pick-sites-command".to_string()))
        })?;
    let sites = hooks::run_site_picker(command, &job.volname, &job.src_cell, &job.dst_cell).await?;
    tracing::info!(
        jobid = job.jobid,
        volume = %job.volname,
        sites = sites.len(),
        "creating destination volume"
    );

    let rw = &sites[0];
    vos.create(
        &rw.server,
        &rw.partition,
        &job.volname,
        &job.dst_cell,
        CREATE_QUOTA_KB,
    )
    .await?;
    for site in &sites {
        vos.addsite(&site.server, &site.partition, &job.volname, &job.dst_cell)
            .await?;
    }
    vos.offline(&rw.server, &rw.partition, &job.volname, &job.dst_cell)
        .await?;
    Ok(())
}
