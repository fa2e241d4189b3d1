// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cellcc start-sync` - request a sync (or deletion) of one volume.
//!
//! Creates one job per configured destination cell, consulting the
//! volume-filter hook when one is configured.

use crate::context::Context;
use cellcc_daemon::hooks::{run_volume_filter, FilterDecision, FilterRequest};
use cellcc_store::CreateJob;

pub async fn run(
    ctx: &Context,
    queue: &str,
    delete: bool,
    src_cell: &str,
    volname: &str,
) -> anyhow::Result<()> {
    let dst_cells = ctx.config.dst_cells(src_cell)?.to_vec();
    let store = ctx.store().await?;
    let operation = if delete { "delete" } else { "sync" };

    for dst_cell in &dst_cells {
        if let Some(command) = &ctx.config.dump.filter_command {
            let decision = run_volume_filter(
                command,
                &FilterRequest {
                    volume: volname,
                    src_cell,
                    dst_cell,
                    qname: queue,
                    operation,
                },
            )
            .await?;
            if decision == FilterDecision::Exclude {
                println!("{volname} -> {dst_cell}: excluded by volume filter");
                continue;
            }
        }

        let job = store
            .create_job(&CreateJob {
                src_cell: src_cell.to_string(),
                dst_cell: dst_cell.clone(),
                volname: volname.to_string(),
                qname: queue.to_string(),
                delete,
            })
            .await?;
        println!(
            "job {}: {} {} -> {}",
            job.jobid, operation, volname, dst_cell
        );
    }
    Ok(())
}
