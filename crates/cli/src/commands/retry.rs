// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cellcc retry-job` - operator retry of a failed job.

use crate::context::Context;

pub async fn run(ctx: &Context, jobid: i64) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    let target = store.job_reset(jobid).await?;
    println!("job {jobid}: errors cleared, retrying in {target}");
    Ok(())
}
