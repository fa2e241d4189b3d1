// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cellcc-debug` command bodies: operator escape hatches and plumbing
//! checks that do not belong in the main binary.

use crate::context::Context;
use cellcc_daemon::alert::{self, Alert, AlertKind};
use cellcc_remctl::RemctlClient;
use cellcc_store::describe_dummy_jobs;

/// Delete a job row outright, bypassing the state machine.
pub async fn kill_job(ctx: &Context, jobid: i64) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    store.kill_job(jobid).await?;
    println!("job {jobid} deleted");
    Ok(())
}

/// Exercise the alert fan-out with synthetic jobs.
pub async fn test_alert(ctx: &Context) -> anyhow::Result<()> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let alerts: Vec<Alert> = describe_dummy_jobs(3, now)
        .iter()
        .map(|desc| {
            Alert::for_job(
                AlertKind::Stale,
                &desc.job,
                "test alert from cellcc-debug".to_string(),
            )
        })
        .collect();

    print!("{}", alert::format_text(&alerts));
    alert::dispatch(&ctx.config.alert, &alerts).await;
    Ok(())
}

/// Round-trip the remote-command channel to a dump host.
pub async fn ping_remctl(ctx: &Context, host: &str) -> anyhow::Result<()> {
    let client = RemctlClient::new(ctx.config.remctl.command.clone(), ctx.config.remctl.port);
    let response = client.ping(host).await?;
    println!("{host}: {response}");
    Ok(())
}

/// Create the schema in a fresh database.
pub async fn init_db(ctx: &Context) -> anyhow::Result<()> {
    let url = ctx.config.db_url()?;
    cellcc_store::init_schema(url).await?;
    println!("schema created");
    Ok(())
}
