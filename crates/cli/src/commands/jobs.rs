// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cellcc jobs` - operator view of the live job table.

use crate::context::Context;
use cellcc_core::{JobDesc, JobFilter, JobState};
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Txt,
    Json,
}

pub async fn run(ctx: &Context, format: OutputFormat, errors_only: bool) -> anyhow::Result<()> {
    let store = ctx.store().await?;
    let mut descs = store.describe_jobs(&JobFilter::default()).await?;
    if errors_only {
        descs.retain(|d| d.job.state == JobState::Error);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&descs)?);
        }
        OutputFormat::Txt => print_table(&descs),
    }
    Ok(())
}

fn print_table(descs: &[JobDesc]) {
    if descs.is_empty() {
        println!("no jobs");
        return;
    }
    println!(
        "{:>6}  {:<18}  {:<20}  {:<16}  {:<8}  {:>4}  {:>7}  DESCRIPTION",
        "ID", "STATE", "VOLUME", "DST CELL", "QUEUE", "ERR", "STALE"
    );
    for desc in descs {
        let job = &desc.job;
        println!(
            "{:>6}  {:<18}  {:<20}  {:<16}  {:<8}  {:>4}  {:>7}  {}",
            job.jobid,
            job.state.to_string(),
            job.volname,
            job.dst_cell,
            job.qname,
            job.errors,
            format_elapsed(desc.stale_seconds),
            job.description,
        );
    }
}

fn format_elapsed(secs: i64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(5), "5s");
        assert_eq!(format_elapsed(90), "1m");
        assert_eq!(format_elapsed(7200), "2h");
        assert_eq!(format_elapsed(200_000), "2d");
    }
}
