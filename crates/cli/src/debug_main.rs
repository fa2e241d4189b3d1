// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `cellcc-debug` binary: operator escape hatches and plumbing checks.

use cellcc_cli::commands::debug;
use cellcc_cli::context::{init_logging, Context, GlobalArgs};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cellcc-debug", version, about = "CellCC debugging utilities")]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delete a job row outright, bypassing the state machine
    KillJob { jobid: i64 },

    /// Send a test alert through the configured alert channels
    TestAlert,

    /// Ping the remctl server on a dump host
    PingRemctl { host: String },

    /// Create the database schema and seed the version table
    InitDb,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("cellcc-debug: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::load(&cli.globals)?;
    let _log_handle = init_logging(&ctx.config.log.level)?;

    match cli.command {
        Command::KillJob { jobid } => debug::kill_job(&ctx, jobid).await,
        Command::TestAlert => debug::test_alert(&ctx).await,
        Command::PingRemctl { host } => debug::ping_remctl(&ctx, &host).await,
        Command::InitDb => debug::init_db(&ctx).await,
    }
}
