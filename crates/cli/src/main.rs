// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `cellcc` binary.

use cellcc_cli::commands::{self, config::ConfigArgs, jobs::OutputFormat};
use cellcc_cli::context::{init_logging, Context, GlobalArgs};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cellcc", version, about = "Synchronize volumes between cells")]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request a sync of one volume to every configured destination
    StartSync {
        /// Queue for the created jobs
        #[arg(long, default_value = "default")]
        queue: String,

        /// Create deletion jobs instead of sync jobs
        #[arg(long)]
        delete: bool,

        /// Source cell
        src_cell: String,

        /// Volume name
        volname: String,
    },

    /// Serve dump work for a source cell (runs where the volumes live)
    DumpServer {
        /// Run one scan and exit
        #[arg(long)]
        once: bool,

        /// Host name restore servers will fetch dumps from
        server: String,

        /// Source cell
        src_cell: String,

        /// Destination cells served from here
        #[arg(required = true)]
        dst_cells: Vec<String>,
    },

    /// Serve transfer/restore/release/delete work for a destination cell
    RestoreServer {
        /// Run one scan per queue and exit
        #[arg(long)]
        once: bool,

        /// Destination cell
        dst_cell: String,
    },

    /// Watch the job table, retrying failures and raising alerts
    CheckServer {
        /// Run one sweep and exit
        #[arg(long)]
        once: bool,
    },

    /// Show live jobs
    Jobs {
        /// Output format
        #[arg(long, value_enum, default_value = "txt")]
        format: OutputFormat,

        /// Show only failed jobs
        #[arg(long)]
        errors: bool,
    },

    /// Inspect or validate the configuration
    Config(ConfigArgs),

    /// Clear a failed job's error count and retry it
    RetryJob { jobid: i64 },

    // Server side of the remctl protocol; wired up via remctld.conf.
    #[command(hide = true)]
    Ping,
    #[command(hide = true)]
    GetDump { filename: String },
    #[command(hide = true)]
    RemoveDump { filename: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("cellcc: {err:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    // Ping needs no configuration, and config --check reports bad
    // configuration instead of dying on it.
    match &cli.command {
        Command::Ping => {
            commands::remctl_serve::ping();
            return Ok(0);
        }
        Command::Config(args) => return commands::config::run(&cli.globals, args),
        _ => {}
    }

    let ctx = Context::load(&cli.globals)?;
    let log_handle = init_logging(&ctx.config.log.level)?;

    match cli.command {
        Command::StartSync {
            queue,
            delete,
            src_cell,
            volname,
        } => {
            commands::start_sync::run(&ctx, &queue, delete, &src_cell, &volname).await?;
            Ok(0)
        }
        Command::DumpServer {
            once,
            server,
            src_cell,
            dst_cells,
        } => commands::server::dump_server(ctx, log_handle, once, server, src_cell, dst_cells).await,
        Command::RestoreServer { once, dst_cell } => {
            commands::server::restore_server(ctx, log_handle, once, dst_cell).await
        }
        Command::CheckServer { once } => {
            commands::server::check_server(ctx, log_handle, once).await
        }
        Command::Jobs { format, errors } => {
            commands::jobs::run(&ctx, format, errors).await?;
            Ok(0)
        }
        Command::RetryJob { jobid } => {
            commands::retry::run(&ctx, jobid).await?;
            Ok(0)
        }
        Command::GetDump { filename } => {
            commands::remctl_serve::get_dump(&ctx, &filename)?;
            Ok(0)
        }
        Command::RemoveDump { filename } => {
            commands::remctl_serve::remove(&ctx, &filename)?;
            Ok(0)
        }
        Command::Ping | Command::Config(_) => Ok(0),
    }
}
