// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three daemon subcommands: dump-server, restore-server, check-server.

use crate::context::{log_reload_hook, Context, LogHandle};
use cellcc_core::Config;
use cellcc_daemon::server;
use cellcc_daemon::{ConfigHandle, ServerOpts};
use std::sync::Arc;
use tokio::sync::watch;

fn config_handle(
    ctx: Context,
    log_handle: LogHandle,
) -> (ConfigHandle, watch::Receiver<Arc<Config>>) {
    let (handle, rx) = ConfigHandle::new(ctx.config, ctx.config_path, ctx.overrides);
    (handle.with_hook(log_reload_hook(log_handle)), rx)
}

pub async fn dump_server(
    ctx: Context,
    log_handle: LogHandle,
    once: bool,
    server_host: String,
    src_cell: String,
    dst_cells: Vec<String>,
) -> anyhow::Result<i32> {
    let store = ctx.store().await?;
    let (handle, rx) = config_handle(ctx, log_handle);
    server::dump::run(
        store,
        &handle,
        rx,
        ServerOpts { once },
        server_host,
        src_cell,
        dst_cells,
    )
    .await?;
    Ok(0)
}

pub async fn restore_server(
    ctx: Context,
    log_handle: LogHandle,
    once: bool,
    dst_cell: String,
) -> anyhow::Result<i32> {
    let store = ctx.store().await?;
    let (handle, rx) = config_handle(ctx, log_handle);
    let code = server::restore::run(store, &handle, rx, ServerOpts { once }, dst_cell).await?;
    Ok(code)
}

pub async fn check_server(
    ctx: Context,
    log_handle: LogHandle,
    once: bool,
) -> anyhow::Result<i32> {
    let store = ctx.store().await?;
    let (handle, rx) = config_handle(ctx, log_handle);
    server::check::run(store, &handle, rx, ServerOpts { once }).await?;
    Ok(0)
}
