// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dump-server shell: one process per source host.

use super::{daemon_loop, ConfigHandle, ServerError, ServerOpts};
use crate::stages::dump;
use cellcc_core::{Clock, Config};
use cellcc_store::Store;
use std::sync::Arc;
use tokio::sync::watch;

/// Serve dump work for `(dump_host, src_cell, dst_cells)`.
pub async fn run<C: Clock + 'static>(
    store: Store<C>,
    handle: &ConfigHandle,
    rx: watch::Receiver<Arc<Config>>,
    opts: ServerOpts,
    dump_host: String,
    src_cell: String,
    dst_cells: Vec<String>,
) -> Result<(), ServerError> {
    if opts.once {
        let config = rx.borrow().clone();
        dump::tick(&store, &config, &dump_host, &src_cell, &dst_cells).await?;
        return Ok(());
    }

    daemon_loop(
        "dump-server",
        handle,
        rx,
        |config| config.server.tick_interval,
        move |config| {
            let store = store.clone();
            let dump_host = dump_host.clone();
            let src_cell = src_cell.clone();
            let dst_cells = dst_cells.clone();
            Box::pin(async move {
                dump::tick(&store, &config, &dump_host, &src_cell, &dst_cells).await
            })
        },
    )
    .await
}
