// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restore-server shell: one process per destination cell, one worker task
//! per configured queue.
//!
//! Each queue task drives transfer -> restore -> release -> delete in
//! sequence every tick with its own pool bound. Reload reaches the queue
//! tasks through the shared config channel; shutdown stops them after
//! their current tick, and the aggregate exit code is the highest any
//! queue reported.

use super::{ConfigHandle, ServerError, ServerOpts};
use crate::stages::{delete, release, restore, xfer, StageError};
use cellcc_core::{Clock, Config};
use cellcc_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// One pass over every stage this queue serves.
async fn queue_tick<C: Clock + 'static>(
    store: &Store<C>,
    config: &Arc<Config>,
    dst_cell: &str,
    qname: &str,
) -> Result<(), StageError> {
    let pool_size = config.queue_max_parallel(qname);
    xfer::tick(store, config, dst_cell, qname, pool_size).await?;
    restore::tick(store, config, dst_cell, qname, pool_size).await?;
    release::tick(store, config, dst_cell, qname, pool_size).await?;
    delete::tick(store, config, dst_cell, qname, pool_size).await?;
    Ok(())
}

async fn queue_loop<C: Clock + 'static>(
    store: Store<C>,
    rx: watch::Receiver<Arc<Config>>,
    mut shutdown: watch::Receiver<bool>,
    dst_cell: String,
    qname: String,
) -> i32 {
    loop {
        let config = rx.borrow().clone();
        if let Err(err) = queue_tick(&store, &config, &dst_cell, &qname).await {
            tracing::error!(queue = %qname, error = %err, "queue tick failed");
        }
        let interval = config.server.tick_interval.max(1);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            _ = shutdown.changed() => {
                tracing::info!(queue = %qname, "queue worker shutting down");
                return 0;
            }
        }
    }
}

/// Serve all queues for `dst_cell`. Returns the aggregate exit code.
pub async fn run<C: Clock + 'static>(
    store: Store<C>,
    handle: &ConfigHandle,
    rx: watch::Receiver<Arc<Config>>,
    opts: ServerOpts,
    dst_cell: String,
) -> Result<i32, ServerError> {
    if opts.once {
        let config = rx.borrow().clone();
        for qname in config.queue_names() {
            queue_tick(&store, &config, &dst_cell, &qname)
                .await
                .map_err(ServerError::Stage)?;
        }
        return Ok(0);
    }

    let mut hup = signal(SignalKind::hangup()).map_err(ServerError::Signal)?;
    let mut term = signal(SignalKind::terminate()).map_err(ServerError::Signal)?;
    let mut int = signal(SignalKind::interrupt()).map_err(ServerError::Signal)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let queues = rx.borrow().queue_names();
    let mut tasks = JoinSet::new();
    for qname in queues {
        tracing::info!(queue = %qname, dst_cell = %dst_cell, "starting queue worker");
        tasks.spawn(queue_loop(
            store.clone(),
            rx.clone(),
            shutdown_rx.clone(),
            dst_cell.clone(),
            qname,
        ));
    }

    loop {
        tokio::select! {
            _ = hup.recv() => {
                tracing::info!("SIGHUP received, reloading configuration for all queues");
                handle.reload();
            }
            _ = term.recv() => {
                tracing::info!("SIGTERM received, stopping queue workers");
                break;
            }
            _ = int.recv() => {
                tracing::info!("interrupted, stopping queue workers");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let mut exit_code = 0;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(code) => exit_code = exit_code.max(code),
            Err(err) => {
                tracing::error!(error = %err, "queue worker task failed");
                exit_code = exit_code.max(1);
            }
        }
    }
    Ok(exit_code)
}
