// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Check-server shell: one process, run anywhere with database access.

use super::{daemon_loop, ConfigHandle, ServerError, ServerOpts};
use crate::{alert, check};
use crate::stages::StageError;
use cellcc_core::{Clock, Config};
use cellcc_store::Store;
use std::sync::Arc;
use tokio::sync::watch;

async fn tick<C: Clock>(store: &Store<C>, config: &Arc<Config>) -> Result<(), StageError> {
    let alerts = check::run_check(store, config).await?;
    alert::dispatch(&config.alert, &alerts).await;
    Ok(())
}

pub async fn run<C: Clock + 'static>(
    store: Store<C>,
    handle: &ConfigHandle,
    rx: watch::Receiver<Arc<Config>>,
    opts: ServerOpts,
) -> Result<(), ServerError> {
    if opts.once {
        let config = rx.borrow().clone();
        tick(&store, &config).await?;
        return Ok(());
    }

    daemon_loop(
        "check-server",
        handle,
        rx,
        |config| config.check.interval,
        move |config| {
            let store = store.clone();
            Box::pin(async move { tick(&store, &config).await })
        },
    )
    .await
}
