// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The long-running daemon shells.
//!
//! All three share the same skeleton: a bounded-sleep tick loop that logs
//! tick failures in daemon mode and propagates them in `--once` mode, plus
//! signal handling. SIGINT/SIGTERM finish the current tick and shut down;
//! SIGHUP feeds the explicit reload channel. Reload is atomic: if the new
//! configuration fails to load, validate, or reconfigure logging, the
//! previous one stays in force.

pub mod check;
pub mod dump;
pub mod restore;

use crate::stages::StageError;
use cellcc_core::{Config, ConfigOverride};
use futures_util::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error("installing signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ServerOpts {
    /// Run a single tick and exit with its result.
    pub once: bool,
}

/// Callback run against a candidate config during reload, e.g. to point
/// the log filter at the new level. An error rejects the reload.
pub type ReloadHook = Arc<dyn Fn(&Config) -> Result<(), String> + Send + Sync>;

/// Owns the live configuration and its reload protocol.
pub struct ConfigHandle {
    path: Option<PathBuf>,
    overrides: Vec<ConfigOverride>,
    tx: watch::Sender<Arc<Config>>,
    hook: Option<ReloadHook>,
}

impl ConfigHandle {
    pub fn new(
        initial: Config,
        path: Option<PathBuf>,
        overrides: Vec<ConfigOverride>,
    ) -> (Self, watch::Receiver<Arc<Config>>) {
        let (tx, rx) = watch::channel(Arc::new(initial));
        (
            Self {
                path,
                overrides,
                tx,
                hook: None,
            },
            rx,
        )
    }

    pub fn with_hook(mut self, hook: ReloadHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.tx.subscribe()
    }

    /// Re-load and re-validate; keep the previous config on any failure.
    pub fn reload(&self) {
        let loaded = Config::load(self.path.as_deref(), &self.overrides);
        match loaded {
            Ok(config) => {
                if let Some(hook) = &self.hook {
                    if let Err(err) = hook(&config) {
                        tracing::error!(
                            error = %err,
                            "reload rejected (logging could not be reconfigured); keeping previous configuration"
                        );
                        return;
                    }
                }
                let _ = self.tx.send(Arc::new(config));
                tracing::info!("configuration reloaded");
            }
            Err(err) => {
                tracing::error!(error = %err, "reload failed; keeping previous configuration");
            }
        }
    }
}

/// Shared daemon skeleton for the single-loop servers (dump, check).
pub(crate) async fn daemon_loop<F>(
    name: &'static str,
    handle: &ConfigHandle,
    rx: watch::Receiver<Arc<Config>>,
    interval_of: impl Fn(&Config) -> u64,
    mut tick: F,
) -> Result<(), ServerError>
where
    F: FnMut(Arc<Config>) -> BoxFuture<'static, Result<(), StageError>>,
{
    let mut hup = signal(SignalKind::hangup()).map_err(ServerError::Signal)?;
    let mut term = signal(SignalKind::terminate()).map_err(ServerError::Signal)?;
    let mut int = signal(SignalKind::interrupt()).map_err(ServerError::Signal)?;

    tracing::info!(daemon = name, "daemon started");
    loop {
        let config = rx.borrow().clone();
        if let Err(err) = tick(config.clone()).await {
            tracing::error!(daemon = name, error = %err, "tick failed");
        }
        let interval = interval_of(&config).max(1);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
            _ = hup.recv() => {
                tracing::info!(daemon = name, "SIGHUP received, reloading configuration");
                handle.reload();
            }
            _ = term.recv() => {
                tracing::info!(daemon = name, "SIGTERM received, shutting down");
                return Ok(());
            }
            _ = int.recv() => {
                tracing::info!(daemon = name, "interrupted, shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
