// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared command context: global flags, config resolution, logging, and
//! the database handle.

use anyhow::Context as _;
use cellcc_core::{Config, ConfigError, ConfigOverride, DEFAULT_CONFIG_PATH};
use cellcc_daemon::ReloadHook;
use cellcc_store::Store;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Global flags shared by both binaries.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Path to the configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override a configuration directive (KEY=VAL, or json:KEY=VAL for
    /// JSON-parsed values); may be repeated
    #[arg(short = 'x', global = true, value_name = "KEY=VAL")]
    pub set: Vec<String>,
}

impl GlobalArgs {
    /// Resolve the config file path: `--config`, then `CELLCC_CONFIG`,
    /// then the default path when it exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var("CELLCC_CONFIG") {
            return Some(PathBuf::from(path));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    }

    pub fn overrides(&self) -> Result<Vec<ConfigOverride>, ConfigError> {
        self.set.iter().map(|s| ConfigOverride::parse(s)).collect()
    }

    /// Load and validate the effective configuration.
    pub fn try_load(&self) -> Result<(Config, Option<PathBuf>, Vec<ConfigOverride>), ConfigError> {
        let path = self.config_path();
        let overrides = self.overrides()?;
        let config = Config::load(path.as_deref(), &overrides)?;
        Ok((config, path, overrides))
    }
}

/// Loaded context for commands that need configuration.
pub struct Context {
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub overrides: Vec<ConfigOverride>,
}

impl Context {
    pub fn load(globals: &GlobalArgs) -> anyhow::Result<Self> {
        let (config, config_path, overrides) = globals.try_load()?;
        Ok(Self {
            config,
            config_path,
            overrides,
        })
    }

    /// Connect to the job database and verify the schema version.
    pub async fn store(&self) -> anyhow::Result<Store> {
        let url = self.config.db_url()?;
        Store::connect(url, self.config.db.max_connections)
            .await
            .context("connecting to the job database")
    }
}

pub type LogHandle = reload::Handle<EnvFilter, Registry>;

/// Initialize stderr logging. `CELLCC_LOG` overrides the configured level.
/// Returns the handle daemons use to re-point the filter on reload.
pub fn init_logging(level: &str) -> anyhow::Result<LogHandle> {
    let level = std::env::var("CELLCC_LOG").unwrap_or_else(|_| level.to_string());
    let filter = EnvFilter::try_new(&level)
        .with_context(|| format!("invalid log level {level:?}"))?;
    let (filter, handle) = reload::Layer::new(filter);
    Registry::default()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .context("initializing logging")?;
    Ok(handle)
}

/// Reload hook re-pointing the log filter at the new configured level.
pub fn log_reload_hook(handle: LogHandle) -> ReloadHook {
    Arc::new(move |config: &Config| {
        let filter = EnvFilter::try_new(&config.log.level).map_err(|e| e.to_string())?;
        handle.reload(filter).map_err(|e| e.to_string())
    })
}
