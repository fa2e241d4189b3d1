// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration loading and the closed directive set.
//!
//! The config file is relaxed JSON (json5: `//` and `/* */` comments,
//! trailing commas, bare keys; full-line `#` comments are stripped before
//! parsing). Directive paths use `/` as the separator, mirroring the nesting
//! of the file, e.g. `check/error-limit` or `cells/src.example/dst-cells`.
//!
//! `-x KEY=VAL` overrides patch the parsed tree before it is deserialized
//! into the typed [`Config`]; `-x json:KEY=VAL` parses the value as json5
//! instead of treating it as a string. Unknown directives anywhere are
//! fatal.

use crate::checksum::ChecksumAlgo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default config path, overridable with `--config` or `CELLCC_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cellcc/cellcc.conf";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("missing required directive: {0}")]
    Missing(String),
    #[error("invalid -x override: {0}")]
    BadOverride(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    pub db: DbConfig,
    /// Per-source-cell routing, keyed by cell name.
    pub cells: BTreeMap<String, CellConfig>,
    pub dump: DumpConfig,
    pub restore: RestoreConfig,
    pub vos: VosConfig,
    pub remctl: RemctlConfig,
    pub server: ServerConfig,
    pub check: CheckConfig,
    pub alert: AlertConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            cells: BTreeMap::new(),
            dump: DumpConfig::default(),
            restore: RestoreConfig::default(),
            vos: VosConfig::default(),
            remctl: RemctlConfig::default(),
            server: ServerConfig::default(),
            check: CheckConfig::default(),
            alert: AlertConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct DbConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct CellConfig {
    pub dst_cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct DumpConfig {
    pub scratch_dir: Option<PathBuf>,
    /// Checksum algorithm recorded with every dump (md5/sha1/sha2 family).
    pub checksum: String,
    /// Free bytes required in scratch beyond the sized dump.
    pub scratch_min_free: u64,
    pub max_parallel: usize,
    /// Volume-filter hook; absent means every volume is included.
    pub filter_command: Option<String>,
    pub incremental: IncrementalConfig,
    /// Seconds of slack added to each progress interval when extending the
    /// job timeout.
    pub timeout_slack: i64,
    /// Progress-callback schedule for supervised dumps, in seconds.
    pub monitor_intervals: Vec<i64>,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            checksum: "sha256".to_string(),
            scratch_min_free: 10 * 1024 * 1024,
            max_parallel: 10,
            filter_command: None,
            incremental: IncrementalConfig::default(),
            timeout_slack: 120,
            monitor_intervals: vec![1, 1, 5, 30],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct IncrementalConfig {
    pub enabled: bool,
    pub skip_unchanged: bool,
    pub fulldump_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct RestoreConfig {
    pub scratch_dir: Option<PathBuf>,
    pub scratch_min_free: u64,
    pub max_parallel: usize,
    /// Per-queue settings, keyed by queue name.
    pub queues: BTreeMap<String, QueueConfig>,
    /// Site-picker hook, required when destination volumes may need creating.
    pub pick_sites_command: Option<String>,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            scratch_min_free: 10 * 1024 * 1024,
            max_parallel: 10,
            queues: BTreeMap::new(),
            pick_sites_command: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct QueueConfig {
    pub max_parallel: Option<usize>,
    pub release: ReleaseConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ReleaseConfig {
    /// Flag map handed to the release command, e.g. `{"-force": true}`.
    pub flags: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct VosConfig {
    pub command: String,
    pub localauth: bool,
    pub keytab: Option<String>,
    pub principal: Option<String>,
}

impl Default for VosConfig {
    fn default() -> Self {
        Self {
            command: "vos".to_string(),
            localauth: false,
            keytab: None,
            principal: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct RemctlConfig {
    pub command: String,
    pub port: Option<u16>,
    /// Principal the server side accepts for get-dump/remove-dump.
    pub allowed_principal: Option<String>,
}

impl Default for RemctlConfig {
    fn default() -> Self {
        Self {
            command: "remctl".to_string(),
            port: None,
            allowed_principal: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Seconds between dump/restore-server scan ticks.
    pub tick_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { tick_interval: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct CheckConfig {
    /// Seconds between check-server sweeps.
    pub interval: u64,
    pub error_limit: u32,
    /// Rate-limit window for repeated error-limit alerts, in seconds.
    pub errorlimit_alert_interval: i64,
    pub stale_seconds: i64,
    pub old_seconds: i64,
    pub archive_jobs: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            interval: 60,
            error_limit: 5,
            errorlimit_alert_interval: 3600,
            stale_seconds: 3600,
            old_seconds: 172_800,
            archive_jobs: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct AlertConfig {
    pub text_command: Option<String>,
    pub json_command: Option<String>,
    pub log: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            text_command: None,
            json_command: None,
            log: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One `-x KEY=VAL` override, parsed into a directive path and a value.
#[derive(Debug, Clone)]
pub struct ConfigOverride {
    pub path: Vec<String>,
    pub value: Value,
}

impl ConfigOverride {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (key, val) = raw
            .split_once('=')
            .ok_or_else(|| ConfigError::BadOverride(format!("{raw} (expected KEY=VAL)")))?;
        let (key, value) = match key.strip_prefix("json:") {
            Some(key) => {
                let parsed: Value = json5::from_str(val)
                    .map_err(|e| ConfigError::BadOverride(format!("{key}: {e}")))?;
                (key, normalize_numbers(parsed))
            }
            None => (key, Value::String(val.to_string())),
        };
        if key.is_empty() {
            return Err(ConfigError::BadOverride(format!("{raw} (empty key)")));
        }
        Ok(Self {
            path: key.split('/').map(str::to_string).collect(),
            value,
        })
    }
}

impl Config {
    /// Load from `file` (falling back to defaults when None) and apply
    /// overrides, then validate.
    pub fn load(file: Option<&Path>, overrides: &[ConfigOverride]) -> Result<Self, ConfigError> {
        let mut tree = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                parse_relaxed(&text, &path.display().to_string())?
            }
            None => Value::Object(serde_json::Map::new()),
        };

        for ov in overrides {
            apply_override(&mut tree, ov)?;
        }

        let config: Config =
            serde_json::from_value(tree).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural and cross-field validation. Called by [`Config::load`];
    /// also the body of `cellcc config --check`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dump
            .checksum
            .parse::<ChecksumAlgo>()
            .map_err(|e| ConfigError::Invalid(format!("dump/checksum: {e}")))?;

        if self.dump.monitor_intervals.is_empty() {
            return Err(ConfigError::Invalid(
                "dump/monitor-intervals must not be empty".to_string(),
            ));
        }
        if self.dump.monitor_intervals.iter().any(|i| *i <= 0) {
            return Err(ConfigError::Invalid(
                "dump/monitor-intervals entries must be positive".to_string(),
            ));
        }

        // Refuse ambiguous vos credentials: with localauth off we must have a
        // keytab, and a keytab is unusable without its principal.
        if !self.vos.localauth && self.vos.keytab.is_none() {
            return Err(ConfigError::Invalid(
                "vos/localauth is off and vos/keytab is not set; one is required".to_string(),
            ));
        }
        if self.vos.keytab.is_some() && self.vos.principal.is_none() {
            return Err(ConfigError::Invalid(
                "vos/keytab requires vos/principal".to_string(),
            ));
        }
        Ok(())
    }

    /// The effective configuration as a JSON tree.
    pub fn to_value(&self) -> Value {
        // Config is a closed serializable record; this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Look up a `/`-separated directive path in the effective config.
    pub fn get(&self, key: &str) -> Result<Value, ConfigError> {
        let mut node = self.to_value();
        for part in key.split('/') {
            node = match node {
                Value::Object(mut map) => map
                    .remove(part)
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown directive: {key}")))?,
                _ => return Err(ConfigError::Invalid(format!("unknown directive: {key}"))),
            };
        }
        Ok(node)
    }

    pub fn db_url(&self) -> Result<&str, ConfigError> {
        self.db
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("db/url".to_string()))
    }

    /// Destination cells configured for a source cell.
    pub fn dst_cells(&self, src_cell: &str) -> Result<&[String], ConfigError> {
        self.cells
            .get(src_cell)
            .filter(|c| !c.dst_cells.is_empty())
            .map(|c| c.dst_cells.as_slice())
            .ok_or_else(|| ConfigError::Missing(format!("cells/{src_cell}/dst-cells")))
    }

    pub fn dump_scratch_dir(&self) -> Result<&Path, ConfigError> {
        self.dump
            .scratch_dir
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("dump/scratch-dir".to_string()))
    }

    pub fn restore_scratch_dir(&self) -> Result<&Path, ConfigError> {
        self.restore
            .scratch_dir
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("restore/scratch-dir".to_string()))
    }

    pub fn checksum_algo(&self) -> Result<ChecksumAlgo, ConfigError> {
        self.dump
            .checksum
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("dump/checksum: {e}")))
    }

    pub fn remctl_allowed_principal(&self) -> Result<&str, ConfigError> {
        self.remctl
            .allowed_principal
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("remctl/allowed-principal".to_string()))
    }

    /// Queue names a restore-server serves. The synthetic `default` queue
    /// always exists.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.restore.queues.keys().cloned().collect();
        if !names.iter().any(|n| n == "default") {
            names.insert(0, "default".to_string());
        }
        names
    }

    pub fn queue_max_parallel(&self, qname: &str) -> usize {
        self.restore
            .queues
            .get(qname)
            .and_then(|q| q.max_parallel)
            .unwrap_or(self.restore.max_parallel)
    }

    /// Release flags enabled for a queue, as command-line arguments.
    pub fn queue_release_flags(&self, qname: &str) -> Vec<String> {
        self.restore
            .queues
            .get(qname)
            .map(|q| {
                q.release
                    .flags
                    .iter()
                    .filter(|(_, on)| **on)
                    .map(|(flag, _)| flag.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parse relaxed JSON: strip full-line `#` comments, then hand the rest to
/// json5 (which covers `//`, `/* */`, trailing commas, and bare keys).
fn parse_relaxed(text: &str, path: &str) -> Result<Value, ConfigError> {
    let stripped: String = text
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    json5::from_str(&stripped)
        .map(normalize_numbers)
        .map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })
}

/// json5 parses every number as a float; fold whole-valued floats back to
/// integers so they deserialize into the typed integer directives.
fn normalize_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 && f.abs() <= 9.0e15 {
                        return Value::Number(serde_json::Number::from(f as i64));
                    }
                }
            }
            Value::Number(n)
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_numbers(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_numbers).collect()),
        other => other,
    }
}

/// Patch one override into the parsed tree, creating intermediate objects.
fn apply_override(tree: &mut Value, ov: &ConfigOverride) -> Result<(), ConfigError> {
    let mut node = tree;
    let (last, parents) = ov
        .path
        .split_last()
        .ok_or_else(|| ConfigError::BadOverride("empty key".to_string()))?;
    for part in parents {
        let map = node
            .as_object_mut()
            .ok_or_else(|| ConfigError::BadOverride(format!("{} is not a mapping", part)))?;
        node = map
            .entry(part.clone())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    let map = node
        .as_object_mut()
        .ok_or_else(|| ConfigError::BadOverride(format!("{} is not a mapping", ov.path.join("/"))))?;
    map.insert(last.clone(), ov.value.clone());
    Ok(())
}

/// Drop `null` members, for `config --dump` (as opposed to `--dump-all`).
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
