// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Narrow wrapper over the filesystem administrative CLI.
//!
//! Only the operations the pipeline needs are exposed: dump, restore,
//! release, site management, removal, size estimation, and examine. Output
//! parsing is deliberately minimal: the site list, the last-update stamp,
//! replica release status, and the lock marker are all the engine consumes.

use crate::supervise::ChildSpec;
use cellcc_core::config::VosConfig;
use chrono::NaiveDateTime;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum VosError {
    #[error("spawning {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("vos {subcommand} failed ({status}): {stderr}")]
    Failed {
        subcommand: String,
        status: String,
        stderr: String,
    },

    #[error("could not parse vos {what} output: {detail}")]
    Parse { what: String, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    Rw,
    Ro,
    Bk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub server: String,
    pub partition: String,
    pub kind: SiteKind,
    /// Trailing annotation from the site listing, e.g. `Not released`.
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub sites: Vec<Site>,
    /// Epoch seconds of the volume's last update; 0 when never updated.
    pub lastupdate: i64,
    pub locked: bool,
}

impl VolumeInfo {
    pub fn rw_site(&self) -> Option<&Site> {
        self.sites.iter().find(|s| s.kind == SiteKind::Rw)
    }

    /// Replica sites whose release status is stale.
    pub fn stale_sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.iter().filter(|s| {
            s.status
                .as_deref()
                .is_some_and(|st| st.contains("Not released") || st.contains("Old release"))
        })
    }
}

/// Handle to the `vos` command for one configuration.
#[derive(Debug, Clone)]
pub struct Vos {
    command: String,
    localauth: bool,
}

impl Vos {
    pub fn from_config(config: &VosConfig) -> Self {
        Self {
            command: config.command.clone(),
            localauth: config.localauth,
        }
    }

    fn base(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg(subcommand);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    fn auth_args(&self) -> Vec<String> {
        if self.localauth {
            vec!["-localauth".to_string()]
        } else {
            Vec::new()
        }
    }

    async fn run(&self, subcommand: &str, args: &[String]) -> Result<String, VosError> {
        let output = self
            .base(subcommand)
            .args(args)
            .args(self.auth_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| VosError::Spawn {
                command: self.command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(VosError::Failed {
                subcommand: subcommand.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Whether the volume exists in the cell's location database.
    pub async fn exists(&self, volume: &str, cell: &str) -> Result<bool, VosError> {
        match self.examine(volume, cell).await {
            Ok(_) => Ok(true),
            Err(VosError::Failed { stderr, .. }) if missing_volume(&stderr) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn examine(&self, volume: &str, cell: &str) -> Result<VolumeInfo, VosError> {
        let out = self
            .run(
                "examine",
                &args(&["-id", volume, "-cell", cell]),
            )
            .await?;
        parse_examine(&out)
    }

    /// Size of the dump stream in bytes, from the given baseline.
    pub async fn size(
        &self,
        volume: &str,
        cell: &str,
        baseline: Option<i64>,
    ) -> Result<i64, VosError> {
        let mut a = args(&["-id", volume, "-dump", "-cell", cell]);
        if let Some(time) = baseline {
            a.push("-time".to_string());
            a.push(format_baseline(time));
        }
        let out = self.run("size", &a).await?;
        parse_size(&out)
    }

    /// Spec for a supervised `vos dump` writing the blob to `file`.
    pub fn dump_spec(
        &self,
        volume: &str,
        cell: &str,
        baseline: Option<i64>,
        file: &Path,
        stderr: &Path,
    ) -> ChildSpec {
        let mut a = vec![
            "dump".to_string(),
            "-id".to_string(),
            volume.to_string(),
            "-file".to_string(),
            file.display().to_string(),
            "-cell".to_string(),
            cell.to_string(),
        ];
        if let Some(time) = baseline {
            a.push("-time".to_string());
            a.push(format_baseline(time));
        }
        a.extend(self.auth_args());
        ChildSpec {
            command: self.command.clone(),
            args: a,
            envs: vec![],
            stdout: None,
            stderr: stderr.to_path_buf(),
        }
    }

    pub async fn restore(
        &self,
        server: &str,
        partition: &str,
        volume: &str,
        cell: &str,
        file: &Path,
        incremental: bool,
    ) -> Result<(), VosError> {
        let overwrite = if incremental { "incremental" } else { "full" };
        let file = file.display().to_string();
        self.run(
            "restore",
            &args(&[
                "-server", server, "-partition", partition, "-name", volume, "-file", &file,
                "-cell", cell, "-overwrite", overwrite,
            ]),
        )
        .await?;
        Ok(())
    }

    pub async fn release(
        &self,
        volume: &str,
        cell: &str,
        flags: &[String],
    ) -> Result<(), VosError> {
        let mut a = args(&["-id", volume, "-cell", cell]);
        a.extend(flags.iter().cloned());
        self.run("release", &a).await?;
        Ok(())
    }

    pub async fn create(
        &self,
        server: &str,
        partition: &str,
        volume: &str,
        cell: &str,
        maxquota_kb: u64,
    ) -> Result<(), VosError> {
        let quota = maxquota_kb.to_string();
        self.run(
            "create",
            &args(&[
                "-server", server, "-partition", partition, "-name", volume, "-maxquota", &quota,
                "-cell", cell,
            ]),
        )
        .await?;
        Ok(())
    }

    pub async fn addsite(
        &self,
        server: &str,
        partition: &str,
        volume: &str,
        cell: &str,
    ) -> Result<(), VosError> {
        self.run(
            "addsite",
            &args(&["-server", server, "-partition", partition, "-id", volume, "-cell", cell]),
        )
        .await?;
        Ok(())
    }

    pub async fn offline(
        &self,
        server: &str,
        partition: &str,
        volume: &str,
        cell: &str,
    ) -> Result<(), VosError> {
        self.run(
            "offline",
            &args(&["-server", server, "-partition", partition, "-id", volume, "-cell", cell]),
        )
        .await?;
        Ok(())
    }

    /// Remove one copy of a volume. A volume that is already gone is
    /// treated as removed.
    pub async fn remove(
        &self,
        server: &str,
        partition: &str,
        volume: &str,
        cell: &str,
    ) -> Result<(), VosError> {
        let result = self
            .run(
                "remove",
                &args(&["-server", server, "-partition", partition, "-id", volume, "-cell", cell]),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(VosError::Failed { stderr, .. }) if missing_volume(&stderr) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn missing_volume(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no such entry") || lower.contains("does not exist")
}

/// `-time` argument format understood by the dump/size subcommands.
fn format_baseline(epoch: i64) -> String {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%m/%d/%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "01/01/1970 00:00:00".to_string())
}

/// Parse `vos examine` output: the `Last Update` stamp, the lock marker,
/// and the site listing.
pub(crate) fn parse_examine(out: &str) -> Result<VolumeInfo, VosError> {
    let mut sites = Vec::new();
    let mut lastupdate = None;
    let mut locked = false;

    for line in out.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Last Update") {
            let rest = rest.trim();
            lastupdate = Some(parse_vos_time(rest)?);
        } else if trimmed.contains("LOCKED") {
            locked = true;
        } else if trimmed.starts_with("server ") {
            sites.push(parse_site_line(trimmed)?);
        }
    }

    let lastupdate = lastupdate.ok_or_else(|| VosError::Parse {
        what: "examine".to_string(),
        detail: "no Last Update line".to_string(),
    })?;
    Ok(VolumeInfo {
        sites,
        lastupdate,
        locked,
    })
}

/// One `server X partition Y RW Site [-- status]` line.
fn parse_site_line(line: &str) -> Result<Site, VosError> {
    let parse_err = |detail: String| VosError::Parse {
        what: "examine site".to_string(),
        detail,
    };
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 6 || tokens[0] != "server" || tokens[2] != "partition" {
        return Err(parse_err(line.to_string()));
    }
    let kind = match tokens[4] {
        "RW" => SiteKind::Rw,
        "RO" => SiteKind::Ro,
        "BK" => SiteKind::Bk,
        other => return Err(parse_err(format!("unknown site type {other}"))),
    };
    let status = line
        .split_once("--")
        .map(|(_, status)| status.trim().to_string())
        .filter(|s| !s.is_empty());
    Ok(Site {
        server: tokens[1].to_string(),
        partition: tokens[3].to_string(),
        kind,
        status,
    })
}

/// `vos` prints timestamps like `Tue Jun  3 10:00:00 2025`, or `Never`.
fn parse_vos_time(s: &str) -> Result<i64, VosError> {
    if s == "Never" {
        return Ok(0);
    }
    NaiveDateTime::parse_from_str(s, "%a %b %e %H:%M:%S %Y")
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|e| VosError::Parse {
            what: "timestamp".to_string(),
            detail: format!("{s}: {e}"),
        })
}

/// Parse `vos size -dump` output (`dump_size: N`).
pub(crate) fn parse_size(out: &str) -> Result<i64, VosError> {
    for line in out.lines() {
        if let Some(rest) = line.trim().strip_prefix("dump_size:") {
            return rest.trim().parse().map_err(|_| VosError::Parse {
                what: "size".to_string(),
                detail: line.to_string(),
            });
        }
    }
    Err(VosError::Parse {
        what: "size".to_string(),
        detail: "no dump_size line".to_string(),
    })
}

#[cfg(test)]
#[path = "vos_tests.rs"]
mod tests;
