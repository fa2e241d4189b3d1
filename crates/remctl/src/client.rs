// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client side: shell out to the `remctl` binary.

use crate::RemctlError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Thin wrapper around the remctl client command.
#[derive(Debug, Clone)]
pub struct RemctlClient {
    command: String,
    port: Option<u16>,
}

impl RemctlClient {
    pub fn new(command: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            command: command.into(),
            port,
        }
    }

    fn base(&self, host: &str) -> Command {
        let mut cmd = Command::new(&self.command);
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        cmd.arg(host);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Unauthenticated health check; returns the server's response line.
    pub async fn ping(&self, host: &str) -> Result<String, RemctlError> {
        let output = self
            .base(host)
            .arg("ping")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| RemctlError::Spawn {
                command: self.command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(failed(host, "ping", &output.status, &output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Stream the named dump blob from `host` into `dest`.
    pub async fn get_dump(
        &self,
        host: &str,
        filename: &str,
        dest: &Path,
    ) -> Result<(), RemctlError> {
        let file = std::fs::File::create(dest)?;
        let child = self
            .base(host)
            .arg("get-dump")
            .arg(filename)
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RemctlError::Spawn {
                command: self.command.clone(),
                source,
            })?;
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            // Do not leave a truncated blob behind.
            let _ = std::fs::remove_file(dest);
            return Err(failed(host, "get-dump", &output.status, &output.stderr));
        }
        Ok(())
    }

    /// Ask `host` to unlink the named dump blob.
    pub async fn remove_dump(&self, host: &str, filename: &str) -> Result<(), RemctlError> {
        let output = self
            .base(host)
            .arg("remove-dump")
            .arg(filename)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| RemctlError::Spawn {
                command: self.command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(failed(host, "remove-dump", &output.status, &output.stderr));
        }
        Ok(())
    }
}

fn failed(
    host: &str,
    subcommand: &str,
    status: &std::process::ExitStatus,
    stderr: &[u8],
) -> RemctlError {
    RemctlError::Failed {
        host: host.to_string(),
        subcommand: subcommand.to_string(),
        status: status.to_string(),
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
