// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server side: the subcommand bodies `remctld` dispatches to.
//!
//! `get-dump` and `remove-dump` require the authenticated principal to
//! match the configured one; `ping` does not. Filenames are bare names
//! resolved against the dump scratch directory; anything resembling a path
//! is rejected before it touches the filesystem.

use crate::RemctlError;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Fixed success string returned by `ping`.
pub const PING_RESPONSE: &str = "cellcc remctl server ok";

/// Verify the client principal `remctld` reported against the allowed one.
pub fn check_principal(remote_user: Option<&str>, allowed: &str) -> Result<(), RemctlError> {
    match remote_user {
        Some(user) if user == allowed => Ok(()),
        other => Err(RemctlError::AccessDenied {
            principal: other.map(str::to_string),
        }),
    }
}

/// Resolve a bare dump filename against the scratch directory.
pub fn get_dump_path(scratch_dir: &Path, filename: &str) -> Result<PathBuf, RemctlError> {
    let bad = || RemctlError::BadFilename(filename.to_string());
    if filename.is_empty() || filename == "." || filename == ".." {
        return Err(bad());
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains('\0') {
        return Err(bad());
    }
    Ok(scratch_dir.join(filename))
}

/// Stream a dump blob to `out`.
pub fn write_dump(scratch_dir: &Path, filename: &str, out: &mut impl Write) -> Result<u64, RemctlError> {
    let path = get_dump_path(scratch_dir, filename)?;
    let mut file = std::fs::File::open(&path)?;
    let n = std::io::copy(&mut file, out)?;
    Ok(n)
}

/// Unlink a dump blob.
pub fn remove_dump(scratch_dir: &Path, filename: &str) -> Result<(), RemctlError> {
    let path = get_dump_path(scratch_dir, filename)?;
    std::fs::remove_file(&path)?;
    tracing::info!(file = %path.display(), "removed dump blob on request");
    Ok(())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
