// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scratch-directory helpers.
//!
//! The scratch dir on each host is shared by all stage workers; filenames
//! carry a random suffix per job so no locking is needed.

use std::path::Path;

/// Whether `dir` has room for `needed` bytes plus the configured slack.
pub fn has_free_space(dir: &Path, needed: u64, slack: u64) -> std::io::Result<bool> {
    let available = fs2::available_space(dir)?;
    Ok(available >= needed.saturating_add(slack))
}

/// Unique blob name for one dump attempt.
pub fn dump_filename(volname: &str, jobid: i64) -> String {
    format!("{volname}.{jobid}.{}.dump", nanoid::nanoid!(10))
}

/// Capture file for the dump command's stderr, next to the blob.
pub fn stderr_filename(dump_filename: &str) -> String {
    format!("{dump_filename}.stderr")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_unique_per_call() {
        let a = dump_filename("u.alice", 7);
        let b = dump_filename("u.alice", 7);
        assert_ne!(a, b);
        assert!(a.starts_with("u.alice.7."));
        assert!(a.ends_with(".dump"));
        assert!(!a.contains('/'));
    }

    #[test]
    fn free_space_accounts_for_slack() {
        let dir = tempfile::tempdir().unwrap();
        assert!(has_free_space(dir.path(), 0, 0).unwrap());
        assert!(!has_free_space(dir.path(), u64::MAX, 0).unwrap());
        // Slack alone can push a request over the edge.
        assert!(!has_free_space(dir.path(), u64::MAX - 1, 2).unwrap());
    }
}
