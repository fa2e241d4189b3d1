// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store error classification.
//!
//! Deadlock-class driver errors are retried inside the store; everything
//! else surfaces. An update that matches zero rows is a [`StoreError::JobConflict`],
//! the signal that another worker advanced the row first.

use cellcc_core::JobState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Optimistic-concurrency loss: the row's dv (or state) moved under us.
    #[error("job {jobid} update conflict at dv {dv}")]
    JobConflict { jobid: i64, dv: u64 },

    #[error("job {0} not found")]
    NotFound(i64),

    #[error("a sync of volume {volname} to cell {dst_cell} already exists")]
    DuplicateJob { volname: String, dst_cell: String },

    #[error("job {jobid} is not in ERROR (state {state})")]
    NotInError { jobid: i64, state: JobState },

    #[error("schema version mismatch: database has {found:?}, this build supports {supported}")]
    SchemaVersion { found: Vec<i64>, supported: i64 },

    #[error("corrupt job row {jobid}: {message}")]
    Corrupt { jobid: i64, message: String },
}

/// Whether a driver error is in the deadlock/lock-contention class.
///
/// MySQL reports SQLSTATE 40001 (errno 1213); SQLite surfaces BUSY (5) and
/// LOCKED (6), with messages naming the locked object.
pub(crate) fn is_deadlock(err: &StoreError) -> bool {
    let StoreError::Db(sqlx::Error::Database(db)) = err else {
        return false;
    };
    if let Some(code) = db.code() {
        if matches!(code.as_ref(), "40001" | "1213" | "5" | "6") {
            return true;
        }
    }
    let msg = db.message().to_ascii_lowercase();
    msg.contains("deadlock") || msg.contains("database is locked") || msg.contains("database table is locked")
}

/// Whether a driver error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };
    if let Some(code) = db.code() {
        // SQLite UNIQUE (2067/1555), MySQL duplicate entry (1062 / 23000).
        if matches!(code.as_ref(), "2067" | "1555" | "1062" | "23000") {
            return true;
        }
    }
    let msg = db.message().to_ascii_lowercase();
    msg.contains("unique constraint") || msg.contains("duplicate entry")
}
