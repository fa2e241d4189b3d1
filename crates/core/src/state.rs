// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync-job state machine.
//!
//! Every pipeline stage follows the `*_START -> *_WORK -> *_DONE` pattern.
//! `START -> WORK` claims the job for a worker; `WORK -> DONE` publishes the
//! stage result. A failure in any `WORK` state transitions to [`JobState::Error`]
//! with the prior state preserved in the job's `last_good_state` column.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of a sync job, stored as an upper-snake string in the `state` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    New,
    DumpStart,
    DumpWork,
    DumpDone,
    XferStart,
    XferWork,
    XferDone,
    RestoreStart,
    RestoreWork,
    RestoreDone,
    ReleaseStart,
    ReleaseWork,
    ReleaseDone,
    DeleteNew,
    DeleteDestStart,
    DeleteDestWork,
    DeleteDestDone,
    Error,
}

/// All states, in pipeline order. Used by filters and tests.
pub const ALL_STATES: [JobState; 18] = [
    JobState::New,
    JobState::DumpStart,
    JobState::DumpWork,
    JobState::DumpDone,
    JobState::XferStart,
    JobState::XferWork,
    JobState::XferDone,
    JobState::RestoreStart,
    JobState::RestoreWork,
    JobState::RestoreDone,
    JobState::ReleaseStart,
    JobState::ReleaseWork,
    JobState::ReleaseDone,
    JobState::DeleteNew,
    JobState::DeleteDestStart,
    JobState::DeleteDestWork,
    JobState::DeleteDestDone,
    JobState::Error,
];

impl JobState {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::New => "NEW",
            JobState::DumpStart => "DUMP_START",
            JobState::DumpWork => "DUMP_WORK",
            JobState::DumpDone => "DUMP_DONE",
            JobState::XferStart => "XFER_START",
            JobState::XferWork => "XFER_WORK",
            JobState::XferDone => "XFER_DONE",
            JobState::RestoreStart => "RESTORE_START",
            JobState::RestoreWork => "RESTORE_WORK",
            JobState::RestoreDone => "RESTORE_DONE",
            JobState::ReleaseStart => "RELEASE_START",
            JobState::ReleaseWork => "RELEASE_WORK",
            JobState::ReleaseDone => "RELEASE_DONE",
            JobState::DeleteNew => "DELETE_NEW",
            JobState::DeleteDestStart => "DELETE_DEST_START",
            JobState::DeleteDestWork => "DELETE_DEST_WORK",
            JobState::DeleteDestDone => "DELETE_DEST_DONE",
            JobState::Error => "ERROR",
        }
    }

    /// Terminal states: the job is finished and eligible for archival.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::ReleaseDone | JobState::DeleteDestDone)
    }

    /// `*_WORK` states: a worker owns the job and is running its external op.
    pub fn is_work(&self) -> bool {
        matches!(
            self,
            JobState::DumpWork
                | JobState::XferWork
                | JobState::RestoreWork
                | JobState::DeleteDestWork
                | JobState::ReleaseWork
        )
    }

    /// State a failed job retries from, given its `last_good_state`.
    ///
    /// `*_WORK` maps back to the matching `*_START`; anything else retries
    /// in place.
    pub fn retry_target(&self) -> JobState {
        match self {
            JobState::DumpWork => JobState::DumpStart,
            JobState::XferWork => JobState::XferStart,
            JobState::RestoreWork => JobState::RestoreStart,
            JobState::ReleaseWork => JobState::ReleaseStart,
            JobState::DeleteDestWork => JobState::DeleteDestStart,
            other => *other,
        }
    }

    /// The `*_START` state preceding a `*_WORK` state, for scratch-space
    /// rollback. Identity for non-WORK states.
    pub fn pre_work(&self) -> JobState {
        self.retry_target()
    }

    /// Whether `from -> to` is a legal transition.
    ///
    /// Covers the pipeline edges, the skip-unchanged short circuit
    /// (`DUMP_WORK -> RELEASE_DONE`), scratch rollback (`*_WORK -> *_START`),
    /// failure (`*_WORK -> ERROR`), and check-engine retry
    /// (`ERROR -> retry target`).
    pub fn valid_transition(from: JobState, to: JobState) -> bool {
        use JobState::*;
        if from.is_work() && (to == Error || to == from.pre_work()) {
            return true;
        }
        if from == Error {
            // Retry targets are NEW, DELETE_NEW, or any *_START.
            return matches!(
                to,
                New | DeleteNew | DumpStart | XferStart | RestoreStart | ReleaseStart
                    | DeleteDestStart
            );
        }
        matches!(
            (from, to),
            (New, DumpStart)
                | (DumpStart, DumpWork)
                | (DumpWork, DumpDone)
                | (DumpWork, ReleaseDone)
                | (DumpDone, XferStart)
                | (XferStart, XferWork)
                | (XferWork, XferDone)
                | (XferDone, RestoreStart)
                | (RestoreStart, RestoreWork)
                | (RestoreWork, RestoreDone)
                | (RestoreDone, ReleaseStart)
                | (ReleaseStart, ReleaseWork)
                | (ReleaseWork, ReleaseDone)
                | (DeleteNew, DeleteDestStart)
                | (DeleteDestStart, DeleteDestWork)
                | (DeleteDestWork, DeleteDestDone)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a `state` column value is not a known state.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown job state: {0}")]
pub struct UnknownState(pub String);

impl FromStr for JobState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATES
            .iter()
            .find(|st| st.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
