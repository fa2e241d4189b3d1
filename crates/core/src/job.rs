// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sync-job record and the structures that mutate it.
//!
//! A [`Job`] row is owned by whichever worker holds its current `dv`. Every
//! mutation goes through the store's optimistic update
//! (`UPDATE ... WHERE id = ? AND dv = ?`), threading an [`UpdateCtx`] whose
//! `dv` is bumped on success.

use crate::state::JobState;
use serde::{Deserialize, Serialize};

/// One row of the `jobs` (or `jobshist`) table.
///
/// Nullable columns are `Option`s; all times are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub jobid: i64,
    pub src_cell: String,
    pub dst_cell: String,
    pub volname: String,
    /// Queue name; `default` unless the sync request named one.
    pub qname: String,
    pub state: JobState,
    /// State the job was in before the most recent failure.
    pub last_good_state: Option<JobState>,
    /// Data version: incremented by every successful mutation.
    pub dv: u64,
    /// Count of failed attempts since the last reset.
    pub errors: u32,
    /// When the last error-limit alert fired, for rate limiting.
    pub errorlimit_mtime: Option<i64>,
    pub dump_fqdn: Option<String>,
    pub dump_method: Option<String>,
    pub dump_port: Option<i64>,
    pub dump_filename: Option<String>,
    /// Formatted `algo:hex`.
    pub dump_checksum: Option<String>,
    pub dump_filesize: Option<i64>,
    /// Epoch seconds of the incremental baseline; 0 for a full dump.
    pub vol_lastupdate: i64,
    /// Local blob name on the restore host once fetched.
    pub restore_filename: Option<String>,
    pub ctime: i64,
    pub mtime: i64,
    /// Seconds added to `mtime` to compute a deadline; None means no deadline.
    pub timeout: Option<i64>,
    /// Host that last updated the row.
    pub status_fqdn: Option<String>,
    /// Short human-readable current-activity string.
    pub description: String,
}

impl Job {
    /// The optimistic-concurrency token for this row as last read.
    pub fn update_ctx(&self) -> UpdateCtx {
        UpdateCtx {
            jobid: self.jobid,
            dv: self.dv,
        }
    }

    /// Absolute deadline in epoch seconds, when a timeout is set.
    pub fn deadline(&self) -> Option<i64> {
        self.timeout.map(|t| self.mtime + t)
    }

    /// Whether the deadline has passed.
    pub fn expired(&self, now: i64) -> bool {
        self.deadline().is_some_and(|d| now > d)
    }
}

/// In/out token for the store's optimistic update protocol.
///
/// `dv` holds the version the caller last observed; a successful update
/// bumps it to the row's new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateCtx {
    pub jobid: i64,
    pub dv: u64,
}

/// Row-selection filter for `find_jobs` / `find_and_advance`.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub jobid: Option<i64>,
    pub src_cell: Option<String>,
    pub dst_cells: Option<Vec<String>>,
    pub volname: Option<String>,
    pub qname: Option<String>,
    pub states: Option<Vec<JobState>>,
}

impl JobFilter {
    pub fn jobid(jobid: i64) -> Self {
        Self {
            jobid: Some(jobid),
            ..Self::default()
        }
    }

    pub fn with_src_cell(mut self, cell: impl Into<String>) -> Self {
        self.src_cell = Some(cell.into());
        self
    }

    pub fn with_dst_cells(mut self, cells: Vec<String>) -> Self {
        self.dst_cells = Some(cells);
        self
    }

    pub fn with_qname(mut self, qname: impl Into<String>) -> Self {
        self.qname = Some(qname.into());
        self
    }

    pub fn with_states(mut self, states: Vec<JobState>) -> Self {
        self.states = Some(states);
        self
    }
}

/// Column mutations for one optimistic update.
///
/// `Some(x)` sets a column; the outer `None` leaves it alone. Nullable
/// columns take `Option<Option<_>>` so `Some(None)` can null them out.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub state: Option<JobState>,
    pub last_good_state: Option<Option<JobState>>,
    pub errors: Option<u32>,
    pub errorlimit_mtime: Option<Option<i64>>,
    pub dump_fqdn: Option<Option<String>>,
    pub dump_method: Option<Option<String>>,
    pub dump_port: Option<Option<i64>>,
    pub dump_filename: Option<Option<String>>,
    pub dump_checksum: Option<Option<String>>,
    pub dump_filesize: Option<Option<i64>>,
    pub vol_lastupdate: Option<i64>,
    pub restore_filename: Option<Option<String>>,
    pub timeout: Option<Option<i64>>,
    pub description: Option<String>,
}

impl JobUpdate {
    pub fn state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn timeout(mut self, secs: i64) -> Self {
        self.timeout = Some(Some(secs));
        self
    }

    pub fn clear_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    pub fn errors(mut self, errors: u32) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn restore_filename(mut self, name: impl Into<String>) -> Self {
        self.restore_filename = Some(Some(name.into()));
        self
    }

    pub fn clear_restore_filename(mut self) -> Self {
        self.restore_filename = Some(None);
        self
    }

    pub fn clear_dump_filename(mut self) -> Self {
        self.dump_filename = Some(None);
        self
    }

    /// True when no column would change.
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.last_good_state.is_none()
            && self.errors.is_none()
            && self.errorlimit_mtime.is_none()
            && self.dump_fqdn.is_none()
            && self.dump_method.is_none()
            && self.dump_port.is_none()
            && self.dump_filename.is_none()
            && self.dump_checksum.is_none()
            && self.dump_filesize.is_none()
            && self.vol_lastupdate.is_none()
            && self.restore_filename.is_none()
            && self.timeout.is_none()
            && self.description.is_none()
    }
}

/// A [`Job`] enriched with the computed fields operators see in `cellcc jobs`.
#[derive(Debug, Clone, Serialize)]
pub struct JobDesc {
    #[serde(flatten)]
    pub job: Job,
    /// Seconds since the row last changed.
    pub stale_seconds: i64,
    /// Seconds since the job was created.
    pub age_seconds: i64,
    /// Absolute deadline in epoch seconds, if a timeout is set.
    pub deadline: Option<i64>,
    pub expired: bool,
}

impl JobDesc {
    pub fn from_job(job: Job, now: i64) -> Self {
        let stale_seconds = (now - job.mtime).max(0);
        let age_seconds = (now - job.ctime).max(0);
        let deadline = job.deadline();
        let expired = job.expired(now);
        Self {
            job,
            stale_seconds,
            age_seconds,
            deadline,
            expired,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct JobBuilder {
    job: Job,
}

#[cfg(any(test, feature = "test-support"))]
impl JobBuilder {
    pub fn jobid(mut self, jobid: i64) -> Self {
        self.job.jobid = jobid;
        self
    }

    pub fn volname(mut self, v: impl Into<String>) -> Self {
        self.job.volname = v.into();
        self
    }

    pub fn dst_cell(mut self, v: impl Into<String>) -> Self {
        self.job.dst_cell = v.into();
        self
    }

    pub fn state(mut self, state: JobState) -> Self {
        self.job.state = state;
        self
    }

    pub fn last_good_state(mut self, state: JobState) -> Self {
        self.job.last_good_state = Some(state);
        self
    }

    pub fn dv(mut self, dv: u64) -> Self {
        self.job.dv = dv;
        self
    }

    pub fn errors(mut self, errors: u32) -> Self {
        self.job.errors = errors;
        self
    }

    pub fn errorlimit_mtime(mut self, at: i64) -> Self {
        self.job.errorlimit_mtime = Some(at);
        self
    }

    pub fn ctime(mut self, at: i64) -> Self {
        self.job.ctime = at;
        self
    }

    pub fn mtime(mut self, at: i64) -> Self {
        self.job.mtime = at;
        self
    }

    pub fn timeout(mut self, secs: i64) -> Self {
        self.job.timeout = Some(secs);
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Job {
    /// Builder seeded with plausible test defaults.
    pub fn builder() -> JobBuilder {
        JobBuilder {
            job: Job {
                jobid: 1,
                src_cell: "src.example".to_string(),
                dst_cell: "dst.example".to_string(),
                volname: "u.alice".to_string(),
                qname: "default".to_string(),
                state: JobState::New,
                last_good_state: None,
                dv: 1,
                errors: 0,
                errorlimit_mtime: None,
                dump_fqdn: None,
                dump_method: None,
                dump_port: None,
                dump_filename: None,
                dump_checksum: None,
                dump_filesize: None,
                vol_lastupdate: 0,
                restore_filename: None,
                ctime: 1_000_000,
                mtime: 1_000_000,
                timeout: None,
                status_fqdn: None,
                description: String::new(),
            },
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
