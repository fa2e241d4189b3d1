// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the job record and update structures.

use super::*;
use crate::state::JobState;

#[test]
fn deadline_is_mtime_plus_timeout() {
    let job = Job::builder().mtime(1_000).timeout(30).build();
    assert_eq!(job.deadline(), Some(1_030));
    assert!(!job.expired(1_030));
    assert!(job.expired(1_031));
}

#[test]
fn no_timeout_means_no_deadline() {
    let job = Job::builder().mtime(1_000).build();
    assert_eq!(job.deadline(), None);
    assert!(!job.expired(i64::MAX));
}

#[test]
fn update_ctx_carries_row_identity() {
    let job = Job::builder().jobid(42).dv(7).build();
    let ctx = job.update_ctx();
    assert_eq!(ctx.jobid, 42);
    assert_eq!(ctx.dv, 7);
}

#[test]
fn empty_update_is_detected() {
    assert!(JobUpdate::default().is_empty());
    assert!(!JobUpdate::default().state(JobState::DumpWork).is_empty());
    assert!(!JobUpdate::default().clear_timeout().is_empty());
}

#[test]
fn desc_computes_staleness_and_expiry() {
    let job = Job::builder().ctime(100).mtime(200).timeout(50).build();
    let desc = JobDesc::from_job(job, 300);
    assert_eq!(desc.stale_seconds, 100);
    assert_eq!(desc.age_seconds, 200);
    assert_eq!(desc.deadline, Some(250));
    assert!(desc.expired);
}

#[test]
fn desc_serializes_flattened() {
    let job = Job::builder().jobid(9).build();
    let desc = JobDesc::from_job(job, 1_000_001);
    let value = serde_json::to_value(&desc).unwrap();
    assert_eq!(value["jobid"], 9);
    assert_eq!(value["state"], "NEW");
    assert_eq!(value["stale_seconds"], 1);
}
