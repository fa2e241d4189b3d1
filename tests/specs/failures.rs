// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure-path specs: verification, retries, and the error limit.

use crate::prelude::*;

#[test]
fn transfer_checksum_mismatch_fails_then_recovers() {
    let h = Harness::new();
    h.start_sync();
    h.dump_once();

    // Corrupt the blob on the dump host, keeping its size so the size
    // check passes and the checksum catches it.
    let blob = h.dump_blobs().remove(0);
    let original = std::fs::read(&blob).unwrap();
    std::fs::write(&blob, vec![b'X'; original.len()]).unwrap();

    // First transfer attempt fails the job.
    h.restore_once();
    let job = h.the_job();
    assert_eq!(job["state"], "ERROR");
    assert_eq!(job["errors"], 1);
    assert_eq!(job["last_good_state"], "XFER_WORK");
    assert!(job["description"]
        .as_str()
        .unwrap()
        .contains("checksum mismatch"));
    // The corrupt local copy is gone; the origin blob survives for the retry.
    assert!(h.restore_blobs().is_empty());
    assert_eq!(h.dump_blobs().len(), 1);

    // One check tick resets to XFER_START.
    h.check_once();
    assert_eq!(h.the_job()["state"], "XFER_START");

    // Repair the blob; the next restore tick completes the pipeline.
    std::fs::write(&blob, original).unwrap();
    h.restore_once();
    assert_eq!(h.the_job()["state"], "RELEASE_DONE");
}

#[test]
fn error_limit_holds_the_job_and_rate_limits_alerts() {
    let h = Harness::new();
    h.break_size();
    h.start_sync();

    // Each dump attempt fails; each check tick retries, until the limit
    // (5) is reached.
    for _ in 0..6 {
        h.dump_once();
        h.check_once();
    }

    let job = h.the_job();
    assert_eq!(job["state"], "ERROR");
    assert_eq!(job["errors"], 5);

    let alerts = std::fs::read_to_string(h.alerts_path()).unwrap();
    let errorlimit_count = alerts.matches("ALERT_ERRORLIMIT").count();
    assert_eq!(errorlimit_count, 1, "alerts:\n{alerts}");

    // Within the rate-limit window: no further error-limit alerts.
    h.check_once();
    h.check_once();
    let alerts = std::fs::read_to_string(h.alerts_path()).unwrap();
    assert_eq!(alerts.matches("ALERT_ERRORLIMIT").count(), 1);

    // With a zero-length window, the next sweep alerts again.
    h.cellcc()
        .args(["-x", "json:check/errorlimit-alert-interval=0"])
        .args(["check-server", "--once"])
        .assert()
        .success();
    let alerts = std::fs::read_to_string(h.alerts_path()).unwrap();
    assert_eq!(alerts.matches("ALERT_ERRORLIMIT").count(), 2);
}

#[test]
fn retry_job_clears_errors_and_resumes() {
    let h = Harness::new();
    h.break_size();
    h.start_sync();
    h.dump_once();

    let job = h.the_job();
    assert_eq!(job["state"], "ERROR");
    let jobid = job["jobid"].as_i64().unwrap();

    h.cellcc()
        .args(["retry-job", &jobid.to_string()])
        .assert()
        .success();
    let job = h.the_job();
    assert_eq!(job["state"], "DUMP_START");
    assert_eq!(job["errors"], 0);

    // Retrying a job that is not failed is an error.
    h.cellcc()
        .args(["retry-job", &jobid.to_string()])
        .assert()
        .code(1);

    // Repair the size command and let the pipeline finish the dump.
    h.set_size(17);
    h.dump_once();
    assert_eq!(h.the_job()["state"], "DUMP_DONE");
}

#[test]
fn scratch_shortage_rolls_back_without_counting_an_error() {
    let h = Harness::new();
    h.start_sync();
    h.cellcc()
        .args(["-x", "json:dump/scratch-min-free=9000000000000000"])
        .args(["dump-server", "--once", "localhost", "src.example", "dst.example"])
        .assert()
        .success();

    let job = h.the_job();
    assert_eq!(job["state"], "DUMP_START");
    assert_eq!(job["errors"], 0);
    assert_eq!(job["description"], "waiting for scratch space");
    assert_eq!(job["timeout"], serde_json::Value::Null);
    assert!(h.dump_blobs().is_empty());
}

#[test]
fn kill_job_removes_the_row_outright() {
    let h = Harness::new();
    h.start_sync();
    let jobid = h.the_job()["jobid"].as_i64().unwrap();

    h.debug()
        .args(["kill-job", &jobid.to_string()])
        .assert()
        .success();
    assert_eq!(h.jobs(), serde_json::json!([]));

    h.debug()
        .args(["kill-job", &jobid.to_string()])
        .assert()
        .code(1);
}

#[test]
fn newer_destination_copy_is_fatal() {
    let h = Harness::new();
    // Destination claims a Last Update in the future relative to the source.
    h.set_examine(
        "dst.example",
        &examine_output("Wed Jun  4 10:00:00 2025", "dst"),
    );
    h.start_sync();
    h.cellcc()
        .args([
            "-x",
            "json:dump/incremental/enabled=true",
            "-x",
            "json:dump/incremental/fulldump-on-error=true",
        ])
        .args(["dump-server", "--once", "localhost", "src.example", "dst.example"])
        .assert()
        .success();

    // fulldump-on-error does not rescue this: the job fails.
    let job = h.the_job();
    assert_eq!(job["state"], "ERROR");
    assert!(job["description"].as_str().unwrap().contains("newer"));
}
