// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline specs: the happy path and its variants.

use crate::prelude::*;

#[test]
fn happy_sync_runs_to_release_done_and_is_archived() {
    let h = Harness::new();
    h.start_sync();

    // Dump side: blob produced, metadata recorded.
    h.dump_once();
    let job = h.the_job();
    assert_eq!(job["state"], "DUMP_DONE");
    assert_eq!(job["dump_fqdn"], "localhost");
    assert_eq!(job["dump_method"], "remctl");
    assert_eq!(job["dump_filesize"], 21);
    assert!(job["dump_checksum"]
        .as_str()
        .unwrap()
        .starts_with("sha256:"));
    assert_eq!(job["vol_lastupdate"], 0);
    assert_eq!(h.dump_blobs().len(), 1);

    // Destination side: fetch, restore, release.
    h.restore_once();
    let job = h.the_job();
    assert_eq!(job["state"], "RELEASE_DONE");
    // The blob was consumed on both sides.
    assert!(h.dump_blobs().is_empty());
    assert!(h.restore_blobs().is_empty());
    let log = h.vos_log();
    assert!(log.contains("restore"), "vos log:\n{log}");
    assert!(log.contains("release"), "vos log:\n{log}");

    // Check server: terminal job leaves the live table.
    h.check_once();
    assert_eq!(h.jobs(), serde_json::json!([]));

    // Idempotent done: another sweep changes nothing and succeeds.
    h.check_once();
    assert_eq!(h.jobs(), serde_json::json!([]));
}

#[test]
fn second_dump_server_finds_nothing_to_claim() {
    let h = Harness::new();
    h.start_sync();
    h.dump_once();

    // The job is already past NEW; a second scan must not dump again.
    h.dump_once();
    assert_eq!(h.the_job()["state"], "DUMP_DONE");
    assert_eq!(h.dump_blobs().len(), 1);
}

#[test]
fn skip_unchanged_short_circuits_to_release_done() {
    let h = Harness::new();
    // Both cells report the same Last Update by default.
    h.start_sync();
    h.cellcc()
        .args([
            "-x",
            "json:dump/incremental/enabled=true",
            "-x",
            "json:dump/incremental/skip-unchanged=true",
        ])
        .args(["dump-server", "--once", "localhost", "src.example", "dst.example"])
        .assert()
        .success();

    let job = h.the_job();
    assert_eq!(job["state"], "RELEASE_DONE");
    // No blob was produced.
    assert!(h.dump_blobs().is_empty());
}

#[test]
fn incremental_dump_records_the_baseline() {
    let h = Harness::new();
    // Destination is older than the source.
    h.set_examine(
        "dst.example",
        &examine_output("Mon Jun  2 10:00:00 2025", "dst"),
    );
    h.start_sync();
    h.cellcc()
        .args(["-x", "json:dump/incremental/enabled=true"])
        .args(["dump-server", "--once", "localhost", "src.example", "dst.example"])
        .assert()
        .success();

    let job = h.the_job();
    assert_eq!(job["state"], "DUMP_DONE");
    // Baseline is the destination's update stamp (Jun 2 2025 10:00 UTC).
    assert_eq!(job["vol_lastupdate"], 1_748_858_400);
}

#[test]
fn missing_destination_volume_forces_a_full_dump() {
    let h = Harness::new();
    h.remove_examine("dst.example");
    h.start_sync();
    h.cellcc()
        .args(["-x", "json:dump/incremental/enabled=true"])
        .args(["dump-server", "--once", "localhost", "src.example", "dst.example"])
        .assert()
        .success();
    let job = h.the_job();
    assert_eq!(job["state"], "DUMP_DONE");
    assert_eq!(job["vol_lastupdate"], 0);
}

#[test]
fn delete_pipeline_removes_sites_replicas_first() {
    let h = Harness::new();
    h.cellcc()
        .args(["start-sync", "--delete", "src.example", "u.alice"])
        .assert()
        .success();
    assert_eq!(h.the_job()["state"], "DELETE_NEW");

    h.restore_once();
    assert_eq!(h.the_job()["state"], "DELETE_DEST_DONE");

    // RO removal precedes the RW removal.
    let log = h.vos_log();
    let ro = log
        .find("-id u.alice.readonly")
        .unwrap_or_else(|| panic!("no readonly removal in vos log:\n{log}"));
    let rw = log
        .rfind("remove")
        .unwrap_or_else(|| panic!("no removal in vos log:\n{log}"));
    assert!(ro < rw, "vos log:\n{log}");

    // Check sweep archives the finished deletion.
    h.check_once();
    assert_eq!(h.jobs(), serde_json::json!([]));
}

#[test]
fn restore_creates_a_missing_destination_volume() {
    let h = Harness::new();
    h.start_sync();
    h.dump_once();

    // The destination volume vanishes before the restore; the site picker
    // names two sites and the first becomes the RW site.
    h.remove_examine("dst.example");
    let picker = format!(
        "echo '# picked sites'; echo 'fs1.dst.example /vicepa'; echo 'fs2.dst.example /vicepb'; \
         cp '{src}' '{dst}'",
        src = h.state_dir.join("examine.src.example").display(),
        dst = h.state_dir.join("examine.dst.example").display(),
    );
    h.cellcc()
        .args(["-x", &format!("restore/pick-sites-command={picker}")])
        .args(["restore-server", "--once", "dst.example"])
        .assert()
        .success();

    assert_eq!(h.the_job()["state"], "RELEASE_DONE");
    let log = h.vos_log();
    assert!(log.contains("create"), "vos log:\n{log}");
    assert!(log.contains("addsite"), "vos log:\n{log}");
    assert!(log.contains("offline"), "vos log:\n{log}");
}
