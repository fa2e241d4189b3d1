// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI surface specs.

use crate::prelude::*;
use assert_cmd::Command;

#[test]
fn version_flag_prints_and_exits_zero() {
    let out = Command::cargo_bin("cellcc")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&out).contains("cellcc"));
}

#[test]
fn config_check_reports_ok() {
    let h = Harness::new();
    let out = h
        .cellcc()
        .args(["config", "--check"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&out).contains("configuration OK"));
}

#[test]
fn config_check_rejects_bad_directives() {
    let h = Harness::new();
    h.cellcc()
        .args(["-x", "dump/checksum=crc32", "config", "--check"])
        .assert()
        .code(1);
}

#[test]
fn config_key_lookup_prints_values() {
    let h = Harness::new();
    let out = h
        .cellcc()
        .args(["config", "check/error-limit"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8_lossy(&out).trim(), "5");

    // Overrides are visible in the effective config.
    let out = h
        .cellcc()
        .args(["-x", "json:check/error-limit=3", "config", "check/error-limit"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8_lossy(&out).trim(), "3");

    h.cellcc()
        .args(["config", "no/such/directive"])
        .assert()
        .code(1);
}

#[test]
fn config_dump_is_valid_json() {
    let h = Harness::new();
    let out = h
        .cellcc()
        .args(["config", "--dump-all"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["check"]["error-limit"], 5);
}

#[test]
fn jobs_with_empty_table() {
    let h = Harness::new();
    let out = h.cellcc().arg("jobs").assert().success().get_output().stdout.clone();
    assert!(String::from_utf8_lossy(&out).contains("no jobs"));
    assert_eq!(h.jobs(), serde_json::json!([]));
}

#[test]
fn start_sync_creates_one_job_per_destination() {
    let h = Harness::new();
    h.start_sync();
    let job = h.the_job();
    assert_eq!(job["state"], "NEW");
    assert_eq!(job["volname"], "u.alice");
    assert_eq!(job["dst_cell"], "dst.example");
    assert_eq!(job["qname"], "default");

    // Uniqueness: a second request for the same (dst, vol) fails.
    h.cellcc()
        .args(["start-sync", "src.example", "u.alice"])
        .assert()
        .code(1);
}

#[test]
fn volume_filter_exclude_skips_job_creation() {
    let h = Harness::new();
    let out = h
        .cellcc()
        .args(["-x", "dump/filter-command=echo exclude"])
        .args(["start-sync", "src.example", "u.alice"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&out).contains("excluded by volume filter"));
    assert_eq!(h.jobs(), serde_json::json!([]));
}

#[test]
fn bad_filter_output_is_fatal() {
    let h = Harness::new();
    h.cellcc()
        .args(["-x", "dump/filter-command=echo maybe"])
        .args(["start-sync", "src.example", "u.alice"])
        .assert()
        .code(1);
}

#[test]
fn ping_subcommand_answers_without_config() {
    let out = Command::cargo_bin("cellcc")
        .unwrap()
        .arg("ping")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(
        String::from_utf8_lossy(&out).trim(),
        "cellcc remctl server ok"
    );
}

#[test]
fn ping_remctl_round_trips_through_the_stub() {
    let h = Harness::new();
    let out = h
        .debug()
        .args(["ping-remctl", "dump.example"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&out).contains("cellcc remctl server ok"));
}

#[test]
fn test_alert_writes_to_the_text_command() {
    let h = Harness::new();
    h.debug().arg("test-alert").assert().success();
    let alerts = std::fs::read_to_string(h.alerts_path()).unwrap();
    assert!(alerts.contains("ALERT_STALE"));
    assert!(alerts.contains("dummy.vol.0"));
}
