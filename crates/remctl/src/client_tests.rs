// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client tests against stub remctl scripts.

use super::*;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

fn stub_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("remctl-stub");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[tokio::test]
async fn ping_returns_the_response_line() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_script(dir.path(), "echo 'cellcc remctl server ok'");

    let client = RemctlClient::new(stub.display().to_string(), None);
    let response = client.ping("dump.example").await.unwrap();
    assert_eq!(response, "cellcc remctl server ok");
}

#[tokio::test]
async fn get_dump_streams_stdout_into_dest() {
    let dir = tempfile::tempdir().unwrap();
    // Stub ignores host/subcommand and emits fixed bytes.
    let stub = stub_script(dir.path(), "printf 'dump-bytes'");

    let dest = dir.path().join("fetched.dump");
    let client = RemctlClient::new(stub.display().to_string(), None);
    client
        .get_dump("dump.example", "vol.dump", &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"dump-bytes");
}

#[tokio::test]
async fn failures_carry_stderr_and_remove_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_script(dir.path(), "printf partial; echo 'no such dump' >&2; exit 1");

    let dest = dir.path().join("fetched.dump");
    let client = RemctlClient::new(stub.display().to_string(), None);
    let err = client
        .get_dump("dump.example", "vol.dump", &dest)
        .await
        .unwrap_err();
    match err {
        RemctlError::Failed { stderr, subcommand, .. } => {
            assert_eq!(subcommand, "get-dump");
            assert!(stderr.contains("no such dump"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dest.exists());
}

#[tokio::test]
async fn port_flag_is_passed_through() {
    let dir = tempfile::tempdir().unwrap();
    // Stub echoes its arguments so we can see the flag ordering.
    let stub = stub_script(dir.path(), "echo \"$@\"");

    let client = RemctlClient::new(stub.display().to_string(), Some(4373));
    let response = client.ping("dump.example").await.unwrap();
    assert_eq!(response, "-p 4373 dump.example ping");
}

#[tokio::test]
async fn missing_client_binary_is_a_spawn_error() {
    let client = RemctlClient::new("/nonexistent/remctl", None);
    let err = client.ping("dump.example").await.unwrap_err();
    assert!(matches!(err, RemctlError::Spawn { .. }));
}
