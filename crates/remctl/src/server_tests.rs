// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the server-side subcommand bodies.

use super::*;
use yare::parameterized;

#[test]
fn principal_must_match_exactly() {
    check_principal(Some("host/dump.example@EXAMPLE.COM"), "host/dump.example@EXAMPLE.COM")
        .unwrap();

    let err = check_principal(Some("host/evil@EXAMPLE.COM"), "host/dump.example@EXAMPLE.COM")
        .unwrap_err();
    assert!(matches!(err, RemctlError::AccessDenied { .. }));

    let err = check_principal(None, "host/dump.example@EXAMPLE.COM").unwrap_err();
    assert!(matches!(err, RemctlError::AccessDenied { principal: None }));
}

#[parameterized(
    empty = { "" },
    dot = { "." },
    dotdot = { ".." },
    slash = { "sub/vol.dump" },
    abs = { "/etc/passwd" },
    backslash = { "a\\b" },
    traversal = { "../escape.dump" },
)]
fn path_like_filenames_are_rejected(name: &str) {
    let err = get_dump_path(Path::new("/scratch"), name).unwrap_err();
    assert!(matches!(err, RemctlError::BadFilename(_)), "{name}");
}

#[test]
fn bare_names_resolve_into_scratch() {
    let path = get_dump_path(Path::new("/scratch"), "u.alice.7.abcd.dump").unwrap();
    assert_eq!(path, Path::new("/scratch/u.alice.7.abcd.dump"));
}

#[test]
fn write_dump_streams_the_blob() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("vol.dump"), b"dump bytes").unwrap();

    let mut out = Vec::new();
    let n = write_dump(dir.path(), "vol.dump", &mut out).unwrap();
    assert_eq!(n, 10);
    assert_eq!(out, b"dump bytes");
}

#[test]
fn write_dump_missing_blob_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = write_dump(dir.path(), "gone.dump", &mut Vec::new()).unwrap_err();
    assert!(matches!(err, RemctlError::Io(_)));
}

#[test]
fn remove_dump_unlinks() {
    let dir = tempfile::tempdir().unwrap();
    let blob = dir.path().join("vol.dump");
    std::fs::write(&blob, b"x").unwrap();

    remove_dump(dir.path(), "vol.dump").unwrap();
    assert!(!blob.exists());

    // A second removal surfaces the unlink failure.
    assert!(remove_dump(dir.path(), "vol.dump").is_err());
}
