// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spec harness: scratch cell with stub vos/remctl commands.

use assert_cmd::Command;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The `Last Update` stamp both stub cells report by default.
pub const LASTUPDATE: &str = "Tue Jun  3 10:00:00 2025";

pub struct Harness {
    pub dir: TempDir,
    pub dump_dir: PathBuf,
    pub restore_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let dump_dir = dir.path().join("dump-scratch");
        let restore_dir = dir.path().join("restore-scratch");
        let state_dir = dir.path().join("state");
        std::fs::create_dir_all(&dump_dir).unwrap();
        std::fs::create_dir_all(&restore_dir).unwrap();
        std::fs::create_dir_all(&state_dir).unwrap();

        let harness = Self {
            config_path: dir.path().join("cellcc.conf"),
            dir,
            dump_dir,
            restore_dir,
            state_dir,
        };
        harness.write_vos_stub();
        harness.write_remctl_stub();
        harness.write_config();

        // Default stub data: both cells know the volume, same update stamp.
        harness.set_examine("src.example", &examine_output(LASTUPDATE, "src"));
        harness.set_examine("dst.example", &examine_output(LASTUPDATE, "dst"));
        harness.set_size(17);
        std::fs::write(harness.state_dir.join("dump.blob"), b"dump-bytes-of-u.alice").unwrap();

        harness.debug().arg("init-db").assert().success();
        harness
    }

    fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn write_vos_stub(&self) {
        let state = self.state_dir.display();
        self.write_script(
            "vos",
            &format!(
                r#"#!/bin/sh
state="{state}"
echo "$@" >> "$state/vos.log"
cmd="$1"; shift
find_arg() {{
    needle="$1"; shift
    prev=""
    for a in "$@"; do
        if [ "$prev" = "$needle" ]; then echo "$a"; return 0; fi
        prev="$a"
    done
    return 1
}}
case "$cmd" in
  examine)
    cell=$(find_arg -cell "$@")
    f="$state/examine.$cell"
    if [ -f "$f" ]; then cat "$f"; else echo "VLDB: no such entry" >&2; exit 1; fi
    ;;
  size)
    cat "$state/size.out"
    ;;
  dump)
    out=$(find_arg -file "$@")
    cp "$state/dump.blob" "$out"
    ;;
  restore|release|create|addsite|offline|remove)
    ;;
  *)
    echo "unknown subcommand $cmd" >&2
    exit 1
    ;;
esac
exit 0
"#
            ),
        );
    }

    fn write_remctl_stub(&self) {
        let cellcc = assert_cmd::cargo::cargo_bin("cellcc");
        self.write_script(
            "remctl",
            &format!(
                r#"#!/bin/sh
if [ "$1" = "-p" ]; then shift 2; fi
shift
REMOTE_USER="host/test@EXAMPLE.COM"
export REMOTE_USER
exec "{cellcc}" --config "{conf}" "$@"
"#,
                cellcc = cellcc.display(),
                conf = self.config_path.display(),
            ),
        );
    }

    fn write_config(&self) {
        let config = format!(
            r#"# CellCC spec-harness configuration
{{
    db: {{ url: "sqlite://{db}?mode=rwc" }},
    cells: {{
        "src.example": {{ "dst-cells": ["dst.example"] }},
    }},
    dump: {{
        "scratch-dir": "{dump}",
        "scratch-min-free": 0,
        "monitor-intervals": [1, 5],
    }},
    restore: {{
        "scratch-dir": "{restore}",
        "scratch-min-free": 0,
    }},
    vos: {{ command: "{vos}", localauth: true }},
    remctl: {{ command: "{remctl}", "allowed-principal": "host/test@EXAMPLE.COM" }},
    alert: {{ "text-command": "cat >> {alerts}" }},
}}
"#,
            db = self.dir.path().join("cellcc.db").display(),
            dump = self.dump_dir.display(),
            restore = self.restore_dir.display(),
            vos = self.dir.path().join("vos").display(),
            remctl = self.dir.path().join("remctl").display(),
            alerts = self.alerts_path().display(),
        );
        std::fs::write(&self.config_path, config).unwrap();
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.dir.path().join("alerts.txt")
    }

    pub fn set_examine(&self, cell: &str, content: &str) {
        std::fs::write(self.state_dir.join(format!("examine.{cell}")), content).unwrap();
    }

    pub fn remove_examine(&self, cell: &str) {
        let _ = std::fs::remove_file(self.state_dir.join(format!("examine.{cell}")));
    }

    pub fn set_size(&self, bytes: u64) {
        std::fs::write(self.state_dir.join("size.out"), format!("dump_size: {bytes}\n")).unwrap();
    }

    /// Break `vos size` so the dump stage fails.
    pub fn break_size(&self) {
        std::fs::write(self.state_dir.join("size.out"), "").unwrap();
    }

    pub fn cellcc(&self) -> Command {
        let mut cmd = Command::cargo_bin("cellcc").unwrap();
        cmd.arg("--config").arg(&self.config_path);
        cmd.env("CELLCC_LOG", "info");
        cmd
    }

    pub fn debug(&self) -> Command {
        let mut cmd = Command::cargo_bin("cellcc-debug").unwrap();
        cmd.arg("--config").arg(&self.config_path);
        cmd.env("CELLCC_LOG", "info");
        cmd
    }

    pub fn start_sync(&self) {
        self.cellcc()
            .args(["start-sync", "src.example", "u.alice"])
            .assert()
            .success();
    }

    pub fn dump_once(&self) {
        self.cellcc()
            .args(["dump-server", "--once", "localhost", "src.example", "dst.example"])
            .assert()
            .success();
    }

    pub fn restore_once(&self) {
        self.cellcc()
            .args(["restore-server", "--once", "dst.example"])
            .assert()
            .success();
    }

    pub fn check_once(&self) {
        self.cellcc()
            .args(["check-server", "--once"])
            .assert()
            .success();
    }

    /// All live jobs, from `cellcc jobs --format json`.
    pub fn jobs(&self) -> serde_json::Value {
        let output = self
            .cellcc()
            .args(["jobs", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).unwrap()
    }

    /// The single live job; panics if there is not exactly one.
    pub fn the_job(&self) -> serde_json::Value {
        let jobs = self.jobs();
        let list = jobs.as_array().unwrap();
        assert_eq!(list.len(), 1, "expected exactly one job: {jobs}");
        list[0].clone()
    }

    /// Dump blobs currently in the dump-host scratch directory.
    pub fn dump_blobs(&self) -> Vec<PathBuf> {
        blobs_in(&self.dump_dir)
    }

    pub fn restore_blobs(&self) -> Vec<PathBuf> {
        blobs_in(&self.restore_dir)
    }

    pub fn vos_log(&self) -> String {
        std::fs::read_to_string(self.state_dir.join("vos.log")).unwrap_or_default()
    }
}

fn blobs_in(dir: &Path) -> Vec<PathBuf> {
    let mut blobs: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "dump"))
        .collect();
    blobs.sort();
    blobs
}

/// Minimal `vos examine` output the daemon's parser understands.
pub fn examine_output(lastupdate: &str, cell_tag: &str) -> String {
    format!(
        "u.alice 536870912 RW 2000 K On-line\n\
         \x20   Last Update {lastupdate}\n\
         \x20   number of sites -> 2\n\
         \x20      server fs1.{cell_tag}.example partition /vicepa RW Site\n\
         \x20      server fs2.{cell_tag}.example partition /vicepb RO Site\n"
    )
}
