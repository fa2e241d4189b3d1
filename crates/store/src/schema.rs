// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table definitions for the `jobs`, `jobshist`, and `versions` relations.
//!
//! The live and archive tables are structurally identical except the archive
//! drops the `(dst_cell, volname)` uniqueness constraint and does not assign
//! ids. All times are BIGINT epoch seconds so both supported backends bind
//! them the same way.

/// Schema version this build speaks. Verified against the `versions` table
/// on every connect.
pub const SCHEMA_VERSION: i64 = 1;

/// Column list shared by reads and the archive projection, `id` first.
pub(crate) const JOB_COLUMNS: &str = "id, src_cell, dst_cell, volname, qname, vol_lastupdate, \
     dv, errors, state, last_good_state, dump_fqdn, dump_method, dump_port, dump_filename, \
     restore_filename, dump_checksum, dump_filesize, status_fqdn, ctime, mtime, \
     errorlimit_mtime, timeout, description";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    /// Infer the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("sqlite") {
            Dialect::Sqlite
        } else {
            Dialect::MySql
        }
    }
}

/// Shared column definitions (everything except the id column).
const BODY: &str = "\
    src_cell VARCHAR(255) NOT NULL,\n\
    dst_cell VARCHAR(255) NOT NULL,\n\
    volname VARCHAR(255) NOT NULL,\n\
    qname VARCHAR(255) NOT NULL,\n\
    vol_lastupdate BIGINT NOT NULL DEFAULT 0,\n\
    dv BIGINT NOT NULL,\n\
    errors INT NOT NULL DEFAULT 0,\n\
    state VARCHAR(63),\n\
    last_good_state VARCHAR(63),\n\
    dump_fqdn VARCHAR(255),\n\
    dump_method VARCHAR(63),\n\
    dump_port BIGINT,\n\
    dump_filename VARCHAR(255),\n\
    restore_filename VARCHAR(255),\n\
    dump_checksum VARCHAR(255),\n\
    dump_filesize BIGINT,\n\
    status_fqdn VARCHAR(255),\n\
    ctime BIGINT NOT NULL,\n\
    mtime BIGINT NOT NULL,\n\
    errorlimit_mtime BIGINT,\n\
    timeout BIGINT,\n\
    description TEXT NOT NULL";

/// DDL statements creating the full schema, in execution order.
pub fn ddl(dialect: Dialect) -> Vec<String> {
    let id_live = match dialect {
        Dialect::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        Dialect::MySql => "id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
    };
    vec![
        format!(
            "CREATE TABLE jobs (\n{id_live},\n{BODY},\nUNIQUE (dst_cell, volname)\n)"
        ),
        format!("CREATE TABLE jobshist (\nid BIGINT NOT NULL PRIMARY KEY,\n{BODY}\n)"),
        "CREATE INDEX jobs_src_cell ON jobs (src_cell)".to_string(),
        "CREATE INDEX jobs_dst_cell ON jobs (dst_cell)".to_string(),
        "CREATE INDEX jobs_state ON jobs (state)".to_string(),
        "CREATE TABLE versions (version BIGINT NOT NULL)".to_string(),
        format!("INSERT INTO versions (version) VALUES ({SCHEMA_VERSION})"),
    ]
}
