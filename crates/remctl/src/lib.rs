// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cellcc-remctl: the remote-command channel between dump and restore hosts.
//!
//! The restore host is the client. It shells out to the `remctl` binary,
//! which carries one of three subcommands to the dump host: `ping`,
//! `get-dump <filename>`, and `remove-dump <filename>`. The server side of
//! those subcommands lives here too; `remctld` on the dump host maps them to
//! hidden `cellcc` invocations, with the authenticated principal arriving in
//! `REMOTE_USER`.

pub mod client;
pub mod server;

pub use client::RemctlClient;
pub use server::{check_principal, get_dump_path, remove_dump, write_dump, PING_RESPONSE};

#[derive(Debug, thiserror::Error)]
pub enum RemctlError {
    #[error("spawning {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remctl {subcommand} on {host} failed ({status}): {stderr}")]
    Failed {
        host: String,
        subcommand: String,
        status: String,
        stderr: String,
    },

    /// The caller's authenticated principal does not match the configured one.
    #[error("access denied for principal {principal:?}")]
    AccessDenied { principal: Option<String> },

    /// Dump filenames are bare names resolved against the scratch directory.
    #[error("invalid dump filename: {0}")]
    BadFilename(String),

    #[error("refusing to stream a dump to a terminal")]
    TtyStdout,

    #[error("dump file error: {0}")]
    Io(#[from] std::io::Error),
}
