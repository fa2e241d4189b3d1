// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server side of the remote-command protocol.
//!
//! These hidden subcommands are what `remctld` on a dump host maps the
//! `ping` / `get-dump` / `remove-dump` protocol commands to. `remctld`
//! reports the authenticated client principal in `REMOTE_USER`.

use crate::context::Context;
use cellcc_remctl::{check_principal, remove_dump, write_dump, RemctlError, PING_RESPONSE};
use std::io::IsTerminal;

pub fn ping() {
    println!("{PING_RESPONSE}");
}

fn authenticate(ctx: &Context) -> anyhow::Result<()> {
    let allowed = ctx.config.remctl_allowed_principal()?;
    let remote_user = std::env::var("REMOTE_USER").ok();
    check_principal(remote_user.as_deref(), allowed)?;
    Ok(())
}

pub fn get_dump(ctx: &Context, filename: &str) -> anyhow::Result<()> {
    authenticate(ctx)?;
    let mut stdout = std::io::stdout();
    if stdout.is_terminal() {
        return Err(RemctlError::TtyStdout.into());
    }
    let scratch = ctx.config.dump_scratch_dir()?;
    let bytes = write_dump(scratch, filename, &mut stdout)?;
    tracing::info!(filename, bytes, "served dump blob");
    Ok(())
}

pub fn remove(ctx: &Context, filename: &str) -> anyhow::Result<()> {
    authenticate(ctx)?;
    let scratch = ctx.config.dump_scratch_dir()?;
    remove_dump(scratch, filename)?;
    Ok(())
}
