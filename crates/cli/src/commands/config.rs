// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cellcc config` - inspect and validate the effective configuration.

use crate::context::GlobalArgs;
use cellcc_core::config::strip_nulls;
use clap::Args;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Validate the configuration and report the result
    #[arg(long)]
    pub check: bool,

    /// Print the effective configuration (set directives only)
    #[arg(long, conflicts_with = "check")]
    pub dump: bool,

    /// Print the effective configuration including unset directives
    #[arg(long = "dump-all", conflicts_with_all = ["check", "dump"])]
    pub dump_all: bool,

    /// Print a single directive, e.g. check/error-limit
    #[arg(value_name = "KEY", conflicts_with_all = ["check", "dump", "dump_all"])]
    pub key: Option<String>,
}

pub fn run(globals: &GlobalArgs, args: &ConfigArgs) -> anyhow::Result<i32> {
    if args.check {
        return match globals.try_load() {
            Ok(_) => {
                println!("configuration OK");
                Ok(0)
            }
            Err(err) => {
                eprintln!("cellcc: {err}");
                Ok(1)
            }
        };
    }

    let (config, _, _) = globals.try_load()?;
    if args.dump {
        println!(
            "{}",
            serde_json::to_string_pretty(&strip_nulls(config.to_value()))?
        );
        return Ok(0);
    }
    if args.dump_all {
        println!("{}", serde_json::to_string_pretty(&config.to_value())?);
        return Ok(0);
    }
    if let Some(key) = &args.key {
        let value = config.get(key)?;
        match value {
            serde_json::Value::String(s) => println!("{s}"),
            other => println!("{}", serde_json::to_string_pretty(&other)?),
        }
        return Ok(0);
    }
    anyhow::bail!("one of --check, --dump, --dump-all, or KEY is required");
}
