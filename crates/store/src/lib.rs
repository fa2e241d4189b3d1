// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cellcc-store: typed access to the shared `jobs`/`jobshist` relations.
//!
//! The database is the only coordination point between hosts. Every mutation
//! goes through the optimistic update
//! `UPDATE jobs SET dv = dv + 1, ... WHERE id = ? AND dv = ?`, so concurrent
//! workers race on `dv` instead of holding row locks across their work.

pub mod error;
pub mod jobs;
pub mod schema;

pub use error::StoreError;
pub use jobs::{describe_dummy_jobs, CreateJob};
pub use schema::SCHEMA_VERSION;

use cellcc_core::{Clock, SystemClock};
use error::is_deadlock;
use futures_util::future::BoxFuture;
use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Row, Transaction};
use std::time::Duration;

/// Transaction attempts before a deadlock-class error surfaces.
const TXN_ATTEMPTS: u32 = 4;

/// Handle to the job database.
#[derive(Clone, Debug)]
pub struct Store<C: Clock = SystemClock> {
    pool: AnyPool,
    /// Recorded in `status_fqdn` on every mutation.
    fqdn: String,
    clock: C,
}

impl Store<SystemClock> {
    /// Connect and verify the schema version.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        Self::connect_with_clock(url, max_connections, SystemClock).await
    }
}

impl<C: Clock> Store<C> {
    pub async fn connect_with_clock(
        url: &str,
        max_connections: u32,
        clock: C,
    ) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self {
            pool,
            fqdn: local_fqdn(),
            clock,
        };
        store.check_schema_version().await?;
        Ok(store)
    }

    async fn check_schema_version(&self) -> Result<(), StoreError> {
        let rows = sqlx::query("SELECT version FROM versions")
            .fetch_all(&self.pool)
            .await?;
        let mut found = Vec::new();
        for row in &rows {
            let version: i64 = row.try_get("version")?;
            if version == schema::SCHEMA_VERSION {
                return Ok(());
            }
            found.push(version);
        }
        Err(StoreError::SchemaVersion {
            found,
            supported: schema::SCHEMA_VERSION,
        })
    }

    /// The clock mutations are stamped with.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now_epoch()
    }

    pub(crate) fn fqdn(&self) -> &str {
        &self.fqdn
    }

    /// Run `f` in a read/write transaction, committing on success.
    ///
    /// Deadlock-class errors retry with a doubling backoff base
    /// (100 ms, 200 ms, 400 ms) plus up to 50% jitter. Any other error rolls
    /// back and surfaces.
    pub(crate) async fn run_txn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: for<'t> Fn(&'t mut Transaction<'static, Any>) -> BoxFuture<'t, Result<T, StoreError>>,
    {
        let mut attempt = 0u32;
        loop {
            let mut tx = self.pool.begin().await?;
            match f(&mut tx).await {
                Ok(value) => {
                    tx.commit().await?;
                    return Ok(value);
                }
                Err(err) => {
                    // Dropping the transaction rolls it back.
                    drop(tx);
                    attempt += 1;
                    if attempt >= TXN_ATTEMPTS || !is_deadlock(&err) {
                        return Err(err);
                    }
                    let delay = backoff_delay(attempt - 1);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transaction deadlocked, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Create the schema from scratch and seed the version row.
pub async fn init_schema(url: &str) -> Result<(), StoreError> {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new().max_connections(1).connect(url).await?;
    for stmt in schema::ddl(schema::Dialect::from_url(url)) {
        sqlx::query(&stmt).execute(&pool).await?;
    }
    Ok(())
}

/// Base 100 ms doubled per retry, with up to 50% additive jitter.
fn backoff_delay(retry: u32) -> Duration {
    use rand::Rng;
    let base = 100u64 << retry.min(4);
    let jitter = rand::thread_rng().gen_range(0..=base / 2);
    Duration::from_millis(base + jitter)
}

/// Hostname of this machine, as recorded in `status_fqdn`/`dump_fqdn`.
pub fn local_fqdn() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}
