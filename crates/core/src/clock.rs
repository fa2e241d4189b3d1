// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! Job timestamps are epoch seconds; that is the only granularity the
//! check engine and the store care about.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A clock that provides the current time as epoch seconds.
pub trait Clock: Clone + Send + Sync {
    fn now_epoch(&self) -> i64;
}

/// Real system clock.
#[derive(Clone, Default, Debug)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Fake clock for testing with controllable time.
#[derive(Clone, Debug)]
pub struct FakeClock {
    epoch: Arc<Mutex<i64>>,
}

impl FakeClock {
    pub fn new(epoch: i64) -> Self {
        Self {
            epoch: Arc::new(Mutex::new(epoch)),
        }
    }

    /// Advance the clock by the given number of seconds.
    pub fn advance(&self, secs: i64) {
        *self.epoch.lock() += secs;
    }

    pub fn set(&self, epoch: i64) {
        *self.epoch.lock() = epoch;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl Clock for FakeClock {
    fn now_epoch(&self) -> i64 {
        *self.epoch.lock()
    }
}
