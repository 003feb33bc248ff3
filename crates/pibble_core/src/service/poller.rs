//! Periodic deadline sweep.
//!
//! # Responsibility
//! - Run an all-groups sweep every `interval` until asked to stop.
//! - Keep running when a single sweep fails; the next tick retries.
//!
//! # Invariants
//! - A sweep is never interrupted mid-task; the stop flag is checked only
//!   between ticks and between sleep slices.

use super::deadline_service::{DeadlinePenaltyService, SweepReport, SweepScope};
use crate::repo::RepoResult;
use log::{error, info};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Background poller owning its own connection.
pub struct PenaltyPoller {
    conn: Connection,
    interval: Duration,
    ticks: u64,
}

impl PenaltyPoller {
    pub fn new(conn: Connection, interval: Duration) -> Self {
        Self {
            conn,
            interval,
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one all-groups sweep.
    pub fn tick(&mut self) -> RepoResult<SweepReport> {
        self.ticks += 1;
        DeadlinePenaltyService::new(&mut self.conn).apply_deadline_penalties(SweepScope::All)
    }

    /// Ticks until `stop` is set. With `stop` already set, runs exactly once.
    ///
    /// Returns the number of ticks whose sweep failed.
    pub fn run_until(&mut self, stop: &AtomicBool) -> u64 {
        info!(
            "event=poller_start module=service status=ok interval_ms={}",
            self.interval.as_millis()
        );

        let mut failures = 0;
        loop {
            if let Err(err) = self.tick() {
                failures += 1;
                error!(
                    "event=poller_tick module=service status=error tick={} error={}",
                    self.ticks, err
                );
            }

            if stop.load(Ordering::Relaxed) || !self.sleep_interval(stop) {
                break;
            }
        }

        info!(
            "event=poller_stop module=service status=ok ticks={} failures={}",
            self.ticks, failures
        );
        failures
    }

    /// Sleeps one interval in slices. Returns false when stopped early.
    fn sleep_interval(&self, stop: &AtomicBool) -> bool {
        let deadline = Instant::now() + self.interval;
        loop {
            if stop.load(Ordering::Relaxed) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
