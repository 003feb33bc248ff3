//! Domain model for groups, tasks, completion status, events and pet health.
//!
//! # Responsibility
//! - Define canonical data structures used by the health engine.
//! - Keep pure health arithmetic (clamping, grade deltas) free of storage.
//!
//! # Invariants
//! - Every persisted object is identified by a stable uuid.
//! - Timestamps are Unix epoch milliseconds.
//! - Pet health is always within `[0, max_health]`.

pub mod event;
pub mod grade;
pub mod group;
pub mod pet;
pub mod status;
pub mod task;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identifier of a group (the unit that owns one pet).
pub type GroupId = Uuid;
/// Identifier of a user. Issued by the identity layer, opaque here.
pub type UserId = Uuid;
/// Identifier of a task.
pub type TaskId = Uuid;
/// Identifier of an event log entry.
pub type EventId = Uuid;

/// Current wall-clock time in epoch milliseconds.
///
/// Clamps to `0` if the system clock reports a time before the epoch.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
