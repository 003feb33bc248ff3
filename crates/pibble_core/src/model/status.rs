//! Per-(task, user) completion status.
//!
//! # Invariants
//! - A missing row means `CompletionState::NotDone`; only `Done` and
//!   `Excused` are ever stored.
//! - `applied_health_delta` equals the delta that is currently in effect on
//!   the pet for this row, so it can be reversed exactly.

use super::grade::Grade;
use super::{TaskId, UserId};
use serde::{Deserialize, Serialize};

/// Completion state reported for one task by one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionState {
    NotDone,
    Done,
    Excused,
}

impl CompletionState {
    /// Returns whether this state shields the user from deadline penalties.
    pub fn is_exempt_from_penalty(self) -> bool {
        matches!(self, Self::Done | Self::Excused)
    }
}

/// Stored completion row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusRecord {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub state: CompletionState,
    pub grade: Option<Grade>,
    pub applied_health_delta: i32,
    /// Epoch ms of the last state change.
    pub completed_at: i64,
}

pub(crate) fn stored_state_to_db(state: CompletionState) -> Option<&'static str> {
    match state {
        CompletionState::NotDone => None,
        CompletionState::Done => Some("done"),
        CompletionState::Excused => Some("excused"),
    }
}

pub(crate) fn parse_stored_state(value: &str) -> Option<CompletionState> {
    match value {
        "done" => Some(CompletionState::Done),
        "excused" => Some(CompletionState::Excused),
        _ => None,
    }
}
