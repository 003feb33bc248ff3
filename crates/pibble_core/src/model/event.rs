//! Append-only event log model.
//!
//! # Invariants
//! - Events are immutable once appended.
//! - At most one `EventKind::TaskMissed` exists per `(task_id, target_user_id)`;
//!   storage enforces this, not callers.

use super::{EventId, GroupId, TaskId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of domain occurrence recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    GroupCreated,
    MemberJoined,
    TaskCreated,
    TaskCompleted,
    /// Dedup-protected record of one applied deadline penalty.
    TaskMissed,
    PetDamaged,
    NudgeSent,
}

/// One event log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    pub group_id: GroupId,
    /// `None` for system-generated events such as missed deadlines.
    pub actor_user_id: Option<UserId>,
    pub target_user_id: Option<UserId>,
    pub task_id: Option<TaskId>,
    pub delta: Option<i32>,
    pub message: Option<String>,
    /// Epoch ms.
    pub created_at: i64,
}

impl Event {
    /// Creates an event with a generated id and no optional fields set.
    pub fn new(kind: EventKind, group_id: GroupId, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            group_id,
            actor_user_id: None,
            target_user_id: None,
            task_id: None,
            delta: None,
            message: None,
            created_at,
        }
    }

    /// Missed-deadline penalty for `user_id` on `task_id`.
    pub fn task_missed(
        group_id: GroupId,
        task_id: TaskId,
        user_id: UserId,
        penalty: i32,
        created_at: i64,
    ) -> Self {
        let mut event = Self::new(EventKind::TaskMissed, group_id, created_at);
        event.target_user_id = Some(user_id);
        event.task_id = Some(task_id);
        event.delta = Some(-penalty);
        event
    }

    /// Completion reported by `actor_user_id` for `user_id`.
    pub fn task_completed(
        group_id: GroupId,
        task_id: TaskId,
        actor_user_id: UserId,
        user_id: UserId,
        created_at: i64,
    ) -> Self {
        let mut event = Self::new(EventKind::TaskCompleted, group_id, created_at);
        event.actor_user_id = Some(actor_user_id);
        event.target_user_id = Some(user_id);
        event.task_id = Some(task_id);
        event
    }
}

pub(crate) fn event_kind_to_db(kind: EventKind) -> &'static str {
    match kind {
        EventKind::GroupCreated => "group_created",
        EventKind::MemberJoined => "member_joined",
        EventKind::TaskCreated => "task_created",
        EventKind::TaskCompleted => "task_completed",
        EventKind::TaskMissed => "task_missed",
        EventKind::PetDamaged => "pet_damaged",
        EventKind::NudgeSent => "nudge_sent",
    }
}

pub(crate) fn parse_event_kind(value: &str) -> Option<EventKind> {
    match value {
        "group_created" => Some(EventKind::GroupCreated),
        "member_joined" => Some(EventKind::MemberJoined),
        "task_created" => Some(EventKind::TaskCreated),
        "task_completed" => Some(EventKind::TaskCompleted),
        "task_missed" => Some(EventKind::TaskMissed),
        "pet_damaged" => Some(EventKind::PetDamaged),
        "nudge_sent" => Some(EventKind::NudgeSent),
        _ => None,
    }
}
