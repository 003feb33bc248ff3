//! Group and membership model.
//!
//! # Invariants
//! - A user holds exactly one role per group.
//! - Only `GroupRole::Student` members are penalty-eligible.

use super::{GroupId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Visibility/permission mode of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMode {
    /// Peer study group; every member may create tasks.
    Friend,
    /// Class run by instructors; instructors may excuse members.
    Instructor,
}

/// Role of one member inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Student,
    Instructor,
}

/// A group that owns one shared pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub mode: GroupMode,
}

impl Group {
    /// Creates a group with a generated id.
    pub fn new(name: impl Into<String>, mode: GroupMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mode,
        }
    }
}

/// Membership row: one user in one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: GroupRole,
    /// Epoch ms. Sweeps process members in ascending join order.
    pub joined_at: i64,
}

pub(crate) fn group_mode_to_db(mode: GroupMode) -> &'static str {
    match mode {
        GroupMode::Friend => "friend",
        GroupMode::Instructor => "instructor",
    }
}

pub(crate) fn parse_group_mode(value: &str) -> Option<GroupMode> {
    match value {
        "friend" => Some(GroupMode::Friend),
        "instructor" => Some(GroupMode::Instructor),
        _ => None,
    }
}

pub(crate) fn group_role_to_db(role: GroupRole) -> &'static str {
    match role {
        GroupRole::Student => "student",
        GroupRole::Instructor => "instructor",
    }
}

pub(crate) fn parse_group_role(value: &str) -> Option<GroupRole> {
    match value {
        "student" => Some(GroupRole::Student),
        "instructor" => Some(GroupRole::Instructor),
        _ => None,
    }
}
