//! Task model.
//!
//! # Responsibility
//! - Describe deadline-bearing work items owned by a group.
//! - Carry the coarse "fully swept" marker used by deadline sweeps.
//!
//! # Invariants
//! - `penalty` is strictly positive.
//! - `penalty_applied_at` is set only after every member of the group has been
//!   processed for this task; a crash mid-sweep leaves it `None`.

use super::{GroupId, TaskId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Kind of task. Determines whether completion requires a grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Assignment,
    Quiz,
    Lecture,
    Exam,
    Other,
}

impl TaskType {
    /// Exams and assignments must be completed with a grade.
    pub fn requires_grade(self) -> bool {
        matches!(self, Self::Exam | Self::Assignment)
    }

    pub fn is_exam(self) -> bool {
        self == Self::Exam
    }
}

/// Validation errors for task records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    /// Penalty must be a positive amount of damage.
    NonPositivePenalty(i32),
    /// Title is blank after trim.
    BlankTitle,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositivePenalty(value) => {
                write!(f, "task penalty must be positive, got {value}")
            }
            Self::BlankTitle => write!(f, "task title must not be blank"),
        }
    }
}

impl Error for TaskValidationError {}

/// A deadline-bearing task owned by one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub group_id: GroupId,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: TaskType,
    /// Epoch ms deadline.
    pub due_at: i64,
    /// Health removed per eligible member who misses the deadline.
    pub penalty: i32,
    /// Epoch ms at which the deadline sweep finished this task.
    pub penalty_applied_at: Option<i64>,
}

impl Task {
    /// Creates an unswept task with a generated id and a penalty of 1.
    pub fn new(group_id: GroupId, title: impl Into<String>, kind: TaskType, due_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            title: title.into(),
            kind,
            due_at,
            penalty: 1,
            penalty_applied_at: None,
        }
    }

    /// Builder-style penalty override.
    pub fn with_penalty(mut self, penalty: i32) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.penalty <= 0 {
            return Err(TaskValidationError::NonPositivePenalty(self.penalty));
        }
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::BlankTitle);
        }
        Ok(())
    }

    /// Returns whether the deadline has strictly passed at `now_ms`.
    pub fn is_overdue_at(&self, now_ms: i64) -> bool {
        self.due_at < now_ms
    }
}

pub(crate) fn task_type_to_db(kind: TaskType) -> &'static str {
    match kind {
        TaskType::Assignment => "assignment",
        TaskType::Quiz => "quiz",
        TaskType::Lecture => "lecture",
        TaskType::Exam => "exam",
        TaskType::Other => "other",
    }
}

pub(crate) fn parse_task_type(value: &str) -> Option<TaskType> {
    match value {
        "assignment" => Some(TaskType::Assignment),
        "quiz" => Some(TaskType::Quiz),
        "lecture" => Some(TaskType::Lecture),
        "exam" => Some(TaskType::Exam),
        "other" => Some(TaskType::Other),
        _ => None,
    }
}
