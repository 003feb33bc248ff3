//! Completion status repository: the status side of the resolver.
//!
//! # Responsibility
//! - Resolve one user's completion state for a task (missing row = NOT_DONE).
//! - Persist and remove status rows together with their applied health delta.
//!
//! # Invariants
//! - Only DONE and EXCUSED rows are stored.
//! - `health_delta` is written in the same statement as the status/grade it
//!   belongs to.

use super::{parse_uuid, RepoError, RepoResult};
use crate::model::grade::{Grade, GradeLetter};
use crate::model::status::{
    parse_stored_state, stored_state_to_db, CompletionState, TaskStatusRecord,
};
use crate::model::{TaskId, UserId};
use rusqlite::{params, Connection, Row};

const STATUS_SELECT_SQL: &str = "SELECT
    task_id,
    user_id,
    status,
    grade_letter,
    grade_percent,
    health_delta,
    completed_at
FROM task_status";

/// Repository interface for completion status rows.
pub trait StatusRepository {
    fn get_status(&self, task_id: TaskId, user_id: UserId) -> RepoResult<Option<TaskStatusRecord>>;
    /// Effective state; `NotDone` when no row exists.
    fn completion_state(&self, task_id: TaskId, user_id: UserId) -> RepoResult<CompletionState>;
    /// Inserts or replaces the row for `(task_id, user_id)`.
    fn upsert_status(&self, record: &TaskStatusRecord) -> RepoResult<()>;
    /// Deletes the row; returns whether one existed.
    fn delete_status(&self, task_id: TaskId, user_id: UserId) -> RepoResult<bool>;
}

/// SQLite-backed status repository.
pub struct SqliteStatusRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStatusRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl StatusRepository for SqliteStatusRepository<'_> {
    fn get_status(&self, task_id: TaskId, user_id: UserId) -> RepoResult<Option<TaskStatusRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STATUS_SELECT_SQL}
             WHERE task_id = ?1 AND user_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![task_id.to_string(), user_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_status_row(row)?));
        }
        Ok(None)
    }

    fn completion_state(&self, task_id: TaskId, user_id: UserId) -> RepoResult<CompletionState> {
        Ok(self
            .get_status(task_id, user_id)?
            .map_or(CompletionState::NotDone, |record| record.state))
    }

    fn upsert_status(&self, record: &TaskStatusRecord) -> RepoResult<()> {
        let state = stored_state_to_db(record.state).ok_or_else(|| {
            RepoError::InvalidData("NOT_DONE is represented by a missing row".to_string())
        })?;

        self.conn.execute(
            "INSERT INTO task_status (
                task_id,
                user_id,
                status,
                grade_letter,
                grade_percent,
                health_delta,
                completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (task_id, user_id) DO UPDATE SET
                status = excluded.status,
                grade_letter = excluded.grade_letter,
                grade_percent = excluded.grade_percent,
                health_delta = excluded.health_delta,
                completed_at = excluded.completed_at;",
            params![
                record.task_id.to_string(),
                record.user_id.to_string(),
                state,
                record.grade.map(|grade| grade.letter.as_str()),
                record.grade.and_then(|grade| grade.percent),
                record.applied_health_delta,
                record.completed_at,
            ],
        )?;
        Ok(())
    }

    fn delete_status(&self, task_id: TaskId, user_id: UserId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM task_status WHERE task_id = ?1 AND user_id = ?2;",
            params![task_id.to_string(), user_id.to_string()],
        )?;
        Ok(changed > 0)
    }
}

fn parse_status_row(row: &Row<'_>) -> RepoResult<TaskStatusRecord> {
    let task_text: String = row.get("task_id")?;
    let user_text: String = row.get("user_id")?;
    let status_text: String = row.get("status")?;
    let state = parse_stored_state(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in task_status.status"
        ))
    })?;

    let grade = match row.get::<_, Option<String>>("grade_letter")? {
        Some(letter_text) => {
            let letter = GradeLetter::parse(&letter_text).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid grade `{letter_text}` in task_status.grade_letter"
                ))
            })?;
            Some(Grade {
                letter,
                percent: row.get("grade_percent")?,
            })
        }
        None => None,
    };

    Ok(TaskStatusRecord {
        task_id: parse_uuid(&task_text, "task_status.task_id")?,
        user_id: parse_uuid(&user_text, "task_status.user_id")?,
        state,
        grade,
        applied_health_delta: row.get("health_delta")?,
        completed_at: row.get("completed_at")?,
    })
}
