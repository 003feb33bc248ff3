//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Select overdue tasks that the deadline sweep has not finished yet.
//! - Own writes to the `penalty_applied_at` sweep marker.
//!
//! # Invariants
//! - Overdue means `due_at < now` (strict).
//! - Unswept tasks are returned `due_at ASC, id ASC` so logs stay deterministic.

use super::{parse_uuid, RepoError, RepoResult};
use crate::model::task::{parse_task_type, task_type_to_db, Task};
use crate::model::{GroupId, TaskId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const TASK_SELECT_SQL: &str = "SELECT
    id,
    group_id,
    title,
    type,
    due_at,
    penalty,
    penalty_applied_at
FROM tasks";

/// Repository interface for task reads and sweep-marker writes.
pub trait TaskRepository {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Overdue tasks with no sweep marker, optionally limited to one group.
    fn list_unswept_overdue(&self, group_id: Option<GroupId>, now_ms: i64)
        -> RepoResult<Vec<Task>>;
    /// Sets the "fully swept" marker.
    fn mark_swept(&self, id: TaskId, swept_at: i64) -> RepoResult<()>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId> {
        task.validate()?;

        self.conn.execute(
            "INSERT INTO tasks (
                id,
                group_id,
                title,
                type,
                due_at,
                penalty,
                penalty_applied_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                task.id.to_string(),
                task.group_id.to_string(),
                task.title.as_str(),
                task_type_to_db(task.kind),
                task.due_at,
                task.penalty,
                task.penalty_applied_at,
            ],
        )?;

        Ok(task.id)
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn list_unswept_overdue(
        &self,
        group_id: Option<GroupId>,
        now_ms: i64,
    ) -> RepoResult<Vec<Task>> {
        let mut sql = format!(
            "{TASK_SELECT_SQL}
             WHERE penalty_applied_at IS NULL
               AND due_at < ?"
        );
        let mut bind_values: Vec<Value> = vec![Value::Integer(now_ms)];

        if let Some(group_id) = group_id {
            sql.push_str(" AND group_id = ?");
            bind_values.push(Value::Text(group_id.to_string()));
        }
        sql.push_str(" ORDER BY due_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn mark_swept(&self, id: TaskId, swept_at: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks SET penalty_applied_at = ?2 WHERE id = ?1;",
            params![id.to_string(), swept_at],
        )?;
        if changed == 0 {
            return Err(RepoError::TaskNotFound(id));
        }
        Ok(())
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let group_text: String = row.get("group_id")?;
    let type_text: String = row.get("type")?;
    let kind = parse_task_type(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task type `{type_text}` in tasks.type"))
    })?;

    let task = Task {
        id: parse_uuid(&id_text, "tasks.id")?,
        group_id: parse_uuid(&group_text, "tasks.group_id")?,
        title: row.get("title")?,
        kind,
        due_at: row.get("due_at")?,
        penalty: row.get("penalty")?,
        penalty_applied_at: row.get("penalty_applied_at")?,
    };
    task.validate()?;
    Ok(task)
}
