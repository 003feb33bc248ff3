//! Append-only event log over the `events` table.
//!
//! # Responsibility
//! - Append events and report storage-level dedup rejections as a normal
//!   outcome rather than an error.
//! - List recent events for a group.
//!
//! # Invariants
//! - No update/delete API exists; events are immutable.
//! - Dedup of `task_missed` is decided by the `uq_events_task_missed` index.
//!   This module never pre-checks for an existing row.

use super::{parse_optional_uuid, parse_uuid, RepoError, RepoResult};
use crate::db::is_unique_violation;
use crate::model::event::{event_kind_to_db, parse_event_kind, Event, EventKind};
use crate::model::{GroupId, TaskId};
use rusqlite::{params, Connection, Row};

const EVENT_SELECT_SQL: &str = "SELECT
    id,
    group_id,
    kind,
    actor_user_id,
    target_user_id,
    task_id,
    delta,
    message,
    created_at
FROM events";

/// Result of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Row was written.
    Appended,
    /// Storage rejected the row as a duplicate of an existing event.
    Duplicate,
}

/// Repository interface for the event log.
pub trait EventLog {
    fn append(&self, event: &Event) -> RepoResult<AppendOutcome>;
    /// Newest first, at most `limit` rows.
    fn list_group_events(&self, group_id: GroupId, limit: u32) -> RepoResult<Vec<Event>>;
    /// Events of one kind for one task, oldest first.
    fn list_task_events(&self, task_id: TaskId, kind: EventKind) -> RepoResult<Vec<Event>>;
}

/// SQLite-backed event log.
pub struct SqliteEventLog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventLog<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EventLog for SqliteEventLog<'_> {
    fn append(&self, event: &Event) -> RepoResult<AppendOutcome> {
        let inserted = self.conn.execute(
            "INSERT INTO events (
                id,
                group_id,
                kind,
                actor_user_id,
                target_user_id,
                task_id,
                delta,
                message,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                event.id.to_string(),
                event.group_id.to_string(),
                event_kind_to_db(event.kind),
                event.actor_user_id.map(|id| id.to_string()),
                event.target_user_id.map(|id| id.to_string()),
                event.task_id.map(|id| id.to_string()),
                event.delta,
                event.message.as_deref(),
                event.created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(AppendOutcome::Appended),
            Err(err) if is_unique_violation(&err) => Ok(AppendOutcome::Duplicate),
            Err(err) => Err(err.into()),
        }
    }

    fn list_group_events(&self, group_id: GroupId, limit: u32) -> RepoResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL}
             WHERE group_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2;"
        ))?;
        let mut rows = stmt.query(params![group_id.to_string(), i64::from(limit)])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }

    fn list_task_events(&self, task_id: TaskId, kind: EventKind) -> RepoResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL}
             WHERE task_id = ?1 AND kind = ?2
             ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query(params![task_id.to_string(), event_kind_to_db(kind)])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<Event> {
    let id_text: String = row.get("id")?;
    let group_text: String = row.get("group_id")?;
    let kind_text: String = row.get("kind")?;
    let kind = parse_event_kind(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid event kind `{kind_text}` in events.kind"))
    })?;

    Ok(Event {
        id: parse_uuid(&id_text, "events.id")?,
        kind,
        group_id: parse_uuid(&group_text, "events.group_id")?,
        actor_user_id: parse_optional_uuid(row.get("actor_user_id")?, "events.actor_user_id")?,
        target_user_id: parse_optional_uuid(row.get("target_user_id")?, "events.target_user_id")?,
        task_id: parse_optional_uuid(row.get("task_id")?, "events.task_id")?,
        delta: row.get("delta")?,
        message: row.get("message")?,
        created_at: row.get("created_at")?,
    })
}
