//! Deadline penalty sweep.
//!
//! # Responsibility
//! - Find overdue, unswept tasks in a scope (one group or all groups).
//! - Emit one `task_missed` event and one penalty per eligible member,
//!   exactly once, under concurrent sweepers.
//!
//! # Invariants
//! - Each task is swept inside its own IMMEDIATE transaction, which holds
//!   SQLite's write lock across the pet read-modify-write.
//! - Each member's event insert and health write share one savepoint; a dedup
//!   rejection rolls back only that savepoint.
//! - `penalty_applied_at` is written after every member has been processed.
//! - The marker is re-read under the write lock; a task another sweeper
//!   finished after this sweep listed it is skipped, not swept again.
//! - The `uq_events_task_missed` index is the source of truth for "already
//!   applied"; the sweep marker is only a fast skip.
//! - A task that fails on lock contention keeps its marker unset and is left
//!   for the next sweep.

use crate::model::event::Event;
use crate::model::pet::Pet;
use crate::model::task::Task;
use crate::model::{now_epoch_ms, GroupId};
use crate::repo::event_repo::{AppendOutcome, EventLog, SqliteEventLog};
use crate::repo::group_repo::{GroupRepository, SqliteGroupRepository};
use crate::repo::pet_repo::{PetRepository, SqlitePetRepository};
use crate::repo::status_repo::{SqliteStatusRepository, StatusRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::repo::{RepoError, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::time::Instant;

/// Which tasks a sweep considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepScope {
    /// Tasks of one group, used by the inline dashboard trigger.
    Group(GroupId),
    /// Every group, used by the periodic poller.
    All,
}

impl SweepScope {
    fn group_filter(self) -> Option<GroupId> {
        match self {
            Self::Group(group_id) => Some(group_id),
            Self::All => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Group(_) => "group",
            Self::All => "all",
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Missed events newly written (and penalties newly applied) by this sweep.
    pub applied_events: usize,
    /// Tasks whose sweep marker this sweep committed.
    pub swept_tasks: usize,
    /// Tasks skipped on lock contention; retried by a later sweep.
    pub deferred_tasks: usize,
}

/// Per-task result inside one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaskSweep {
    applied: usize,
    duplicates: usize,
    exempt: usize,
    health_after: i32,
}

/// Applies missed-deadline penalties.
pub struct DeadlinePenaltyService<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> DeadlinePenaltyService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Sweeps `scope` using the current wall clock.
    pub fn apply_deadline_penalties(&mut self, scope: SweepScope) -> RepoResult<SweepReport> {
        self.apply_deadline_penalties_at(scope, now_epoch_ms())
    }

    /// Sweeps `scope` treating `now_ms` as the current time.
    ///
    /// # Errors
    /// - Lock contention on a single task is absorbed into
    ///   `SweepReport::deferred_tasks`.
    /// - Any other storage failure aborts the current task's transaction and
    ///   is returned; tasks committed earlier in this sweep stay committed,
    ///   and the tasks after it wait for the next sweep.
    pub fn apply_deadline_penalties_at(
        &mut self,
        scope: SweepScope,
        now_ms: i64,
    ) -> RepoResult<SweepReport> {
        let started_at = Instant::now();
        let tasks = SqliteTaskRepository::new(self.conn)
            .list_unswept_overdue(scope.group_filter(), now_ms)?;

        if tasks.is_empty() {
            debug!(
                "event=deadline_sweep module=service status=skip scope={} reason=no_overdue_tasks",
                scope.label()
            );
            return Ok(SweepReport::default());
        }

        let mut report = SweepReport::default();
        for task in &tasks {
            match sweep_task(self.conn, task, now_ms) {
                Ok(None) => {
                    debug!(
                        "event=deadline_task module=service status=skip task_id={} group_id={} reason=already_swept",
                        task.id, task.group_id
                    );
                }
                Ok(Some(result)) => {
                    report.applied_events += result.applied;
                    report.swept_tasks += 1;
                    info!(
                        "event=deadline_task module=service status=ok task_id={} group_id={} applied={} duplicates={} exempt={} health={}",
                        task.id,
                        task.group_id,
                        result.applied,
                        result.duplicates,
                        result.exempt,
                        result.health_after
                    );
                }
                Err(err) if err.is_transient() => {
                    report.deferred_tasks += 1;
                    warn!(
                        "event=deadline_task module=service status=deferred task_id={} group_id={} error={}",
                        task.id, task.group_id, err
                    );
                }
                Err(err) => {
                    error!(
                        "event=deadline_task module=service status=error task_id={} group_id={} error={}",
                        task.id, task.group_id, err
                    );
                    return Err(err);
                }
            }
        }

        info!(
            "event=deadline_sweep module=service status=ok scope={} tasks={} applied={} deferred={} duration_ms={}",
            scope.label(),
            report.swept_tasks,
            report.applied_events,
            report.deferred_tasks,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Inline trigger: sweeps one group and returns the pet the caller is
    /// about to display.
    pub fn refresh_group_health(&mut self, group_id: GroupId) -> RepoResult<(SweepReport, Pet)> {
        if SqliteGroupRepository::new(self.conn)
            .get_group(group_id)?
            .is_none()
        {
            return Err(RepoError::GroupNotFound(group_id));
        }
        let report = self.apply_deadline_penalties(SweepScope::Group(group_id))?;
        let pet = SqlitePetRepository::new(self.conn)
            .get_pet(group_id)?
            .unwrap_or_else(|| Pet::new(group_id));
        Ok((report, pet))
    }
}

/// Returns `None` when the task was finished by another sweeper between
/// listing and taking the write lock.
fn sweep_task(
    conn: &mut Connection,
    listed: &Task,
    now_ms: i64,
) -> RepoResult<Option<TaskSweep>> {
    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let task = match SqliteTaskRepository::new(&tx).get_task(listed.id)? {
        Some(task) if task.penalty_applied_at.is_none() => task,
        _ => return Ok(None),
    };

    let mut pet = SqlitePetRepository::new(&tx).load_or_create(task.group_id)?;
    let members = SqliteGroupRepository::new(&tx).list_penalty_eligible_members(task.group_id)?;

    let mut result = TaskSweep {
        applied: 0,
        duplicates: 0,
        exempt: 0,
        health_after: pet.health(),
    };

    for member in &members {
        let state = SqliteStatusRepository::new(&tx).completion_state(task.id, member.user_id)?;
        if state.is_exempt_from_penalty() {
            result.exempt += 1;
            continue;
        }

        let mut savepoint = tx.savepoint()?;
        let missed = Event::task_missed(task.group_id, task.id, member.user_id, task.penalty, now_ms);
        let outcome = SqliteEventLog::new(&savepoint).append(&missed)?;
        if outcome == AppendOutcome::Duplicate {
            // Another sweeper already applied this member's penalty: roll back
            // to the savepoint, then release it.
            savepoint.rollback()?;
            savepoint.commit()?;
            result.duplicates += 1;
            continue;
        }

        let health = pet.adjust(-task.penalty);
        SqlitePetRepository::new(&savepoint).save_health(&pet, now_ms)?;
        savepoint.commit()?;

        result.applied += 1;
        debug!(
            "event=missed_penalty module=service status=ok task_id={} user_id={} penalty={} health={}",
            task.id, member.user_id, task.penalty, health
        );
    }

    SqliteTaskRepository::new(&tx).mark_swept(task.id, now_ms)?;
    tx.commit()?;

    result.health_after = pet.health();
    Ok(Some(result))
}
