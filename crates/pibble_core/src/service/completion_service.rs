//! Task completion and grade-driven health deltas.
//!
//! # Responsibility
//! - Validate completion requests (membership, grade, EXCUSED permissions).
//! - Swap the previously applied health delta of a `(task, user)` row for the
//!   new one as a single net adjustment.
//! - Record `task_completed` events for DONE.
//!
//! # Invariants
//! - Validation happens before any write; a rejected request mutates nothing.
//! - Undo, reapply and status persistence commit in one IMMEDIATE
//!   transaction, so no reader sees a half-swapped health value.
//! - After commit, the row's `applied_health_delta` equals what the pet
//!   absorbed for it, which is less than the grade delta when clamping
//!   cut the adjustment short. Undoing it therefore never mints or burns
//!   health.

use crate::model::event::Event;
use crate::model::grade::{net_health_delta, Grade, GradeError, GradeInput};
use crate::model::group::{GroupMode, GroupRole, Membership};
use crate::model::pet::Pet;
use crate::model::status::{CompletionState, TaskStatusRecord};
use crate::model::{now_epoch_ms, GroupId, TaskId, UserId};
use crate::repo::event_repo::{EventLog, SqliteEventLog};
use crate::repo::group_repo::{GroupRepository, SqliteGroupRepository};
use crate::repo::pet_repo::{PetRepository, SqlitePetRepository};
use crate::repo::status_repo::{SqliteStatusRepository, StatusRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::repo::RepoError;
use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One completion report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub task_id: TaskId,
    /// User whose status changes.
    pub user_id: UserId,
    /// User making the request. Equals `user_id` unless an instructor acts
    /// on someone's behalf.
    pub actor_id: UserId,
    pub state: CompletionState,
    pub grade: Option<GradeInput>,
}

impl CompletionRequest {
    /// Self-reported completion without a grade.
    pub fn new(task_id: TaskId, user_id: UserId, state: CompletionState) -> Self {
        Self {
            task_id,
            user_id,
            actor_id: user_id,
            state,
            grade: None,
        }
    }

    pub fn with_grade(mut self, grade: GradeInput) -> Self {
        self.grade = Some(grade);
        self
    }

    pub fn by_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = actor_id;
        self
    }
}

/// Result of an applied completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub state: CompletionState,
    pub grade: Option<Grade>,
    /// Delta the grade table assigns, before clamping.
    pub grade_delta: i32,
    /// Delta now in effect for this `(task, user)` row: the part of the
    /// adjustments the pet actually absorbed.
    pub applied_delta: i32,
    /// Adjustment handed to the pet (`grade_delta - previous delta`).
    pub net_delta: i32,
    pub pet: Pet,
}

/// Errors from completion use-cases.
#[derive(Debug)]
pub enum CompletionError {
    TaskNotFound(TaskId),
    /// User (or actor) is not a member of the task's group.
    NotAMember { group_id: GroupId, user_id: UserId },
    /// Actor may not change someone else's status.
    NotPermitted { actor_id: UserId },
    /// Exam/assignment marked DONE without a grade.
    MissingGrade(TaskId),
    InvalidGrade(GradeError),
    /// EXCUSED requested in a friend-mode group.
    ExcusedRequiresInstructorMode(GroupId),
    /// EXCUSED requested by an actor without the instructor role.
    ExcusedRequiresInstructor(UserId),
    Repo(RepoError),
}

impl CompletionError {
    /// Returns whether the request itself was rejected (caller error), as
    /// opposed to a storage failure.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, Self::Repo(_))
    }
}

impl Display for CompletionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::NotAMember { group_id, user_id } => {
                write!(f, "user {user_id} is not a member of group {group_id}")
            }
            Self::NotPermitted { actor_id } => write!(
                f,
                "user {actor_id} may only change their own status unless they are an instructor"
            ),
            Self::MissingGrade(id) => {
                write!(f, "task {id} requires a grade (percent or letter) to be marked done")
            }
            Self::InvalidGrade(err) => write!(f, "{err}"),
            Self::ExcusedRequiresInstructorMode(id) => {
                write!(f, "EXCUSED only in instructor mode (group {id})")
            }
            Self::ExcusedRequiresInstructor(id) => {
                write!(f, "instructor role required to excuse (user {id})")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CompletionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidGrade(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CompletionError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::TaskNotFound(id) => Self::TaskNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for CompletionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

impl From<GradeError> for CompletionError {
    fn from(value: GradeError) -> Self {
        Self::InvalidGrade(value)
    }
}

/// Applies completion reports and their grade deltas.
pub struct CompletionService<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> CompletionService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Applies one completion report atomically.
    ///
    /// # Contract
    /// - `NotDone`: reverses the row's applied delta and deletes the row.
    /// - `Done`: swaps the old delta for the grade's delta; grade required
    ///   for exams and assignments; writes a `task_completed` event.
    /// - `Excused`: instructor-mode groups and instructor actors only;
    ///   reverses any applied delta and stores the row with delta 0.
    pub fn apply_completion(
        &mut self,
        request: &CompletionRequest,
    ) -> Result<CompletionOutcome, CompletionError> {
        let now_ms = now_epoch_ms();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let task = SqliteTaskRepository::new(&tx)
            .get_task(request.task_id)?
            .ok_or(CompletionError::TaskNotFound(request.task_id))?;
        let groups = SqliteGroupRepository::new(&tx);
        let group = groups
            .get_group(task.group_id)?
            .ok_or(RepoError::GroupNotFound(task.group_id))?;
        require_member(&groups, group.id, request.user_id)?;
        let actor = require_member(&groups, group.id, request.actor_id)?;

        if request.actor_id != request.user_id && actor.role != GroupRole::Instructor {
            return Err(CompletionError::NotPermitted {
                actor_id: request.actor_id,
            });
        }

        let grade = match request.state {
            CompletionState::Excused => {
                if group.mode != GroupMode::Instructor {
                    return Err(CompletionError::ExcusedRequiresInstructorMode(group.id));
                }
                if actor.role != GroupRole::Instructor {
                    return Err(CompletionError::ExcusedRequiresInstructor(request.actor_id));
                }
                None
            }
            CompletionState::Done => {
                match request.grade.as_ref().filter(|input| !input.is_empty()) {
                    Some(input) => Some(input.resolve()?),
                    None if task.kind.requires_grade() => {
                        return Err(CompletionError::MissingGrade(task.id));
                    }
                    None => None,
                }
            }
            CompletionState::NotDone => None,
        };

        let statuses = SqliteStatusRepository::new(&tx);
        let previous_delta = statuses
            .get_status(task.id, request.user_id)?
            .map_or(0, |record| record.applied_health_delta);
        let grade_delta = grade.map_or(0, |grade| grade.letter.health_delta(task.kind));
        let net_delta = net_health_delta(previous_delta, grade_delta);

        let pets = SqlitePetRepository::new(&tx);
        let mut pet = pets.load_or_create(group.id)?;
        let health_before = pet.health();
        if net_delta != 0 {
            pet.adjust(net_delta);
            pets.save_health(&pet, now_ms)?;
        }
        // Clamping may swallow part of the adjustment; keep only what landed.
        let mut applied_delta = previous_delta + (pet.health() - health_before);

        match request.state {
            CompletionState::NotDone => {
                statuses.delete_status(task.id, request.user_id)?;
                applied_delta = 0;
            }
            state => {
                statuses.upsert_status(&TaskStatusRecord {
                    task_id: task.id,
                    user_id: request.user_id,
                    state,
                    grade,
                    applied_health_delta: applied_delta,
                    completed_at: now_ms,
                })?;
            }
        }

        if request.state == CompletionState::Done {
            let mut event =
                Event::task_completed(group.id, task.id, request.actor_id, request.user_id, now_ms);
            if grade_delta != 0 {
                event.delta = Some(grade_delta);
            }
            event.message = grade.map(|grade| grade.describe(grade_delta));
            SqliteEventLog::new(&tx).append(&event)?;
        }

        tx.commit()?;

        info!(
            "event=task_completion module=service status=ok task_id={} user_id={} state={:?} grade_delta={} applied_delta={} net_delta={} health={}",
            task.id,
            request.user_id,
            request.state,
            grade_delta,
            applied_delta,
            net_delta,
            pet.health()
        );

        Ok(CompletionOutcome {
            state: request.state,
            grade,
            grade_delta,
            applied_delta,
            net_delta,
            pet,
        })
    }
}

fn require_member(
    groups: &impl GroupRepository,
    group_id: GroupId,
    user_id: UserId,
) -> Result<Membership, CompletionError> {
    match groups.get_membership(group_id, user_id)? {
        Some(membership) => Ok(membership),
        None => {
            warn!(
                "event=task_completion module=service status=error error_code=not_a_member group_id={} user_id={}",
                group_id, user_id
            );
            Err(CompletionError::NotAMember { group_id, user_id })
        }
    }
}
