//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories borrow a `Connection`; a `Transaction` or `Savepoint` may be
//!   passed through deref so callers own transaction boundaries.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Repository APIs return semantic errors (`TaskNotFound`, ...) in addition
//!   to DB transport errors.

pub mod event_repo;
pub mod group_repo;
pub mod pet_repo;
pub mod status_repo;
pub mod task_repo;

use crate::db::DbError;
use crate::model::task::TaskValidationError;
use crate::model::{GroupId, TaskId};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by all health engine repositories.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Validation(TaskValidationError),
    GroupNotFound(GroupId),
    TaskNotFound(TaskId),
    InvalidData(String),
}

impl RepoError {
    /// Returns whether the failure is lock contention that a later retry may
    /// clear.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Db(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::GroupNotFound(id) => write!(f, "group not found: {id}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::GroupNotFound(_) => None,
            Self::TaskNotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(value: Option<String>, column: &str) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}
