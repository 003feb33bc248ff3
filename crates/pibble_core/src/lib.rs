//! Shared pet-health engine for study groups.
//!
//! Missed deadlines and poor grades damage a group's pet. This crate owns the
//! storage schema, the deadline sweep, and grade-driven completion updates.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, WorkerConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_lock_timeout, DbError};
pub use logging::{
    default_log_level, flush_logging, init_logging, init_logging_with_echo, logging_status,
    LogEcho,
};
pub use model::event::{Event, EventKind};
pub use model::grade::{Grade, GradeError, GradeInput, GradeLetter};
pub use model::group::{Group, GroupMode, GroupRole, Membership};
pub use model::pet::Pet;
pub use model::status::{CompletionState, TaskStatusRecord};
pub use model::task::{Task, TaskType, TaskValidationError};
pub use model::{GroupId, TaskId, UserId};
pub use repo::{RepoError, RepoResult};
pub use service::completion_service::{
    CompletionError, CompletionOutcome, CompletionRequest, CompletionService,
};
pub use service::deadline_service::{DeadlinePenaltyService, SweepReport, SweepScope};
pub use service::poller::PenaltyPoller;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
