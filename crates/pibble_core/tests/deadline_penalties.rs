use pibble_core::db::{open_db, open_db_in_memory, open_db_with_lock_timeout};
use pibble_core::model::now_epoch_ms;
use pibble_core::repo::event_repo::{AppendOutcome, EventLog, SqliteEventLog};
use pibble_core::repo::group_repo::{GroupRepository, SqliteGroupRepository};
use pibble_core::repo::pet_repo::{PetRepository, SqlitePetRepository};
use pibble_core::repo::status_repo::{SqliteStatusRepository, StatusRepository};
use pibble_core::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use pibble_core::{
    CompletionState, DeadlinePenaltyService, Event, EventKind, Group, GroupMode, GroupRole,
    Membership, RepoError, SweepReport, SweepScope, Task, TaskStatusRecord, TaskType, UserId,
};
use rusqlite::{Connection, TransactionBehavior};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

const NOW: i64 = 1_700_000_000_000;
const HOUR_MS: i64 = 60 * 60 * 1000;

#[test]
fn overdue_task_damages_pet_once_per_unfinished_student() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);
    let alice = add_member(&conn, &group, GroupRole::Student, 1);
    let bob = add_member(&conn, &group, GroupRole::Student, 2);
    let task = create_task(&conn, &group, NOW - HOUR_MS, 2);

    let report = DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();

    assert_eq!(
        report,
        SweepReport {
            applied_events: 2,
            swept_tasks: 1,
            deferred_tasks: 0,
        }
    );
    assert_eq!(pet_health(&conn, &group), 6);

    let missed = missed_events(&conn, &task);
    assert_eq!(missed.len(), 2);
    let targets: Vec<_> = missed.iter().map(|event| event.target_user_id).collect();
    assert!(targets.contains(&Some(alice)));
    assert!(targets.contains(&Some(bob)));
    for event in &missed {
        assert_eq!(event.delta, Some(-2));
        assert_eq!(event.actor_user_id, None);
        assert_eq!(event.created_at, NOW);
    }

    let stored = SqliteTaskRepository::new(&conn)
        .get_task(task.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.penalty_applied_at, Some(NOW));
}

#[test]
fn done_member_is_skipped_and_rerun_is_stable() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);
    let finished = add_member(&conn, &group, GroupRole::Student, 1);
    let behind = add_member(&conn, &group, GroupRole::Student, 2);
    let task = create_task(&conn, &group, NOW - HOUR_MS, 2);
    store_status(&conn, &task, finished, CompletionState::Done);

    let mut service = DeadlinePenaltyService::new(&mut conn);
    let first = service
        .apply_deadline_penalties_at(SweepScope::Group(group.id), NOW)
        .unwrap();
    let second = service
        .apply_deadline_penalties_at(SweepScope::Group(group.id), NOW + 1)
        .unwrap();

    assert_eq!(first.applied_events, 1);
    assert_eq!(second.applied_events, 0);
    assert_eq!(pet_health(&conn, &group), 8);
    let missed = missed_events(&conn, &task);
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0].target_user_id, Some(behind));
}

#[test]
fn second_sweep_applies_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);
    add_member(&conn, &group, GroupRole::Student, 1);
    let task = create_task(&conn, &group, NOW - HOUR_MS, 3);

    let mut service = DeadlinePenaltyService::new(&mut conn);
    service
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();
    let second = service
        .apply_deadline_penalties_at(SweepScope::All, NOW + HOUR_MS)
        .unwrap();

    assert_eq!(second, SweepReport::default());
    assert_eq!(pet_health(&conn, &group), 7);
    assert_eq!(missed_events(&conn, &task).len(), 1);
}

#[test]
fn cleared_marker_is_caught_by_dedup_index() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);
    add_member(&conn, &group, GroupRole::Student, 1);
    let task = create_task(&conn, &group, NOW - HOUR_MS, 2);

    DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();
    conn.execute(
        "UPDATE tasks SET penalty_applied_at = NULL WHERE id = ?1;",
        [task.id.to_string()],
    )
    .unwrap();

    let report = DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::All, NOW + 1)
        .unwrap();

    assert_eq!(report.applied_events, 0);
    assert_eq!(report.swept_tasks, 1);
    assert_eq!(pet_health(&conn, &group), 8);
    assert_eq!(missed_events(&conn, &task).len(), 1);
}

#[test]
fn done_excused_and_instructors_are_exempt() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Instructor);
    add_member(&conn, &group, GroupRole::Instructor, 0);
    let done = add_member(&conn, &group, GroupRole::Student, 1);
    let excused = add_member(&conn, &group, GroupRole::Student, 2);
    let late = add_member(&conn, &group, GroupRole::Student, 3);
    let task = create_task(&conn, &group, NOW - HOUR_MS, 1);
    store_status(&conn, &task, done, CompletionState::Done);
    store_status(&conn, &task, excused, CompletionState::Excused);

    let report = DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();

    assert_eq!(report.applied_events, 1);
    assert_eq!(pet_health(&conn, &group), 9);
    let missed = missed_events(&conn, &task);
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0].target_user_id, Some(late));
}

#[test]
fn tasks_due_now_or_later_are_not_swept() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);
    add_member(&conn, &group, GroupRole::Student, 1);
    let due_now = create_task(&conn, &group, NOW, 1);
    let due_later = create_task(&conn, &group, NOW + HOUR_MS, 1);

    let report = DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();

    assert_eq!(report, SweepReport::default());
    let tasks = SqliteTaskRepository::new(&conn);
    for task in [due_now, due_later] {
        let stored = tasks.get_task(task.id).unwrap().unwrap();
        assert_eq!(stored.penalty_applied_at, None);
    }
    assert!(SqlitePetRepository::new(&conn)
        .get_pet(group.id)
        .unwrap()
        .is_none());
}

#[test]
fn group_scope_leaves_other_groups_alone() {
    let mut conn = open_db_in_memory().unwrap();
    let first = create_group(&conn, GroupMode::Friend);
    let second = create_group(&conn, GroupMode::Friend);
    add_member(&conn, &first, GroupRole::Student, 1);
    add_member(&conn, &second, GroupRole::Student, 1);
    create_task(&conn, &first, NOW - HOUR_MS, 1);
    let untouched = create_task(&conn, &second, NOW - HOUR_MS, 1);

    let report = DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::Group(first.id), NOW)
        .unwrap();

    assert_eq!(report.swept_tasks, 1);
    assert_eq!(pet_health(&conn, &first), 9);
    assert!(missed_events(&conn, &untouched).is_empty());

    let all = DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();
    assert_eq!(all.swept_tasks, 1);
    assert_eq!(pet_health(&conn, &second), 9);
}

#[test]
fn health_never_drops_below_zero() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);
    for joined_at in 0..3 {
        add_member(&conn, &group, GroupRole::Student, joined_at);
    }
    let task = create_task(&conn, &group, NOW - HOUR_MS, 4);

    let report = DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();

    assert_eq!(report.applied_events, 3);
    assert_eq!(pet_health(&conn, &group), 0);
    assert_eq!(missed_events(&conn, &task).len(), 3);
}

#[test]
fn sweep_skips_members_already_penalized_elsewhere() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);
    let alice = add_member(&conn, &group, GroupRole::Student, 1);
    add_member(&conn, &group, GroupRole::Student, 2);
    let task = create_task(&conn, &group, NOW - HOUR_MS, 2);

    let earlier = Event::task_missed(group.id, task.id, alice, 2, NOW - 1);
    assert_eq!(
        SqliteEventLog::new(&conn).append(&earlier).unwrap(),
        AppendOutcome::Appended
    );

    let report = DeadlinePenaltyService::new(&mut conn)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();

    assert_eq!(report.applied_events, 1);
    assert_eq!(pet_health(&conn, &group), 8);
    assert_eq!(missed_events(&conn, &task).len(), 2);
}

#[test]
fn lock_contention_defers_task_without_marking_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contended.db");
    let mut holder = open_db(&path).unwrap();
    let group = create_group(&holder, GroupMode::Friend);
    add_member(&holder, &group, GroupRole::Student, 1);
    let task = create_task(&holder, &group, NOW - HOUR_MS, 1);

    let mut sweeper = open_db_with_lock_timeout(&path, Duration::from_millis(50)).unwrap();
    let lock = holder
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .unwrap();

    let report = DeadlinePenaltyService::new(&mut sweeper)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();
    assert_eq!(report.deferred_tasks, 1);
    assert_eq!(report.swept_tasks, 0);
    lock.rollback().unwrap();

    let retry = DeadlinePenaltyService::new(&mut sweeper)
        .apply_deadline_penalties_at(SweepScope::All, NOW)
        .unwrap();
    assert_eq!(retry.applied_events, 1);
    assert_eq!(missed_events(&holder, &task).len(), 1);
}

#[test]
fn task_finished_while_waiting_for_lock_is_not_swept_again() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("finished.db");
    let mut holder = open_db(&path).unwrap();
    let group = create_group(&holder, GroupMode::Friend);
    let early = add_member(&holder, &group, GroupRole::Student, 1);
    let task = create_task(&holder, &group, NOW - HOUR_MS, 2);

    let lock = holder
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .unwrap();
    let waiting_path = path.clone();
    let waiter = thread::spawn(move || {
        let mut conn = open_db_with_lock_timeout(&waiting_path, Duration::from_secs(10)).unwrap();
        DeadlinePenaltyService::new(&mut conn)
            .apply_deadline_penalties_at(SweepScope::All, NOW + 5)
            .unwrap()
    });
    thread::sleep(Duration::from_millis(200));

    let missed = Event::task_missed(group.id, task.id, early, 2, NOW);
    SqliteEventLog::new(&lock).append(&missed).unwrap();
    SqliteTaskRepository::new(&lock).mark_swept(task.id, NOW).unwrap();
    let late = add_member(&lock, &group, GroupRole::Student, 2);
    lock.commit().unwrap();

    let report = waiter.join().unwrap();
    assert_eq!(report.applied_events, 0);
    assert_eq!(report.swept_tasks, 0);
    assert_eq!(report.deferred_tasks, 0);

    let stored = SqliteTaskRepository::new(&holder)
        .get_task(task.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.penalty_applied_at, Some(NOW));
    let targets: Vec<_> = missed_events(&holder, &task)
        .iter()
        .map(|event| event.target_user_id)
        .collect();
    assert_eq!(targets, vec![Some(early)]);
    assert!(!targets.contains(&Some(late)));
}

#[test]
fn concurrent_sweepers_apply_each_penalty_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("concurrent.db");
    let setup = open_db(&path).unwrap();
    let group = create_group(&setup, GroupMode::Friend);
    for joined_at in 0..3 {
        add_member(&setup, &group, GroupRole::Student, joined_at);
    }
    let tasks: Vec<Task> = (0..4)
        .map(|offset| create_task(&setup, &group, NOW - HOUR_MS + offset, 1))
        .collect();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let mut conn = open_db(&path).unwrap();
                DeadlinePenaltyService::new(&mut conn)
                    .apply_deadline_penalties_at(SweepScope::All, NOW)
                    .unwrap()
            })
        })
        .collect();
    let reports: Vec<SweepReport> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert!(reports.iter().all(|report| report.deferred_tasks == 0));
    let applied: usize = reports.iter().map(|report| report.applied_events).sum();
    assert_eq!(applied, 12);
    assert_eq!(pet_health(&setup, &group), 0);
    for task in &tasks {
        assert_eq!(missed_events(&setup, task).len(), 3);
    }
}

#[test]
fn refresh_group_health_sweeps_and_returns_pet() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);
    add_member(&conn, &group, GroupRole::Student, 1);
    create_task(&conn, &group, now_epoch_ms() - HOUR_MS, 3);

    let (report, pet) = DeadlinePenaltyService::new(&mut conn)
        .refresh_group_health(group.id)
        .unwrap();

    assert_eq!(report.applied_events, 1);
    assert_eq!(pet.health(), 7);
    assert_eq!(pet.max_health(), 10);
    assert_eq!(pet.name, "Pibble");
}

#[test]
fn refresh_group_health_returns_default_pet_without_tasks() {
    let mut conn = open_db_in_memory().unwrap();
    let group = create_group(&conn, GroupMode::Friend);

    let (report, pet) = DeadlinePenaltyService::new(&mut conn)
        .refresh_group_health(group.id)
        .unwrap();

    assert_eq!(report, SweepReport::default());
    assert_eq!(pet.health(), 10);
}

#[test]
fn refresh_group_health_rejects_unknown_group() {
    let mut conn = open_db_in_memory().unwrap();
    let missing = Uuid::new_v4();

    let err = DeadlinePenaltyService::new(&mut conn)
        .refresh_group_health(missing)
        .unwrap_err();
    assert!(matches!(err, RepoError::GroupNotFound(id) if id == missing));
}

fn create_group(conn: &Connection, mode: GroupMode) -> Group {
    let group = Group::new("Chem 101", mode);
    SqliteGroupRepository::new(conn).create_group(&group).unwrap();
    group
}

fn add_member(conn: &Connection, group: &Group, role: GroupRole, joined_at: i64) -> UserId {
    let user_id = Uuid::new_v4();
    SqliteGroupRepository::new(conn)
        .add_member(&Membership {
            group_id: group.id,
            user_id,
            role,
            joined_at,
        })
        .unwrap();
    user_id
}

fn create_task(conn: &Connection, group: &Group, due_at: i64, penalty: i32) -> Task {
    let task = Task::new(group.id, "Lab report", TaskType::Assignment, due_at).with_penalty(penalty);
    SqliteTaskRepository::new(conn).create_task(&task).unwrap();
    task
}

fn store_status(conn: &Connection, task: &Task, user_id: UserId, state: CompletionState) {
    SqliteStatusRepository::new(conn)
        .upsert_status(&TaskStatusRecord {
            task_id: task.id,
            user_id,
            state,
            grade: None,
            applied_health_delta: 0,
            completed_at: NOW - 2 * HOUR_MS,
        })
        .unwrap();
}

fn pet_health(conn: &Connection, group: &Group) -> i32 {
    SqlitePetRepository::new(conn)
        .get_pet(group.id)
        .unwrap()
        .unwrap()
        .health()
}

fn missed_events(conn: &Connection, task: &Task) -> Vec<Event> {
    SqliteEventLog::new(conn)
        .list_task_events(task.id, EventKind::TaskMissed)
        .unwrap()
}
