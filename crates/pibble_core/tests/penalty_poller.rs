use pibble_core::db::open_db;
use pibble_core::model::now_epoch_ms;
use pibble_core::repo::group_repo::{GroupRepository, SqliteGroupRepository};
use pibble_core::repo::pet_repo::{PetRepository, SqlitePetRepository};
use pibble_core::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use pibble_core::{Group, GroupMode, GroupRole, Membership, PenaltyPoller, Task, TaskType};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

fn seed_overdue_task(conn: &Connection, penalty: i32) -> Group {
    let group = Group::new("Night owls", GroupMode::Friend);
    let groups = SqliteGroupRepository::new(conn);
    groups.create_group(&group).unwrap();
    groups
        .add_member(&Membership {
            group_id: group.id,
            user_id: Uuid::new_v4(),
            role: GroupRole::Student,
            joined_at: 1,
        })
        .unwrap();
    let task = Task::new(group.id, "Reading", TaskType::Other, now_epoch_ms() - 1_000)
        .with_penalty(penalty);
    SqliteTaskRepository::new(conn).create_task(&task).unwrap();
    group
}

fn health(conn: &Connection, group: &Group) -> i32 {
    SqlitePetRepository::new(conn)
        .get_pet(group.id)
        .unwrap()
        .unwrap()
        .health()
}

#[test]
fn preset_stop_runs_exactly_one_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("once.db");
    let observer = open_db(&path).unwrap();
    let group = seed_overdue_task(&observer, 2);

    let mut poller = PenaltyPoller::new(open_db(&path).unwrap(), Duration::from_secs(60));
    let failures = poller.run_until(&AtomicBool::new(true));

    assert_eq!(failures, 0);
    assert_eq!(poller.ticks(), 1);
    assert_eq!(health(&observer, &group), 8);
}

#[test]
fn repeated_ticks_do_not_reapply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ticks.db");
    let observer = open_db(&path).unwrap();
    let group = seed_overdue_task(&observer, 3);

    let mut poller = PenaltyPoller::new(open_db(&path).unwrap(), Duration::from_secs(60));
    assert_eq!(poller.tick().unwrap().applied_events, 1);
    assert_eq!(poller.tick().unwrap().applied_events, 0);
    assert_eq!(health(&observer, &group), 7);
}

#[test]
fn stop_flag_ends_loop_during_sleep() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loop.db");
    let observer = open_db(&path).unwrap();
    let group = seed_overdue_task(&observer, 1);

    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let worker_path = path.clone();
    let handle = thread::spawn(move || {
        let mut poller =
            PenaltyPoller::new(open_db(&worker_path).unwrap(), Duration::from_secs(3600));
        let failures = poller.run_until(&worker_stop);
        (failures, poller.ticks())
    });

    thread::sleep(Duration::from_millis(300));
    stop.store(true, Ordering::Relaxed);
    let (failures, ticks) = handle.join().unwrap();

    assert_eq!(failures, 0);
    assert_eq!(ticks, 1);
    assert_eq!(health(&observer, &group), 9);
}
