use std::time::Duration;

use fl_participant::orchestrator::locks::ProjectLocks;
use fl_participant::worker::WorkerDirectory;

#[tokio::test]
async fn same_project_operations_are_serialized() {
    let locks = ProjectLocks::default();
    let guard = locks.acquire("p1").await;
    assert_eq!(guard.project_id(), "p1");

    let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire("p1")).await;
    assert!(blocked.is_err(), "second holder must wait");

    drop(guard);
    let reacquired = tokio::time::timeout(Duration::from_secs(1), locks.acquire("p1")).await;
    assert!(reacquired.is_ok());
}

#[tokio::test]
async fn different_projects_proceed_in_parallel() {
    let locks = ProjectLocks::default();
    let _p1 = locks.acquire("p1").await;
    let p2 = tokio::time::timeout(Duration::from_millis(200), locks.acquire("p2")).await;
    assert!(p2.is_ok());
    assert_eq!(locks.len(), 2);
}

#[tokio::test]
async fn released_locks_leave_no_table_entries() {
    let locks = ProjectLocks::default();
    for i in 0..100 {
        let guard = locks.acquire(&format!("ghost-{i}")).await;
        drop(guard);
    }
    assert!(locks.is_empty());
}

#[tokio::test]
async fn entry_survives_while_a_caller_is_queued() {
    let locks = ProjectLocks::default();
    let guard = locks.acquire("p1").await;

    let queued = {
        let locks = locks.clone();
        tokio::spawn(async move { locks.acquire("p1").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(guard);
    assert_eq!(locks.len(), 1, "queued caller still needs the entry");

    let second = tokio::time::timeout(Duration::from_secs(1), queued)
        .await
        .expect("queued caller acquires")
        .expect("task");
    assert_eq!(second.project_id(), "p1");
    drop(second);
    assert!(locks.is_empty());
}

#[test]
fn directory_tracks_registered_workers() {
    let directory = WorkerDirectory::default();
    assert!(directory.is_empty());
    assert!(directory.register("node/p1"));
    assert!(!directory.register("node/p1"));
    assert!(directory.contains("node/p1"));
    assert_eq!(directory.len(), 1);

    directory.remove("node/p1").expect("remove");
    assert!(directory.remove("node/p1").is_err());
    assert!(directory.is_empty());
}
