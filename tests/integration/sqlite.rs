//! Persistence integration tests with the SQLite store.

use serde_json::json;
use slurmsync::testing::fixtures;
use slurmsync::{EntityKind, Identity, RecordStore, SqliteStore, Supervisor};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_changed_field_is_patched_in_place() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slurm.db");
    let source = Arc::new(fixtures::cluster(2, 2));
    let store = Arc::new(SqliteStore::new(&path, "test").await.unwrap());

    let supervisor = Supervisor::new(Arc::clone(&source), Arc::clone(&store));
    let reports = supervisor.run_once().await.unwrap();
    assert_eq!(reports.iter().map(|r| r.created).sum::<usize>(), 5);

    source.set_attribute(
        EntityKind::Partition,
        &Identity::name("debug"),
        "state",
        json!("DOWN"),
    );
    let reports = supervisor.run_once().await.unwrap();
    assert_eq!(reports.iter().map(|r| r.updated).sum::<usize>(), 1);
    assert_eq!(reports.iter().map(|r| r.unchanged).sum::<usize>(), 4);

    let partition = store
        .get_record(EntityKind::Partition, &Identity::name("debug"))
        .await
        .unwrap();
    assert_eq!(partition.get("state"), Some(&json!("DOWN")));
    assert_eq!(partition.get("nodes"), Some(&json!("n[1-4]")));
    assert_eq!(partition.get("priorities").unwrap()["priority_tier"], json!(1));

    store.close().await;
}

#[tokio::test]
async fn test_fields_reported_after_insert_are_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slurm.db");
    let source = Arc::new(fixtures::cluster(0, 0));
    let mut node = fixtures::node("n1", "IDLE");
    node.remove("alloc_cpus");
    node.remove("alloc_mem");
    source.insert(EntityKind::Node, "n1", node);
    let mut job = fixtures::job(5, "PENDING");
    job.remove("name");
    source.insert(EntityKind::Job, 5, job);
    let store = Arc::new(SqliteStore::new(&path, "test").await.unwrap());

    let supervisor = Supervisor::new(Arc::clone(&source), Arc::clone(&store));
    supervisor.run_once().await.unwrap();
    let stored = store
        .get_record(EntityKind::Node, &Identity::name("n1"))
        .await
        .unwrap();
    assert_eq!(stored.get("alloc"), Some(&json!({})));

    source.set_attribute(EntityKind::Node, &Identity::name("n1"), "alloc_cpus", json!(8));
    source.set_attribute(EntityKind::Job, &Identity::number(5), "name", json!("train"));
    supervisor.run_once().await.unwrap();

    let node = store
        .get_record(EntityKind::Node, &Identity::name("n1"))
        .await
        .unwrap();
    assert_eq!(node.get("alloc"), Some(&json!({"alloc_cpus": 8})));
    assert_eq!(node.get("state"), Some(&json!("IDLE")));
    let job = store
        .get_record(EntityKind::Job, &Identity::number(5))
        .await
        .unwrap();
    assert_eq!(job.get("name"), Some(&json!("train")));

    let reports = supervisor.run_once().await.unwrap();
    assert!(reports.iter().all(|r| r.writes() == 0));

    store.close().await;
}

#[tokio::test]
async fn test_restart_resumes_from_stored_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slurm.db");
    let source = Arc::new(fixtures::cluster(3, 4));

    {
        let store = Arc::new(SqliteStore::new(&path, "prod").await.unwrap());
        Supervisor::new(Arc::clone(&source), Arc::clone(&store))
            .run_once()
            .await
            .unwrap();
        store.close().await;
    }

    let store = Arc::new(SqliteStore::new(&path, "prod").await.unwrap());
    assert_eq!(
        store.list_identities(EntityKind::Job).await.unwrap().len(),
        4
    );

    let reports = Supervisor::new(Arc::clone(&source), Arc::clone(&store))
        .run_once()
        .await
        .unwrap();
    for report in &reports {
        assert_eq!(report.created, 0, "{}", report);
        assert_eq!(report.updated, 0, "{}", report);
        assert_eq!(report.unchanged, report.polled, "{}", report);
    }

    store.close().await;
}

#[tokio::test]
async fn test_keyspaces_mirror_independently() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slurm.db");

    let store_a = Arc::new(SqliteStore::new(&path, "a").await.unwrap());
    Supervisor::new(Arc::new(fixtures::cluster(2, 0)), Arc::clone(&store_a))
        .run_once()
        .await
        .unwrap();

    let store_b = Arc::new(SqliteStore::new(&path, "b").await.unwrap());
    assert!(store_b
        .list_identities(EntityKind::Node)
        .await
        .unwrap()
        .is_empty());

    let reports = Supervisor::new(Arc::new(fixtures::cluster(1, 0)), Arc::clone(&store_b))
        .run_once()
        .await
        .unwrap();
    assert_eq!(reports[0].created, 1);
    assert_eq!(
        store_a.list_identities(EntityKind::Node).await.unwrap().len(),
        2
    );

    store_a.close().await;
    store_b.close().await;
}
