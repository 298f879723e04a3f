//! Reconciliation integration tests.
//!
//! Drive collectors against a scripted cluster and check exactly which
//! writes reach the store.

use serde_json::json;
use slurmsync::testing::{fixtures, InstrumentedStore, RecordingHandler};
use slurmsync::{
    Collector, EntityKind, Event, EventBus, Identity, InMemorySource, InMemoryStore,
    RecordStore, Supervisor,
};
use std::sync::Arc;

type Store = InstrumentedStore<InMemoryStore>;

fn store() -> Arc<Store> {
    Arc::new(InstrumentedStore::new(InMemoryStore::new()))
}

#[tokio::test]
async fn test_new_node_is_discovered_and_stored_once() {
    let source = Arc::new(InMemorySource::new());
    let store = store();
    let mut collector = Collector::new(EntityKind::Node, Arc::clone(&source), Arc::clone(&store));
    collector.bootstrap().await.unwrap();

    // empty cluster, empty store
    let report = collector.run_cycle().await;
    assert_eq!(report.polled, 0);
    assert_eq!(store.insert_count(), 0);

    source.insert(EntityKind::Node, "n1", fixtures::node("n1", "IDLE"));
    let report = collector.run_cycle().await;
    assert_eq!(report.created, 1);
    assert_eq!(store.inserts(), vec![(EntityKind::Node, Identity::name("n1"))]);

    let stored = store
        .get_record(EntityKind::Node, &Identity::name("n1"))
        .await
        .unwrap();
    assert_eq!(stored.get("name"), Some(&json!("n1")));
    assert_eq!(stored.get("state"), Some(&json!("IDLE")));
    assert_eq!(stored.get("os").unwrap()["arch"], json!("x86_64"));
    assert_eq!(stored.get("alloc").unwrap()["alloc_cpus"], json!(0));
}

#[tokio::test]
async fn test_unchanged_job_issues_no_writes() {
    let source = Arc::new(InMemorySource::new());
    source.insert(EntityKind::Job, 42, fixtures::job(42, "RUNNING"));
    let store = store();

    let mut collector = Collector::new(EntityKind::Job, Arc::clone(&source), Arc::clone(&store));
    collector.bootstrap().await.unwrap();
    collector.run_cycle().await;
    store.clear();

    for _ in 0..3 {
        let report = collector.run_cycle().await;
        assert_eq!(report.unchanged, 1);
    }
    assert_eq!(store.insert_count(), 0);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn test_empty_forms_do_not_count_as_changes() {
    let source = Arc::new(InMemorySource::new());
    source.insert(EntityKind::Job, 1, fixtures::job(1, "PENDING"));
    let store = store();

    let mut collector = Collector::new(EntityKind::Job, Arc::clone(&source), Arc::clone(&store));
    collector.run_cycle().await;

    // dependency flips between [] and null on the wire
    source.set_attribute(EntityKind::Job, &Identity::number(1), "dependency", json!(null));
    let report = collector.run_cycle().await;
    assert_eq!(report.unchanged, 1);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn test_changed_partition_gets_minimal_patch() {
    let source = Arc::new(InMemorySource::new());
    source.insert(EntityKind::Partition, "p1", fixtures::partition("p1", "UP"));
    let store = store();

    let mut collector =
        Collector::new(EntityKind::Partition, Arc::clone(&source), Arc::clone(&store));
    collector.bootstrap().await.unwrap();
    collector.run_cycle().await;

    source.set_attribute(EntityKind::Partition, &Identity::name("p1"), "state", json!("DOWN"));
    let report = collector.run_cycle().await;
    assert_eq!(report.updated, 1);

    let updates = store.updates();
    assert_eq!(updates.len(), 1);
    let (kind, identity, patch) = &updates[0];
    assert_eq!(*kind, EntityKind::Partition);
    assert_eq!(identity, &Identity::name("p1"));
    assert_eq!(serde_json::to_value(patch).unwrap(), json!({"state": "DOWN"}));

    let stored = store
        .get_record(EntityKind::Partition, &Identity::name("p1"))
        .await
        .unwrap();
    assert_eq!(stored.get("nodes"), Some(&json!("n[1-4]")));
}

#[tokio::test]
async fn test_fields_reported_after_insert_reach_the_store() {
    let source = Arc::new(InMemorySource::new());
    let mut node = fixtures::node("n1", "IDLE");
    node.remove("alloc_cpus");
    node.remove("alloc_mem");
    source.insert(EntityKind::Node, "n1", node);
    let mut job = fixtures::job(5, "PENDING");
    job.remove("name");
    source.insert(EntityKind::Job, 5, job);
    let store = store();

    let supervisor = Supervisor::new(Arc::clone(&source), Arc::clone(&store));
    supervisor.run_once().await.unwrap();

    source.set_attribute(EntityKind::Node, &Identity::name("n1"), "alloc_cpus", json!(8));
    source.set_attribute(EntityKind::Job, &Identity::number(5), "name", json!("train"));
    let reports = supervisor.run_once().await.unwrap();
    assert_eq!(reports.iter().map(|r| r.updated).sum::<usize>(), 2);

    let node = store
        .get_record(EntityKind::Node, &Identity::name("n1"))
        .await
        .unwrap();
    assert_eq!(node.get("alloc"), Some(&json!({"alloc_cpus": 8})));
    let job = store
        .get_record(EntityKind::Job, &Identity::number(5))
        .await
        .unwrap();
    assert_eq!(job.get("name"), Some(&json!("train")));

    let reports = supervisor.run_once().await.unwrap();
    assert!(reports.iter().all(|r| r.writes() == 0));
}

#[tokio::test]
async fn test_fetch_failure_does_not_block_other_identities() {
    let source = Arc::new(InMemorySource::new());
    for name in ["n1", "n2", "n9"] {
        source.insert(EntityKind::Node, name, fixtures::node(name, "IDLE"));
    }
    source.set_fetch_failure(EntityKind::Node, "n9", true);
    let store = store();

    let handler = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;

    let mut collector = Collector::new(EntityKind::Node, Arc::clone(&source), Arc::clone(&store))
        .with_event_bus(bus);
    collector.bootstrap().await.unwrap();
    let report = collector.run_cycle().await;

    assert_eq!(report.created, 2);
    assert_eq!(report.fetch_failures, 1);
    assert!(store
        .get_record(EntityKind::Node, &Identity::name("n9"))
        .await
        .is_err());
    assert_eq!(handler.fetch_failures().await, vec![Identity::name("n9")]);

    // n9 is retried as a create once its lookup works again
    source.set_fetch_failure(EntityKind::Node, "n9", false);
    let report = collector.run_cycle().await;
    assert_eq!(report.created, 1);
    assert_eq!(report.unchanged, 2);
}

#[tokio::test]
async fn test_records_outlive_their_entities() {
    let source = Arc::new(fixtures::cluster(0, 3));
    let store = store();
    let mut collector = Collector::new(EntityKind::Job, Arc::clone(&source), Arc::clone(&store));
    collector.run_cycle().await;

    source.remove(EntityKind::Job, &Identity::number(2));
    collector.run_cycle().await;
    collector.run_cycle().await;

    let stored = store.list_identities(EntityKind::Job).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(collector.known().len(), 2);
}

#[tokio::test]
async fn test_supervisor_mirrors_snapshot() {
    let source = Arc::new(
        InMemorySource::from_snapshot_str(
            r#"
nodes:
  - {name: c1, state: IDLE, cpus: 32, partitions: [batch]}
  - {name: c2, state: DOWN, cpus: 32, partitions: [batch], reason: "bad dimm"}
partitions:
  - {name: batch, state: UP, nodes: "c[1-2]", max_time: 1440}
jobs:
  - {job_id: 10, job_state: RUNNING, partition: batch, time_limit: 60}
  - {job_id: "11", job_state: PENDING, partition: batch, wckey: "*"}
"#,
        )
        .unwrap(),
    );
    let store = Arc::new(InMemoryStore::new());
    let handler = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;

    let supervisor = Supervisor::new(source, Arc::clone(&store)).with_event_bus(bus);
    let reports = supervisor.run_once().await.unwrap();
    assert_eq!(reports.iter().map(|r| r.created).sum::<usize>(), 5);
    assert_eq!(handler.created().await.len(), 5);

    let c2 = store
        .get_record(EntityKind::Node, &Identity::name("c2"))
        .await
        .unwrap();
    assert!(!c2.contains_key("reason"));

    let batch = store
        .get_record(EntityKind::Partition, &Identity::name("batch"))
        .await
        .unwrap();
    assert_eq!(batch.get("restrictions").unwrap()["max_time"], json!("1440"));

    let job = store
        .get_record(EntityKind::Job, &Identity::number(10))
        .await
        .unwrap();
    assert_eq!(job.get("timing").unwrap()["time_limit"], json!("60"));

    let job = store
        .get_record(EntityKind::Job, &Identity::number(11))
        .await
        .unwrap();
    assert_eq!(job.get("job_id"), Some(&json!(11)));
    assert_eq!(job.get("overflow"), Some(&json!({})));

    let reports = supervisor.run_once().await.unwrap();
    assert!(reports.iter().all(|r| r.writes() == 0 && !r.has_failures()));
    assert!(handler
        .events()
        .await
        .iter()
        .all(|e| !matches!(e, Event::WriteFailed { .. })));
}
