//! Startup and shutdown integration tests.

use crate::common::{wait_for_field, SlowSource};
use serde_json::json;
use slurmsync::testing::{fixtures, InstrumentedStore};
use slurmsync::{
    CollectorError, CollectorState, EntityKind, Identity, InMemorySource, InMemoryStore,
    RecordStore, Supervisor,
};
use std::sync::Arc;
use std::time::Duration;

const LONG: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_shutdown_waits_for_cycle_in_progress() {
    let cluster = InMemorySource::new();
    cluster.insert(EntityKind::Node, "n1", fixtures::node("n1", "IDLE"));
    let source = Arc::new(SlowSource::new(cluster, Duration::from_millis(200)));
    let fetch_started = source.fetch_started();
    let store = Arc::new(InMemoryStore::new());

    let supervisor = Supervisor::new(Arc::clone(&source), Arc::clone(&store))
        .with_interval(EntityKind::Node, LONG)
        .with_interval(EntityKind::Partition, LONG)
        .with_interval(EntityKind::Job, LONG);
    let handle = supervisor.start().await.unwrap();

    // the first cycle starts immediately
    tokio::time::timeout(Duration::from_secs(5), fetch_started.notified())
        .await
        .expect("no fetch started");

    handle.shutdown().await.unwrap();

    assert_eq!(source.fetches_done(), 1);
    assert!(store
        .get_record(EntityKind::Node, &Identity::name("n1"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_handles_report_stopped_after_shutdown() {
    let source = Arc::new(fixtures::cluster(1, 1));
    let store = Arc::new(InMemoryStore::new());

    let handle = Supervisor::new(source, store)
        .with_interval(EntityKind::Node, LONG)
        .with_interval(EntityKind::Partition, LONG)
        .with_interval(EntityKind::Job, LONG)
        .start()
        .await
        .unwrap();

    let node = handle.handle(EntityKind::Node).unwrap().clone();
    assert!(node.is_running().await);

    handle.shutdown().await.unwrap();
    assert_eq!(node.state().await, CollectorState::Stopped);
    assert!(matches!(
        node.trigger().await,
        Err(CollectorError::ChannelError(_))
    ));
}

#[tokio::test]
async fn test_running_collectors_pick_up_changes() {
    let source = Arc::new(fixtures::cluster(2, 0));
    let store = Arc::new(InMemoryStore::new());

    let handle = Supervisor::new(Arc::clone(&source), Arc::clone(&store))
        .with_interval(EntityKind::Node, Duration::from_millis(20))
        .with_interval(EntityKind::Partition, LONG)
        .with_interval(EntityKind::Job, Duration::from_millis(20))
        .start()
        .await
        .unwrap();

    wait_for_field(
        store.as_ref(),
        EntityKind::Node,
        &Identity::name("n2"),
        "state",
        &json!("IDLE"),
        Duration::from_secs(5),
    )
    .await;

    source.set_attribute(EntityKind::Node, &Identity::name("n2"), "state", json!("DRAIN"));
    source.insert(EntityKind::Job, 77, fixtures::job(77, "RUNNING"));

    wait_for_field(
        store.as_ref(),
        EntityKind::Node,
        &Identity::name("n2"),
        "state",
        &json!("DRAIN"),
        Duration::from_secs(5),
    )
    .await;
    wait_for_field(
        store.as_ref(),
        EntityKind::Job,
        &Identity::number(77),
        "job_state",
        &json!("RUNNING"),
        Duration::from_secs(5),
    )
    .await;

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_resource_manager_is_fatal_at_startup() {
    let source = Arc::new(fixtures::cluster(2, 2));
    source.set_unavailable(true);
    let store = Arc::new(InstrumentedStore::new(InMemoryStore::new()));

    let result = Supervisor::new(Arc::clone(&source), Arc::clone(&store))
        .start()
        .await;

    assert!(matches!(
        result,
        Err(CollectorError::Connection {
            kind: EntityKind::Node,
            ..
        })
    ));
    assert_eq!(store.insert_count(), 0);
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test]
async fn test_unreadable_store_is_fatal_at_startup() {
    let source = Arc::new(InMemorySource::new());
    let store = Arc::new(InstrumentedStore::new(InMemoryStore::new()));
    store.set_fail_reads(true);

    let result = Supervisor::new(source, Arc::clone(&store)).run_once().await;
    assert!(matches!(result, Err(CollectorError::Connection { .. })));
}
