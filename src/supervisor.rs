//! Collector supervisor.
//!
//! Starts one collector per entity kind against a shared source and store,
//! and stops them together.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};

use crate::collector::{Collector, CollectorError, CollectorHandle, CycleReport};
use crate::core::types::EntityKind;
use crate::events::EventBus;
use crate::source::ClusterSource;
use crate::storage::RecordStore;

/// Default node poll interval.
pub const DEFAULT_NODE_INTERVAL: Duration = Duration::from_secs(10);
/// Default partition poll interval.
pub const DEFAULT_PARTITION_INTERVAL: Duration = Duration::from_secs(10);
/// Default job poll interval.
pub const DEFAULT_JOB_INTERVAL: Duration = Duration::from_secs(1);

/// Runs the node, partition, and job collectors.
pub struct Supervisor<C: ClusterSource + ?Sized, S: RecordStore + ?Sized> {
    source: Arc<C>,
    store: Arc<S>,
    event_bus: Arc<EventBus>,
    intervals: BTreeMap<EntityKind, Duration>,
    verbose: bool,
}

impl<C, S> Supervisor<C, S>
where
    C: ClusterSource + ?Sized + 'static,
    S: RecordStore + ?Sized + 'static,
{
    /// Create a supervisor with the default intervals.
    pub fn new(source: Arc<C>, store: Arc<S>) -> Self {
        let intervals = BTreeMap::from([
            (EntityKind::Node, DEFAULT_NODE_INTERVAL),
            (EntityKind::Partition, DEFAULT_PARTITION_INTERVAL),
            (EntityKind::Job, DEFAULT_JOB_INTERVAL),
        ]);
        Self {
            source,
            store,
            event_bus: Arc::new(EventBus::new()),
            intervals,
            verbose: false,
        }
    }

    /// Set the poll interval for one kind.
    pub fn with_interval(mut self, kind: EntityKind, interval: Duration) -> Self {
        self.intervals.insert(kind, interval);
        self
    }

    /// Set the event bus shared by all collectors.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Log per-field changes at info level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Poll interval for a kind.
    pub fn interval(&self, kind: EntityKind) -> Duration {
        self.intervals
            .get(&kind)
            .copied()
            .unwrap_or(crate::collector::DEFAULT_INTERVAL)
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    fn collector(&self, kind: EntityKind) -> Collector<C, S> {
        Collector::new(kind, Arc::clone(&self.source), Arc::clone(&self.store))
            .with_interval(self.interval(kind))
            .with_event_bus(Arc::clone(&self.event_bus))
            .with_verbose(self.verbose)
    }

    /// Bootstrap a collector for every kind.
    ///
    /// Fails on the first kind whose collaborators cannot be reached; no
    /// collector has been started at that point.
    async fn bootstrap_all(&self) -> Result<Vec<Collector<C, S>>, CollectorError> {
        let mut collectors = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let mut collector = self.collector(kind);
            collector.bootstrap().await?;
            collectors.push(collector);
        }
        Ok(collectors)
    }

    /// Bootstrap every collector, then start them all.
    pub async fn start(self) -> Result<SupervisorHandle, CollectorError> {
        let collectors = self.bootstrap_all().await?;

        let mut handles = BTreeMap::new();
        let mut tasks = Vec::with_capacity(collectors.len());
        for collector in collectors {
            let kind = collector.kind();
            tracing::info!(kind = %kind, interval_ms = self.interval(kind).as_millis() as u64, "Starting collector");
            let (handle, task) = collector.start();
            handles.insert(kind, handle);
            tasks.push(task);
        }

        Ok(SupervisorHandle { handles, tasks })
    }

    /// Bootstrap every collector and run exactly one cycle per kind.
    pub async fn run_once(&self) -> Result<Vec<CycleReport>, CollectorError> {
        let collectors = self.bootstrap_all().await?;
        let mut reports = Vec::with_capacity(collectors.len());
        for mut collector in collectors {
            reports.push(collector.run_cycle().await);
        }
        Ok(reports)
    }
}

/// Handle for the running collectors.
pub struct SupervisorHandle {
    handles: BTreeMap<EntityKind, CollectorHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Handle of one collector.
    pub fn handle(&self, kind: EntityKind) -> Option<&CollectorHandle> {
        self.handles.get(&kind)
    }

    /// Handles of every collector.
    pub fn handles(&self) -> impl Iterator<Item = &CollectorHandle> {
        self.handles.values()
    }

    /// Stop every collector and wait for their loops to exit.
    ///
    /// Each collector finishes its current cycle first. Shutdown is sent to
    /// all collectors at once, so a long job cycle does not delay the others.
    pub async fn shutdown(self) -> Result<(), CollectorError> {
        let mut pending = JoinSet::new();
        for handle in self.handles.into_values() {
            pending.spawn(async move { handle.shutdown().await });
        }

        let mut first_error = None;
        while let Some(result) = pending.join_next().await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => Err(CollectorError::ChannelError(e.to_string())),
            };
            if let Err(e) = outcome {
                tracing::warn!(error = %e, "Collector did not acknowledge shutdown");
                first_error.get_or_insert(e);
            }
        }

        Self::join_tasks(self.tasks).await;
        first_error.map_or(Ok(()), Err)
    }

    async fn join_tasks(tasks: Vec<JoinHandle<()>>) {
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Collector task panicked");
            }
        }
    }
}
