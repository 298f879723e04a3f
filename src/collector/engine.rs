//! Reconciliation loop for one entity kind.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use super::handle::{CollectorHandle, COMMAND_CHANNEL_BUFFER};
use super::types::{CollectorCommand, CollectorError, CollectorState, CycleReport, Outcome};
use crate::core::record::CanonicalRecord;
use crate::core::types::{EntityKind, Identity};
use crate::events::{Event, EventBus};
use crate::normalize::normalize;
use crate::source::ClusterSource;
use crate::storage::{RecordStore, StorageError};

/// Default pause between two cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Reconciliation loop for one entity kind.
///
/// Holds the set of identities it believes are already stored. The set is
/// seeded from the store by [`bootstrap`](Self::bootstrap) and replaced after
/// every cycle; it is never shared with other collectors.
pub struct Collector<C: ClusterSource + ?Sized, S: RecordStore + ?Sized> {
    kind: EntityKind,
    source: Arc<C>,
    store: Arc<S>,
    event_bus: Arc<EventBus>,
    interval: Duration,
    /// Log every changed field at info level instead of debug.
    verbose: bool,
    known: BTreeSet<Identity>,
}

impl<C, S> Collector<C, S>
where
    C: ClusterSource + ?Sized + 'static,
    S: RecordStore + ?Sized + 'static,
{
    /// Create a collector for one kind.
    pub fn new(kind: EntityKind, source: Arc<C>, store: Arc<S>) -> Self {
        Self {
            kind,
            source,
            store,
            event_bus: Arc::new(EventBus::new()),
            interval: DEFAULT_INTERVAL,
            verbose: false,
            known: BTreeSet::new(),
        }
    }

    /// Set the pause between cycles.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Log per-field changes at info level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Entity kind reconciled by this collector.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Identities currently believed to be stored.
    pub fn known(&self) -> &BTreeSet<Identity> {
        &self.known
    }

    /// Seed the known set from the store and check that the resource manager
    /// answers.
    ///
    /// Either collaborator failing here is fatal: the collector must not
    /// start looping.
    pub async fn bootstrap(&mut self) -> Result<(), CollectorError> {
        let kind = self.kind;
        self.known = self
            .store
            .list_identities(kind)
            .await
            .map_err(|e| CollectorError::Connection {
                kind,
                reason: format!("record store: {}", e),
            })?;

        self.source
            .list_identities(kind)
            .await
            .map_err(|e| CollectorError::Connection {
                kind,
                reason: format!("resource manager: {}", e),
            })?;

        tracing::info!(kind = %kind, known = self.known.len(), "Collector bootstrapped");
        Ok(())
    }

    /// Start the collector loop and return a handle for controlling it.
    ///
    /// The first cycle runs immediately. A collector started without
    /// [`bootstrap`](Self::bootstrap) treats every stored record as new on
    /// its first cycle and falls back to comparing it.
    pub fn start(self) -> (CollectorHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(CollectorState::Running));

        let handle = CollectorHandle {
            kind: self.kind,
            command_tx,
            state: Arc::clone(&state),
        };

        let task = tokio::spawn(async move {
            self.run(command_rx, state).await;
        });

        (handle, task)
    }

    /// Main collector loop.
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<CollectorCommand>,
        state: Arc<RwLock<CollectorState>>,
    ) {
        self.event_bus
            .emit(Event::collector_started(self.kind, self.known.len()))
            .await;

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                    // the pause is measured from the end of the cycle
                    interval.reset();
                }

                Some(command) = command_rx.recv() => {
                    match command {
                        CollectorCommand::Trigger { response } => {
                            let report = self.run_cycle().await;
                            interval.reset();
                            let _ = response.send(report);
                        }
                        CollectorCommand::Shutdown { response } => {
                            *state.write().await = CollectorState::Stopped;
                            tracing::info!(kind = %self.kind, "Collector stopped");
                            let _ = response.send(());
                            break;
                        }
                    }
                }
            }
        }

        self.event_bus.emit(Event::collector_stopped(self.kind)).await;
    }

    /// Run one reconciliation cycle.
    ///
    /// New identities are fetched and inserted, previously known identities
    /// are fetched and patched when they differ from the stored record. A
    /// failure for one identity never stops the rest of the cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(self.kind);

        let current = match self.source.list_identities(self.kind).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(kind = %self.kind, error = %e, "Failed to poll identities");
                report.poll_failed = true;
                return self.finish_cycle(report, started).await;
            }
        };
        report.polled = current.len();

        let mut failed_creates = BTreeSet::new();
        for identity in current.difference(&self.known) {
            let (outcome, stored) = self.create(identity).await;
            if !stored {
                failed_creates.insert(identity.clone());
            }
            report.record(outcome);
        }

        // Identities that vanished since the last poll are still visited
        // here; their fetch fails and they drop out of the known set below.
        for identity in &self.known {
            let outcome = match self.fetch_record(identity).await {
                Some(record) => self.reconcile(&record).await,
                None => Outcome::FetchFailed,
            };
            report.record(outcome);
        }

        self.known = current.difference(&failed_creates).cloned().collect();
        self.finish_cycle(report, started).await
    }

    async fn finish_cycle(&self, mut report: CycleReport, started: Instant) -> CycleReport {
        report.duration = started.elapsed();
        tracing::debug!(
            kind = %self.kind,
            polled = report.polled,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            fetch_failures = report.fetch_failures,
            write_failures = report.write_failures,
            duration_ms = report.duration.as_millis() as u64,
            "Cycle completed"
        );
        self.event_bus.emit(Event::cycle_completed(report.clone())).await;
        report
    }

    /// Fetch and normalize one identity.
    ///
    /// Failures are logged and reported as events; the caller only needs to
    /// know that the identity is skipped this cycle.
    async fn fetch_record(&self, identity: &Identity) -> Option<CanonicalRecord> {
        let result = match self.source.fetch(self.kind, identity).await {
            Ok(raw) => normalize(self.kind, &raw).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        }
        .and_then(|record| {
            if &record.identity == identity {
                Ok(record)
            } else {
                Err(format!("detail lookup returned {} {}", self.kind, record.identity))
            }
        });

        match result {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(kind = %self.kind, identity = %identity, error = %error, "Failed to fetch record");
                self.event_bus
                    .emit(Event::fetch_failed(self.kind, identity.clone(), error))
                    .await;
                None
            }
        }
    }

    /// Create phase for one newly seen identity.
    ///
    /// Returns the outcome and whether a record for the identity is now in
    /// the store.
    async fn create(&self, identity: &Identity) -> (Outcome, bool) {
        let Some(record) = self.fetch_record(identity).await else {
            return (Outcome::FetchFailed, false);
        };

        match self.store.insert_record(&record).await {
            Ok(()) => {
                self.report_created(&record).await;
                (Outcome::Created, true)
            }
            Err(StorageError::DuplicateKey(_)) => {
                tracing::debug!(kind = %self.kind, identity = %identity, "Record already stored, comparing instead");
                (self.reconcile(&record).await, true)
            }
            Err(e) => {
                self.report_write_failure(identity, "Failed to insert record", e)
                    .await;
                (Outcome::WriteFailed, false)
            }
        }
    }

    /// Update phase for one fetched record: compare with the stored form and
    /// write only the fields that differ.
    async fn reconcile(&self, record: &CanonicalRecord) -> Outcome {
        let identity = &record.identity;
        let stored = match self.store.get_record(self.kind, identity).await {
            Ok(stored) => stored,
            Err(StorageError::NotFound(_)) => {
                // known but missing from the store: put it back
                return match self.store.insert_record(record).await {
                    Ok(()) => {
                        self.report_created(record).await;
                        Outcome::Created
                    }
                    Err(e) => {
                        self.report_write_failure(identity, "Failed to re-insert record", e)
                            .await;
                        Outcome::WriteFailed
                    }
                };
            }
            Err(e) => {
                self.report_write_failure(identity, "Failed to read stored record", e)
                    .await;
                return Outcome::WriteFailed;
            }
        };

        let changes = record.changes_from(&stored);
        if changes.is_empty() {
            return Outcome::Unchanged;
        }

        if let Err(e) = self
            .store
            .update_record(self.kind, identity, &changes)
            .await
        {
            self.report_write_failure(identity, "Failed to update record", e)
                .await;
            return Outcome::WriteFailed;
        }

        tracing::info!(kind = %self.kind, identity = %identity, fields = changes.len(), "Updated record");
        for (field, value) in &changes {
            if self.verbose {
                tracing::info!(kind = %self.kind, identity = %identity, field = %field, value = %value, "Field changed");
            } else {
                tracing::debug!(kind = %self.kind, identity = %identity, field = %field, value = %value, "Field changed");
            }
        }
        self.event_bus
            .emit(Event::record_updated(self.kind, identity.clone(), changes))
            .await;
        Outcome::Updated
    }

    async fn report_created(&self, record: &CanonicalRecord) {
        tracing::info!(kind = %self.kind, identity = %record.identity, "Discovered new record");
        self.event_bus
            .emit(Event::record_created(self.kind, record.identity.clone()))
            .await;
    }

    async fn report_write_failure(&self, identity: &Identity, message: &str, error: StorageError) {
        tracing::warn!(kind = %self.kind, identity = %identity, error = %error, "{}", message);
        self.event_bus
            .emit(Event::write_failed(self.kind, identity.clone(), error.to_string()))
            .await;
    }
}
