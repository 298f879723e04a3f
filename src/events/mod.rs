//! Collector lifecycle events and event handling.
//!
//! Collectors emit an [`Event`] for every record they create or update, for
//! every per-identity failure, and once per completed cycle. Handlers
//! registered on an [`EventBus`] receive them in emission order.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::collector::CycleReport;
use crate::core::record::Fields;
use crate::core::types::{EntityKind, Identity};

/// Lifecycle events emitted by collectors.
#[derive(Debug, Clone)]
pub enum Event {
    /// A collector finished bootstrapping and is about to start cycling.
    CollectorStarted {
        kind: EntityKind,
        /// Number of identities already in the store.
        known: usize,
        timestamp: Instant,
    },

    /// A record was inserted for a newly discovered identity.
    RecordCreated {
        kind: EntityKind,
        identity: Identity,
        timestamp: Instant,
    },

    /// An existing record was patched.
    RecordUpdated {
        kind: EntityKind,
        identity: Identity,
        /// The fields written, with their new values.
        changes: Fields,
        timestamp: Instant,
    },

    /// Fetching or normalizing one identity failed; it is skipped this cycle.
    FetchFailed {
        kind: EntityKind,
        identity: Identity,
        error: String,
        timestamp: Instant,
    },

    /// Writing one record failed.
    WriteFailed {
        kind: EntityKind,
        identity: Identity,
        error: String,
        timestamp: Instant,
    },

    /// A reconciliation cycle finished.
    CycleCompleted {
        report: CycleReport,
        timestamp: Instant,
    },

    /// A collector loop exited.
    CollectorStopped {
        kind: EntityKind,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::CollectorStarted { timestamp, .. }
            | Event::RecordCreated { timestamp, .. }
            | Event::RecordUpdated { timestamp, .. }
            | Event::FetchFailed { timestamp, .. }
            | Event::WriteFailed { timestamp, .. }
            | Event::CycleCompleted { timestamp, .. }
            | Event::CollectorStopped { timestamp, .. } => *timestamp,
        }
    }

    /// Entity kind the event concerns.
    pub fn kind(&self) -> EntityKind {
        match self {
            Event::CollectorStarted { kind, .. }
            | Event::RecordCreated { kind, .. }
            | Event::RecordUpdated { kind, .. }
            | Event::FetchFailed { kind, .. }
            | Event::WriteFailed { kind, .. }
            | Event::CollectorStopped { kind, .. } => *kind,
            Event::CycleCompleted { report, .. } => report.kind,
        }
    }

    /// Create a CollectorStarted event.
    pub fn collector_started(kind: EntityKind, known: usize) -> Self {
        Event::CollectorStarted {
            kind,
            known,
            timestamp: Instant::now(),
        }
    }

    /// Create a RecordCreated event.
    pub fn record_created(kind: EntityKind, identity: Identity) -> Self {
        Event::RecordCreated {
            kind,
            identity,
            timestamp: Instant::now(),
        }
    }

    /// Create a RecordUpdated event.
    pub fn record_updated(kind: EntityKind, identity: Identity, changes: Fields) -> Self {
        Event::RecordUpdated {
            kind,
            identity,
            changes,
            timestamp: Instant::now(),
        }
    }

    /// Create a FetchFailed event.
    pub fn fetch_failed(kind: EntityKind, identity: Identity, error: String) -> Self {
        Event::FetchFailed {
            kind,
            identity,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create a WriteFailed event.
    pub fn write_failed(kind: EntityKind, identity: Identity, error: String) -> Self {
        Event::WriteFailed {
            kind,
            identity,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create a CycleCompleted event.
    pub fn cycle_completed(report: CycleReport) -> Self {
        Event::CycleCompleted {
            report,
            timestamp: Instant::now(),
        }
    }

    /// Create a CollectorStopped event.
    pub fn collector_stopped(kind: EntityKind) -> Self {
        Event::CollectorStopped {
            kind,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving collector events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
