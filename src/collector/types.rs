//! Collector type definitions.
//!
//! This module contains error types, state enums, command types, and the
//! per-cycle report for collectors.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::types::EntityKind;

/// Errors that can occur in a collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// A collaborator could not be reached while bootstrapping.
    #[error("cannot bootstrap {kind} collector: {reason}")]
    Connection { kind: EntityKind, reason: String },

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// State of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Collector loop is running.
    Running,
    /// Collector loop has exited.
    Stopped,
}

/// Commands that can be sent to a collector.
pub(crate) enum CollectorCommand {
    /// Run a cycle now.
    Trigger {
        response: oneshot::Sender<CycleReport>,
    },
    /// Stop after the current cycle.
    Shutdown { response: oneshot::Sender<()> },
}

/// Outcome of reconciling one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Created,
    Updated,
    Unchanged,
    FetchFailed,
    WriteFailed,
}

/// Summary of one reconciliation cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Entity kind reconciled.
    pub kind: EntityKind,
    /// Wall-clock start of the cycle.
    pub started_at: DateTime<Utc>,
    /// Time spent in the cycle.
    pub duration: Duration,
    /// Identities reported by the resource manager.
    pub polled: usize,
    /// Records inserted.
    pub created: usize,
    /// Records patched.
    pub updated: usize,
    /// Records compared equal to their stored form.
    pub unchanged: usize,
    /// Identities whose detail could not be fetched or normalized.
    pub fetch_failures: usize,
    /// Identities whose record could not be read or written.
    pub write_failures: usize,
    /// The identity poll itself failed, so nothing was reconciled.
    pub poll_failed: bool,
}

impl CycleReport {
    /// Create an empty report starting now.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            polled: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            fetch_failures: 0,
            write_failures: 0,
            poll_failed: false,
        }
    }

    /// Number of writes issued successfully.
    pub fn writes(&self) -> usize {
        self.created + self.updated
    }

    /// Whether anything went wrong during the cycle.
    pub fn has_failures(&self) -> bool {
        self.poll_failed || self.fetch_failures > 0 || self.write_failures > 0
    }

    pub(crate) fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::FetchFailed => self.fetch_failures += 1,
            Outcome::WriteFailed => self.write_failures += 1,
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.poll_failed {
            return write!(f, "{}: poll failed ({:?})", self.kind, self.duration);
        }
        write!(
            f,
            "{}: polled {}, created {}, updated {}, unchanged {}, fetch failures {}, write failures {} ({:?})",
            self.kind,
            self.polled,
            self.created,
            self.updated,
            self.unchanged,
            self.fetch_failures,
            self.write_failures,
            self.duration
        )
    }
}
