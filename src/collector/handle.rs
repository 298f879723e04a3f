//! Collector handle for controlling a running collector.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::core::types::EntityKind;

use super::types::{CollectorCommand, CollectorError, CollectorState, CycleReport};

/// Buffer size for the command channel between a handle and its collector.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 8;

/// Handle for controlling a running collector.
#[derive(Clone)]
pub struct CollectorHandle {
    pub(crate) kind: EntityKind,
    pub(crate) command_tx: mpsc::Sender<CollectorCommand>,
    pub(crate) state: Arc<RwLock<CollectorState>>,
}

impl CollectorHandle {
    /// Send a command and wait for its response.
    async fn send_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> CollectorCommand,
        operation: &str,
    ) -> Result<T, CollectorError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                CollectorError::ChannelError(format!(
                    "failed to send {} command to {} collector",
                    operation, self.kind
                ))
            })?;

        response_rx.await.map_err(|_| {
            CollectorError::ChannelError(format!(
                "failed to receive {} response from {} collector",
                operation, self.kind
            ))
        })
    }

    /// Run a cycle immediately and return its report.
    ///
    /// If a cycle is in progress the trigger runs after it.
    pub async fn trigger(&self) -> Result<CycleReport, CollectorError> {
        self.send_command(|response| CollectorCommand::Trigger { response }, "trigger")
            .await
    }

    /// Stop the collector.
    ///
    /// Returns once the current cycle (if any) has finished.
    pub async fn shutdown(&self) -> Result<(), CollectorError> {
        self.send_command(|response| CollectorCommand::Shutdown { response }, "shutdown")
            .await
    }

    /// Entity kind the collector reconciles.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Get the current collector state.
    pub async fn state(&self) -> CollectorState {
        *self.state.read().await
    }

    /// Check if the collector is running.
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == CollectorState::Running
    }
}
