// src/pipeline/handle.rs
//! Host-facing telemetry handle
//!
//! Every method that mutates the pipeline is fire-and-forget and returns
//! immediately; queries wait for the service to answer.

use crate::admission::consent::ConsentStore;
use crate::delivery::transport::Transport;
use crate::pipeline::service::{Command, PipelineStats, TelemetryService};
use crate::recording::event::Properties;
use crate::utils::config::TelemetryConfig;
use crate::utils::errors::{Result, TelemetryError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

/// Cloneable entry point into a running telemetry service
///
/// Dropping the last handle has the same effect as [`Telemetry::handle_exit`].
#[derive(Debug, Clone)]
pub struct Telemetry {
    commands: mpsc::UnboundedSender<Command>,
    exit: ExitSignal,
}

impl Telemetry {
    /// Validate `config` and spawn the service on the current tokio runtime
    pub fn start(
        config: TelemetryConfig,
        transport: Arc<dyn Transport>,
        consent_store: Box<dyn ConsentStore>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TelemetryError::ConfigError(format!("Telemetry needs a tokio runtime: {}", e)))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = watch::channel(false);

        let consent_store: Arc<dyn ConsentStore> = Arc::from(consent_store);
        runtime.spawn(async move {
            TelemetryService::new(&config, transport, consent_store, command_rx, exit_tx)
                .await
                .run()
                .await
        });

        Ok(Self {
            commands: command_tx,
            exit: ExitSignal { receiver: exit_rx },
        })
    }

    /// Queue an event; dropped silently if admission rejects it
    pub fn add_event(&self, name: impl Into<String>, properties: Option<Properties>) {
        self.send(Command::AddEvent {
            name: name.into(),
            properties,
        });
    }

    /// Start draining; completion is reported through [`Telemetry::wait_for_exit`]
    pub fn handle_exit(&self) {
        self.send(Command::Exit);
    }

    /// The player opted in
    pub fn approve(&self) {
        self.send(Command::Approve);
    }

    /// The player opted out
    pub fn deny(&self) {
        self.send(Command::Deny);
    }

    /// Whether the host should show its consent dialog
    pub async fn should_prompt_user(&self) -> Result<bool> {
        self.query(Command::ShouldPromptUser).await
    }

    pub async fn is_collection_enabled(&self) -> Result<bool> {
        self.query(Command::IsCollectionEnabled).await
    }

    pub async fn player_id(&self) -> Result<u64> {
        self.query(Command::PlayerId).await
    }

    pub async fn stats(&self) -> Result<PipelineStats> {
        self.query(Command::Stats).await
    }

    /// Write the pending queue to the snapshot file without clearing it
    ///
    /// For hosts that may be killed without an exit notification.
    pub async fn save_queue(&self) -> Result<usize> {
        self.query(Command::SaveQueue).await?
    }

    /// Resolve once draining has finished
    pub async fn wait_for_exit(&self) -> Result<()> {
        self.exit.wait().await
    }

    /// A signal that outlives this handle
    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Telemetry service stopped, ignoring command");
        }
    }

    async fn query<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .map_err(|_| TelemetryError::ServiceStopped)?;
        reply_rx.await.map_err(|_| TelemetryError::ServiceStopped)
    }
}

/// Fires once the queue has drained after exit
#[derive(Debug, Clone)]
pub struct ExitSignal {
    receiver: watch::Receiver<bool>,
}

impl ExitSignal {
    pub async fn wait(&self) -> Result<()> {
        let mut receiver = self.receiver.clone();
        receiver
            .wait_for(|done| *done)
            .await
            .map(|_| ())
            .map_err(|_| TelemetryError::ServiceStopped)
    }

    pub fn is_complete(&self) -> bool {
        *self.receiver.borrow()
    }
}
