// src/pipeline/service.rs
//! Background telemetry service
//!
//! One task owns every piece of pipeline state: consent, rate window, queue,
//! retry pacing and the heartbeat. The host talks to it through a command
//! channel, so nothing here is ever shared or locked.
//!
//! # Event loop
//!
//! ```text
//! loop {
//!     dispatch front record if allowed
//!     signal exit-complete once drained
//!     select! {
//!         in-flight request completes → classify, maybe persist
//!         command arrives             → admit / consent / exit / query
//!         cooldown or backoff expires → re-evaluate
//!         heartbeat fires             → quit event
//!     }
//! }
//! ```
//!
//! The single in-flight request lives outside the `select!` so that the
//! other branches winning never cancels it.

use crate::admission::consent::{ConsentGate, ConsentStore};
use crate::admission::rate_limiter::RateLimiter;
use crate::delivery::heartbeat::QuitHeartbeat;
use crate::delivery::request::Endpoint;
use crate::delivery::retry::RetryState;
use crate::delivery::scheduler::{DeliveryOutcome, DeliveryScheduler, DeliveryState, Followup};
use crate::delivery::transport::{Transport, TransportError, TransportResponse};
use crate::observability::{metric_names, reject_reasons};
use crate::recording::event::{EventRecord, Properties, SessionContext};
use crate::recording::event_queue::{EventQueue, QueueStats};
use crate::recording::storage::SnapshotStore;
use crate::utils::config::{EventConfig, TelemetryConfig};
use crate::utils::errors::Result;
use futures::future::BoxFuture;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type InFlight = BoxFuture<'static, std::result::Result<TransportResponse, TransportError>>;

/// Requests from the host handle
#[derive(Debug)]
pub(crate) enum Command {
    AddEvent {
        name: String,
        properties: Option<Properties>,
    },
    Approve,
    Deny,
    Exit,
    SaveQueue(oneshot::Sender<Result<usize>>),
    Stats(oneshot::Sender<PipelineStats>),
    ShouldPromptUser(oneshot::Sender<bool>),
    IsCollectionEnabled(oneshot::Sender<bool>),
    PlayerId(oneshot::Sender<u64>),
}

/// Point-in-time view of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub state: DeliveryState,
    pub queue: QueueStats,
    pub current_backoff: Duration,
    pub admitted: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub transient_failures: u64,
    pub persisted: u64,
    pub restored: u64,
}

impl PipelineStats {
    pub fn queue_len(&self) -> usize {
        self.queue.current_size
    }
}

#[derive(Debug, Default)]
struct AdmissionCounters {
    admitted: u64,
    rejected: u64,
    persisted: u64,
    restored: u64,
}

/// What woke the event loop
enum Wake {
    Completed(std::result::Result<TransportResponse, TransportError>),
    Command(Option<Command>),
    Paced,
    Heartbeat,
}

/// The task that owns the pipeline
pub struct TelemetryService {
    events: EventConfig,
    max_name_len: usize,
    consent: ConsentGate,
    limiter: RateLimiter,
    scheduler: DeliveryScheduler,
    heartbeat: QuitHeartbeat,
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    snapshots: SnapshotStore,
    session: SessionContext,
    commands: mpsc::UnboundedReceiver<Command>,
    exit_tx: watch::Sender<bool>,
    exit_requested: bool,
    exit_signaled: bool,
    counters: AdmissionCounters,
}

impl TelemetryService {
    pub(crate) async fn new(
        config: &TelemetryConfig,
        transport: Arc<dyn Transport>,
        consent_store: Arc<dyn ConsentStore>,
        commands: mpsc::UnboundedReceiver<Command>,
        exit_tx: watch::Sender<bool>,
    ) -> Self {
        let consent =
            ConsentGate::initialize(consent_store, config.consent.required, config.has_credentials()).await;

        Self {
            events: config.events.clone(),
            max_name_len: config.limits.max_name_len,
            consent,
            limiter: RateLimiter::from_config(&config.limits),
            scheduler: DeliveryScheduler::new(RetryState::from_config(&config.delivery)),
            heartbeat: QuitHeartbeat::from_config(&config.heartbeat),
            endpoint: Endpoint::from_config(&config.server),
            transport,
            snapshots: SnapshotStore::from_config(&config.persistence, &config.limits),
            session: SessionContext::detect(config.events.exported_build),
            commands,
            exit_tx,
            exit_requested: false,
            exit_signaled: false,
            counters: AdmissionCounters::default(),
        }
    }

    /// Run until every handle is gone and the queue has drained
    pub async fn run(mut self) {
        self.on_start().await;

        let mut in_flight: Option<InFlight> = None;
        let mut commands_open = true;

        loop {
            self.dispatch_next(&mut in_flight);

            if self.scheduler.poll_drained() {
                self.signal_exit_complete();
            }

            if !commands_open && self.exit_signaled && in_flight.is_none() {
                break;
            }

            let pace_deadline = self.scheduler.next_wakeup();
            let heartbeat_deadline = self.heartbeat.deadline();

            let wake = tokio::select! {
                result = await_in_flight(&mut in_flight) => Wake::Completed(result),
                command = self.commands.recv(), if commands_open => Wake::Command(command),
                _ = sleep_until_opt(pace_deadline) => Wake::Paced,
                _ = sleep_until_opt(heartbeat_deadline) => Wake::Heartbeat,
            };

            match wake {
                Wake::Completed(result) => {
                    in_flight = None;
                    self.complete_delivery(result).await;
                }
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Command(None) => {
                    debug!("All telemetry handles dropped");
                    commands_open = false;
                    self.handle_exit();
                }
                Wake::Paced => {}
                Wake::Heartbeat => {
                    if self.heartbeat.fire(Instant::now()) {
                        debug!("Quit heartbeat fired, next in {:?}", self.heartbeat.interval());
                        let name = self.events.quit_event_name.clone();
                        self.add_event(name, None);
                    }
                }
            }
        }

        info!("Telemetry service stopped");
    }

    /// Restore the previous session's snapshot and record the launch
    async fn on_start(&mut self) {
        match self.snapshots.take().await {
            Ok(Some(records)) => {
                info!("Restored {} events from previous session", records.len());
                self.counters.restored += records.len() as u64;
                counter!(metric_names::EVENTS_RESTORED).increment(records.len() as u64);
                for record in records {
                    self.scheduler.enqueue(record);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Discarding unreadable queue snapshot: {}", e),
        }

        if self.events.auto_add_event_on_launch {
            let name = self.events.launch_event_name.clone();
            self.add_event(name, None);
        }

        if self.events.auto_add_event_on_quit {
            self.heartbeat.start(Instant::now());
        }

        info!(
            "Telemetry started for player {} (collection {})",
            self.consent.player_id(),
            if self.consent.is_collection_enabled() { "enabled" } else { "disabled" }
        );
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddEvent { name, properties } => self.add_event(name, properties),
            Command::Approve => self.consent.approve().await,
            Command::Deny => self.consent.deny().await,
            Command::Exit => self.handle_exit(),
            Command::SaveQueue(reply) => {
                let result = self.save_queue().await;
                let _ = reply.send(result);
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::ShouldPromptUser(reply) => {
                let _ = reply.send(self.consent.should_prompt_user());
            }
            Command::IsCollectionEnabled(reply) => {
                let _ = reply.send(self.consent.is_collection_enabled());
            }
            Command::PlayerId(reply) => {
                let _ = reply.send(self.consent.player_id());
            }
        }
    }

    /// Admission path; every rejection is a silent drop
    fn add_event(&mut self, name: String, properties: Option<Properties>) {
        if !self.consent.is_collection_enabled() {
            debug!("Collection disabled, dropping event '{}'", name);
            self.reject(reject_reasons::DISABLED);
            return;
        }

        if name.chars().count() > self.max_name_len {
            error!(
                "Event name '{}' is longer than {} characters, dropping it",
                name, self.max_name_len
            );
            self.reject(reject_reasons::NAME_TOO_LONG);
            return;
        }

        if !self.limiter.try_admit_at(Instant::now()) {
            self.reject(reject_reasons::RATE_LIMITED);
            return;
        }

        let record = EventRecord::new(name, self.consent.player_id(), properties, &self.session);
        debug!("Queued event '{}'", record.name);
        self.scheduler.enqueue(record);
        self.counters.admitted += 1;
        counter!(metric_names::EVENTS_ADMITTED).increment(1);
    }

    fn reject(&mut self, reason: &'static str) {
        self.counters.rejected += 1;
        counter!(metric_names::EVENTS_REJECTED, "reason" => reason).increment(1);
    }

    /// Stop the heartbeat and flush as fast as possible
    fn handle_exit(&mut self) {
        if self.exit_requested {
            return;
        }
        self.exit_requested = true;
        info!("Exit requested, draining telemetry queue");

        self.heartbeat.stop();
        self.scheduler.begin_drain();

        if self.events.auto_add_event_on_quit {
            let name = self.events.quit_event_name.clone();
            self.add_event(name, None);
        }
    }

    fn signal_exit_complete(&mut self) {
        self.exit_signaled = true;
        self.exit_tx.send_replace(true);
        info!("Telemetry drained, safe to exit");
    }

    /// Start the next send if the scheduler allows one
    fn dispatch_next(&mut self, in_flight: &mut Option<InFlight>) {
        while in_flight.is_none() {
            let now = Instant::now();
            let Some(record) = self.scheduler.poll_dispatch(now) else {
                return;
            };

            match self.endpoint.build(&record) {
                Ok(request) => *in_flight = Some(self.transport.send(request)),
                Err(e) => {
                    counter!(metric_names::EVENTS_DROPPED).increment(1);
                    self.scheduler.on_outcome(DeliveryOutcome::Unencodable(e.to_string()), now);
                }
            }
        }
    }

    async fn complete_delivery(&mut self, result: std::result::Result<TransportResponse, TransportError>) {
        let outcome = DeliveryOutcome::from_result(result);
        match &outcome {
            DeliveryOutcome::Delivered => counter!(metric_names::EVENTS_DELIVERED).increment(1),
            DeliveryOutcome::Rejected(_) | DeliveryOutcome::Unencodable(_) => {
                counter!(metric_names::EVENTS_DROPPED).increment(1)
            }
            DeliveryOutcome::Transient(_) => counter!(metric_names::DELIVERY_FAILURES).increment(1),
        }

        if let Followup::Persist(pending) = self.scheduler.on_outcome(outcome, Instant::now()) {
            self.persist(pending).await;
        }
    }

    /// Write records that could not be delivered before exit
    ///
    /// Events admitted after an earlier drain failure join that snapshot
    /// instead of replacing it.
    async fn persist(&mut self, pending: EventQueue) {
        let total = pending.len();
        match self.snapshots.append(pending).await {
            Ok(written) => {
                let added = total.min(written) as u64;
                self.counters.persisted += added;
                counter!(metric_names::EVENTS_PERSISTED).increment(added);
            }
            Err(e) => error!("Failed to persist {} undelivered events: {}", total, e),
        }
    }

    /// Snapshot the queue without clearing it
    async fn save_queue(&mut self) -> Result<usize> {
        let mut copy = self.scheduler.queue().clone();
        let written = self.snapshots.save(&mut copy).await?;
        self.counters.persisted += written as u64;
        counter!(metric_names::EVENTS_PERSISTED).increment(written as u64);
        Ok(written)
    }

    fn stats(&self) -> PipelineStats {
        let delivery = self.scheduler.stats();
        PipelineStats {
            state: self.scheduler.state(),
            queue: self.scheduler.queue().stats(),
            current_backoff: self.scheduler.current_backoff(),
            admitted: self.counters.admitted,
            rejected: self.counters.rejected,
            delivered: delivery.delivered,
            dropped: delivery.rejected + delivery.unencodable,
            transient_failures: delivery.transient_failures,
            persisted: self.counters.persisted,
            restored: self.counters.restored,
        }
    }
}

async fn await_in_flight(in_flight: &mut Option<InFlight>) -> std::result::Result<TransportResponse, TransportError> {
    match in_flight.as_mut() {
        Some(request) => request.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
