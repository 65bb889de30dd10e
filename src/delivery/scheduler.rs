// src/delivery/scheduler.rs
//! Delivery state machine
//!
//! Owns the pending queue and retry pacing. The scheduler performs no I/O:
//! the owning service asks it what to send (`poll_dispatch`), reports the
//! result (`on_outcome`), and sleeps until `next_wakeup`.
//!
//! # States
//!
//! ```text
//!            ┌──────── success (pace) ───────→ CoolingDown ─┐
//! Idle ──→ InFlight                                         ├─→ Idle
//!            └──────── failure (pace) ───────→ Backoff ─────┘
//!
//! exit: * ──→ Draining ──(queue empty)──→ Drained
//! ```
//!
//! While draining nothing is paced. A transient failure while draining hands
//! the whole queue back for persistence instead of retrying.

use crate::delivery::retry::RetryState;
use crate::delivery::transport::{TransportError, TransportResponse};
use crate::recording::event::EventRecord;
use crate::recording::event_queue::EventQueue;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Idle,
    InFlight,
    CoolingDown,
    Backoff,
    Draining,
    Drained,
}

/// Why a send will be retried
#[derive(Debug)]
pub enum TransientFailure {
    /// The server answered with a non-2xx, non-4xx status
    Server(u16),

    /// The request never produced a status
    Dispatch(TransportError),
}

/// Result of one delivery attempt
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// 2xx
    Delivered,

    /// 4xx: the server will never accept this record
    Rejected(u16),

    /// Worth retrying later
    Transient(TransientFailure),

    /// The record could not be turned into a request
    Unencodable(String),
}

impl DeliveryOutcome {
    /// Classify a transport result
    pub fn from_result(result: Result<TransportResponse, TransportError>) -> Self {
        match result {
            Ok(response) if (200..300).contains(&response.status) => DeliveryOutcome::Delivered,
            Ok(response) if (400..500).contains(&response.status) => DeliveryOutcome::Rejected(response.status),
            Ok(response) => DeliveryOutcome::Transient(TransientFailure::Server(response.status)),
            Err(e) => DeliveryOutcome::Transient(TransientFailure::Dispatch(e)),
        }
    }
}

/// What the owner must do after an outcome
#[derive(Debug)]
pub enum Followup {
    Continue,

    /// Persist these records; they are no longer held in memory
    Persist(EventQueue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PauseKind {
    CoolingDown,
    Backoff,
}

#[derive(Debug, Clone, Copy)]
struct Pause {
    kind: PauseKind,
    until: Instant,
}

/// Delivery counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub rejected: u64,
    pub transient_failures: u64,
    pub unencodable: u64,
}

/// Ordered, single-in-flight delivery of queued events
#[derive(Debug)]
pub struct DeliveryScheduler {
    queue: EventQueue,
    retry: RetryState,
    in_flight: bool,
    pause: Option<Pause>,
    draining: bool,
    drain_signaled: bool,
    stats: DeliveryStats,
}

impl DeliveryScheduler {
    pub fn new(retry: RetryState) -> Self {
        Self {
            queue: EventQueue::new(),
            retry,
            in_flight: false,
            pause: None,
            draining: false,
            drain_signaled: false,
            stats: DeliveryStats::default(),
        }
    }

    /// Append a record at the back of the queue
    pub fn enqueue(&mut self, record: EventRecord) {
        self.queue.enqueue(record);
    }

    /// Take the front record for sending, if the scheduler may send now
    ///
    /// The record stays queued until its outcome is reported.
    pub fn poll_dispatch(&mut self, now: Instant) -> Option<EventRecord> {
        if self.in_flight {
            return None;
        }

        if let Some(pause) = self.pause {
            if !self.draining && now < pause.until {
                return None;
            }
            self.pause = None;
        }

        let record = self.queue.peek_front()?.clone();
        self.in_flight = true;
        debug!("Dispatching '{}' ({} queued)", record.name, self.queue.len());
        Some(record)
    }

    /// Report the result of the in-flight send
    pub fn on_outcome(&mut self, outcome: DeliveryOutcome, now: Instant) -> Followup {
        if !self.in_flight {
            warn!("Ignoring delivery outcome with nothing in flight: {:?}", outcome);
            return Followup::Continue;
        }
        self.in_flight = false;

        match outcome {
            DeliveryOutcome::Delivered => {
                self.queue.pop_front();
                self.stats.delivered += 1;
                self.retry.reset();
                if !self.draining {
                    self.pause_for(PauseKind::CoolingDown, self.retry.current(), now);
                }
                Followup::Continue
            }
            DeliveryOutcome::Rejected(status) => {
                if let Some(record) = self.queue.pop_front() {
                    warn!("Server rejected event '{}' with status {}, dropping it", record.name, status);
                }
                self.stats.rejected += 1;
                if !self.draining {
                    let delay = self.retry.escalate();
                    self.pause_for(PauseKind::Backoff, delay, now);
                }
                Followup::Continue
            }
            DeliveryOutcome::Unencodable(reason) => {
                warn!("Dropping event that cannot be encoded: {}", reason);
                self.queue.pop_front();
                self.stats.unencodable += 1;
                Followup::Continue
            }
            DeliveryOutcome::Transient(failure) => {
                self.stats.transient_failures += 1;
                if self.draining {
                    warn!(
                        "Delivery failed while draining ({:?}), persisting {} events",
                        failure,
                        self.queue.len()
                    );
                    let pending = self.queue.clone();
                    self.queue.clear();
                    return Followup::Persist(pending);
                }

                let delay = self.retry.escalate();
                warn!("Delivery failed ({:?}), retrying in {:?}", failure, delay);
                self.pause_for(PauseKind::Backoff, delay, now);
                Followup::Continue
            }
        }
    }

    /// Enter drain mode: send as fast as possible until the queue empties
    pub fn begin_drain(&mut self) {
        if !self.draining {
            info!("Draining {} pending events", self.queue.len());
        }
        self.draining = true;
        self.pause = None;
    }

    /// True exactly once, when draining has emptied the queue
    pub fn poll_drained(&mut self) -> bool {
        if self.draining && !self.drain_signaled && !self.in_flight && self.queue.is_empty() {
            self.drain_signaled = true;
            return true;
        }
        false
    }

    /// When a paused scheduler may send again
    pub fn next_wakeup(&self) -> Option<Instant> {
        if self.draining || self.in_flight || self.queue.is_empty() {
            return None;
        }
        self.pause.map(|pause| pause.until)
    }

    pub fn state(&self) -> DeliveryState {
        if self.in_flight {
            return DeliveryState::InFlight;
        }
        if self.draining {
            return if self.drain_signaled && self.queue.is_empty() {
                DeliveryState::Drained
            } else {
                DeliveryState::Draining
            };
        }
        match self.pause.map(|pause| pause.kind) {
            Some(PauseKind::CoolingDown) => DeliveryState::CoolingDown,
            Some(PauseKind::Backoff) => DeliveryState::Backoff,
            None => DeliveryState::Idle,
        }
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn current_backoff(&self) -> Duration {
        self.retry.current()
    }

    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    fn pause_for(&mut self, kind: PauseKind, delay: Duration, now: Instant) {
        self.pause = Some(Pause {
            kind,
            until: now + delay,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::event::Properties;
    use proptest::prelude::*;

    fn record(name: &str) -> EventRecord {
        EventRecord {
            name: name.to_string(),
            player_id: 5,
            properties: Properties::new(),
            timestamp: 0.0,
        }
    }

    fn scheduler_with(names: &[&str]) -> DeliveryScheduler {
        let mut scheduler = DeliveryScheduler::new(RetryState::default());
        for name in names {
            scheduler.enqueue(record(name));
        }
        scheduler
    }

    fn server(status: u16) -> DeliveryOutcome {
        DeliveryOutcome::from_result(Ok(TransportResponse { status, body: Vec::new() }))
    }

    #[test]
    fn test_classification() {
        assert!(matches!(server(200), DeliveryOutcome::Delivered));
        assert!(matches!(server(204), DeliveryOutcome::Delivered));
        assert!(matches!(server(400), DeliveryOutcome::Rejected(400)));
        assert!(matches!(server(499), DeliveryOutcome::Rejected(499)));
        assert!(matches!(
            server(503),
            DeliveryOutcome::Transient(TransientFailure::Server(503))
        ));
        assert!(matches!(
            server(302),
            DeliveryOutcome::Transient(TransientFailure::Server(302))
        ));

        let dispatch = DeliveryOutcome::from_result(Err(TransportError::Timeout(Duration::from_secs(1))));
        assert!(matches!(
            dispatch,
            DeliveryOutcome::Transient(TransientFailure::Dispatch(_))
        ));
    }

    #[test]
    fn test_single_in_flight() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["a", "b"]);

        assert_eq!(scheduler.poll_dispatch(now).unwrap().name, "a");
        assert_eq!(scheduler.state(), DeliveryState::InFlight);
        assert!(scheduler.poll_dispatch(now).is_none());
        assert_eq!(scheduler.queue().len(), 2);
    }

    #[test]
    fn test_success_cools_down() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["a", "b"]);

        scheduler.poll_dispatch(now);
        scheduler.on_outcome(DeliveryOutcome::Delivered, now);

        assert_eq!(scheduler.state(), DeliveryState::CoolingDown);
        assert_eq!(scheduler.queue().len(), 1);
        assert_eq!(scheduler.next_wakeup(), Some(now + Duration::from_secs(2)));
        assert!(scheduler.poll_dispatch(now + Duration::from_secs(1)).is_none());
        assert_eq!(
            scheduler.poll_dispatch(now + Duration::from_secs(2)).unwrap().name,
            "b"
        );
    }

    #[test]
    fn test_transient_failure_keeps_record_and_backs_off() {
        let mut now = Instant::now();
        let mut scheduler = scheduler_with(&["a"]);

        for expected in [2u64, 4, 8] {
            assert_eq!(scheduler.poll_dispatch(now).unwrap().name, "a");
            scheduler.on_outcome(server(500), now);
            assert_eq!(scheduler.state(), DeliveryState::Backoff);
            assert_eq!(scheduler.queue().len(), 1);

            let wake = scheduler.next_wakeup().unwrap();
            assert_eq!(wake - now, Duration::from_secs(expected));
            now = wake;
        }

        scheduler.poll_dispatch(now);
        scheduler.on_outcome(DeliveryOutcome::Delivered, now);
        assert_eq!(scheduler.current_backoff(), Duration::from_secs(2));
        assert_eq!(scheduler.stats().transient_failures, 3);
        assert_eq!(scheduler.stats().delivered, 1);
    }

    #[test]
    fn test_client_error_drops_record() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["bad", "good"]);

        scheduler.poll_dispatch(now);
        scheduler.on_outcome(server(404), now);

        assert_eq!(scheduler.queue().len(), 1);
        assert_eq!(scheduler.queue().peek_front().unwrap().name, "good");
        assert_eq!(scheduler.stats().rejected, 1);
        assert_eq!(scheduler.state(), DeliveryState::Backoff);
    }

    #[test]
    fn test_unencodable_dropped_without_pacing() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["a", "b"]);

        scheduler.poll_dispatch(now);
        scheduler.on_outcome(DeliveryOutcome::Unencodable("bad".to_string()), now);

        assert_eq!(scheduler.state(), DeliveryState::Idle);
        assert_eq!(scheduler.poll_dispatch(now).unwrap().name, "b");
    }

    #[test]
    fn test_drain_skips_pacing() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["a", "b", "c"]);

        scheduler.poll_dispatch(now);
        scheduler.on_outcome(server(500), now);
        assert!(scheduler.poll_dispatch(now).is_none());

        scheduler.begin_drain();
        assert_eq!(scheduler.state(), DeliveryState::Draining);

        let mut sent = Vec::new();
        while let Some(record) = scheduler.poll_dispatch(now) {
            sent.push(record.name);
            scheduler.on_outcome(DeliveryOutcome::Delivered, now);
            assert!(scheduler.next_wakeup().is_none());
        }

        assert_eq!(sent, vec!["a", "b", "c"]);
        assert!(scheduler.poll_drained());
        assert!(!scheduler.poll_drained());
        assert_eq!(scheduler.state(), DeliveryState::Drained);
    }

    #[test]
    fn test_drain_failure_hands_back_queue() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["a", "b", "c"]);
        scheduler.begin_drain();

        scheduler.poll_dispatch(now);
        let followup = scheduler.on_outcome(
            DeliveryOutcome::Transient(TransientFailure::Dispatch(TransportError::Dispatch(
                "offline".to_string(),
            ))),
            now,
        );

        match followup {
            Followup::Persist(pending) => {
                let names: Vec<_> = pending.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(names, vec!["a", "b", "c"]);
            }
            Followup::Continue => panic!("expected records to persist"),
        }
        assert!(scheduler.queue().is_empty());
        assert!(scheduler.poll_drained());
    }

    #[test]
    fn test_drain_rejection_continues() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["bad", "good"]);
        scheduler.begin_drain();

        scheduler.poll_dispatch(now);
        assert!(matches!(scheduler.on_outcome(server(400), now), Followup::Continue));
        assert_eq!(scheduler.poll_dispatch(now).unwrap().name, "good");
    }

    #[test]
    fn test_drain_waits_for_in_flight() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["a"]);

        scheduler.poll_dispatch(now);
        scheduler.begin_drain();
        assert!(!scheduler.poll_drained());

        scheduler.on_outcome(DeliveryOutcome::Delivered, now);
        assert!(scheduler.poll_drained());
    }

    #[test]
    fn test_empty_drain_completes_immediately() {
        let mut scheduler = scheduler_with(&[]);
        scheduler.begin_drain();
        assert!(scheduler.poll_drained());
    }

    #[test]
    fn test_stray_outcome_ignored() {
        let now = Instant::now();
        let mut scheduler = scheduler_with(&["a"]);
        scheduler.on_outcome(DeliveryOutcome::Delivered, now);
        assert_eq!(scheduler.queue().len(), 1);
    }

    /// Simulated transport reply for property tests
    #[derive(Debug, Clone, Copy)]
    enum Sim {
        Ok,
        NotFound,
        ServerError,
    }

    fn sim_strategy() -> impl Strategy<Value = Sim> {
        prop_oneof![
            3 => Just(Sim::Ok),
            1 => Just(Sim::NotFound),
            1 => Just(Sim::ServerError),
        ]
    }

    proptest! {
        #[test]
        fn prop_all_success_preserves_order(n in 1usize..60) {
            let names: Vec<String> = (0..n).map(|i| format!("evt_{}", i)).collect();
            let mut scheduler = DeliveryScheduler::new(RetryState::default());
            for name in &names {
                scheduler.enqueue(record(name));
            }

            let mut now = Instant::now();
            let mut delivered = Vec::new();
            loop {
                if let Some(record) = scheduler.poll_dispatch(now) {
                    prop_assert!(scheduler.poll_dispatch(now).is_none());
                    delivered.push(record.name);
                    scheduler.on_outcome(DeliveryOutcome::Delivered, now);
                } else if let Some(wake) = scheduler.next_wakeup() {
                    now = wake;
                } else {
                    break;
                }
            }

            prop_assert_eq!(delivered, names);
        }

        #[test]
        fn prop_mixed_outcomes_never_reorder(
            n in 1usize..30,
            replies in proptest::collection::vec(sim_strategy(), 1..200),
        ) {
            let mut scheduler = DeliveryScheduler::new(RetryState::default());
            for i in 0..n {
                scheduler.enqueue(record(&format!("{}", i)));
            }

            let mut now = Instant::now();
            let mut delivered: Vec<usize> = Vec::new();
            let mut dropped: Vec<usize> = Vec::new();
            for reply in replies {
                if scheduler.poll_dispatch(now).is_none() {
                    match scheduler.next_wakeup() {
                        Some(wake) => now = wake,
                        None => break,
                    }
                    continue;
                }
                let front: usize = scheduler.queue().peek_front().unwrap().name.parse().unwrap();
                let outcome = match reply {
                    Sim::Ok => { delivered.push(front); DeliveryOutcome::Delivered }
                    Sim::NotFound => { dropped.push(front); server(404) }
                    Sim::ServerError => server(503),
                };
                scheduler.on_outcome(outcome, now);
            }

            // Delivered and dropped ids are each strictly increasing: no reordering
            prop_assert!(delivered.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(dropped.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(delivered.len() + dropped.len() + scheduler.queue().len(), n);
        }
    }
}
