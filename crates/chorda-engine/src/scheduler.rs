//! Deferred command dispatch.
//!
//! Commands are handed to a dedicated dispatcher thread together with the
//! engine epoch current at scheduling time. The dispatcher keeps armed events
//! ordered by due time and alternates between firing whatever is due and a
//! bounded wait for new requests, so a near-future event is never held up by
//! a long idle wait.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use tracing::{debug, warn};

use crate::command::{Command, TimedCommand};
use crate::error::SynthError;
use crate::state::{EngineEpoch, EngineState};

/// Longest the dispatcher blocks on its request queue.
const MAX_WAIT: Duration = Duration::from_millis(10);

/// Monotonically increasing identifier of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EventId(u64);

impl EventId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A command waiting for its due time.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub id: EventId,
    pub due: Instant,
    /// Engine epoch captured when the event was scheduled.
    pub epoch: EngineEpoch,
    pub command: Command,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.id.cmp(&other.id))
    }
}

enum Request {
    Schedule(ScheduledEvent),
    CancelChannel(usize),
    Shutdown,
}

/// Handle to the dispatcher thread.
pub struct Scheduler {
    state: Arc<EngineState>,
    requests: Sender<Request>,
    next_id: AtomicU64,
    thread: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(state: Arc<EngineState>) -> Result<Self, SynthError> {
        let (requests, rx) = unbounded();
        let thread = {
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("chorda-dispatch".into())
                .spawn(move || dispatch_loop(rx, state))
                .map_err(SynthError::ThreadSpawn)?
        };
        Ok(Self {
            state,
            requests,
            next_id: AtomicU64::new(0),
            thread: Some(thread),
        })
    }

    /// Runs `command` once, `delay` from now, unless the engine is stopped or
    /// restarted in the meantime.
    pub fn schedule(&self, command: Command, delay: Duration) -> EventId {
        let id = EventId(self.next_id.fetch_add(1, AtomicOrdering::Relaxed));
        let event = ScheduledEvent {
            id,
            due: Instant::now() + delay,
            epoch: self.state.epoch(),
            command,
        };
        if self.requests.send(Request::Schedule(event)).is_err() {
            warn!(id = id.get(), "dispatcher is gone; event dropped");
        }
        id
    }

    pub fn schedule_batch<I>(&self, batch: I) -> Vec<EventId>
    where
        I: IntoIterator<Item = TimedCommand>,
    {
        batch
            .into_iter()
            .map(|timed| self.schedule(timed.command, Duration::from_millis(timed.when)))
            .collect()
    }

    /// Drops every pending event targeting `channel` that was scheduled before
    /// this call.
    pub fn cancel_channel_events(&self, channel: usize) {
        let _ = self.requests.send(Request::CancelChannel(channel));
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = self.requests.send(Request::Shutdown);
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(requests: Receiver<Request>, state: Arc<EngineState>) {
    let mut armed: BinaryHeap<Reverse<ScheduledEvent>> = BinaryHeap::new();

    loop {
        let now = Instant::now();
        while armed.peek().is_some_and(|Reverse(event)| event.due <= now) {
            if let Some(Reverse(event)) = armed.pop() {
                fire(&state, event);
            }
        }

        let wait = armed
            .peek()
            .map(|Reverse(event)| event.due.saturating_duration_since(now))
            .unwrap_or(MAX_WAIT)
            .min(MAX_WAIT);

        match requests.recv_timeout(wait) {
            Ok(Request::Schedule(event)) => armed.push(Reverse(event)),
            Ok(Request::CancelChannel(channel)) => {
                let before = armed.len();
                armed.retain(|Reverse(event)| event.command.channel() != Some(channel));
                debug!(channel, cancelled = before - armed.len(), "channel events cancelled");
            }
            Ok(Request::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    if !armed.is_empty() {
        debug!(pending = armed.len(), "dispatcher stopped with pending events");
    }
}

fn fire(state: &EngineState, event: ScheduledEvent) {
    match state.execute_in_epoch(event.epoch, &event.command) {
        None => debug!(
            id = event.id.get(),
            kind = event.command.kind(),
            scheduled_epoch = event.epoch.id(),
            current_epoch = state.epoch().id(),
            "discarding stale event"
        ),
        Some(Err(err)) => warn!(
            id = event.id.get(),
            kind = event.command.kind(),
            %err,
            "scheduled command failed"
        ),
        Some(Ok(())) => {}
    }
}
