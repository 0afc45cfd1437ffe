//! Append-only session event log with offline queuing
//!
//! Every session owns an ordered stream of events. Entries start out unsynced
//! and are delivered to the remote sink by [`EventLog::flush`], strictly in
//! insertion order within a stream; independent streams are flushed
//! concurrently. The log is telemetry: gameplay never waits on it, and a
//! failed delivery only leaves entries queued and marks the log offline.
//! Events the sink refuses permanently are dropped with a warning so that one
//! bad entry cannot hold its stream, or the offline flag, forever.

use crate::common::traits::RemoteSink;
use crate::common::types::SessionId;
use crate::errors::{SinkError, StorageError};
use crate::games::types::{
    EventKind, EventPayload, GameEvent, RemoteSessionToken, SessionRegistration,
};
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Ordered events of one session plus its remote registration state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionStream {
    pub session_id: SessionId,
    pub registration: Option<SessionRegistration>,
    pub remote_token: Option<RemoteSessionToken>,
    pub events: Vec<GameEvent>,
}

impl SessionStream {
    fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            registration: None,
            remote_token: None,
            events: Vec::new(),
        }
    }

    fn pending(&self) -> impl Iterator<Item = &GameEvent> {
        self.events.iter().filter(|event| !event.synced)
    }

    pub fn has_pending(&self) -> bool {
        self.pending().next().is_some()
    }

    fn is_closed(&self) -> bool {
        self.events.last().map_or(false, |event| event.kind.is_terminal())
    }
}

/// Outcome of one flush round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Another flush was already running
    pub skipped: bool,
    pub attempted_sessions: usize,
    pub delivered: usize,
    /// Permanently rejected by the sink and given up on
    pub dropped: usize,
    /// Sessions stopped by a transient error; retried next round
    pub failed_sessions: usize,
    pub remaining: usize,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        !self.skipped && self.failed_sessions == 0
    }
}

#[derive(Default)]
struct LogState {
    next_seq: u64,
    streams: BTreeMap<SessionId, SessionStream>,
}

/// Work item handed to a delivery task; owns clones so no lock is held
struct PendingBatch {
    session_id: SessionId,
    registration: Option<SessionRegistration>,
    token: Option<RemoteSessionToken>,
    events: Vec<GameEvent>,
}

struct BatchResult {
    session_id: SessionId,
    token: Option<RemoteSessionToken>,
    delivered: Vec<u64>,
    dropped: Vec<u64>,
    error: Option<SinkError>,
}

pub struct EventLog {
    state: Mutex<LogState>,
    offline: AtomicBool,
    flush_gate: tokio::sync::Mutex<()>,
    appended: Notify,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            offline: AtomicBool::new(false),
            flush_gate: tokio::sync::Mutex::new(()),
            appended: Notify::new(),
        }
    }

    /// Rebuild the log from persisted streams and sequence counter
    pub fn restore(streams: Vec<SessionStream>, next_seq: u64) -> Self {
        let log = Self::new();
        {
            let mut state = log.lock();
            let max_seq = streams
                .iter()
                .flat_map(|stream| stream.events.iter().map(|event| event.seq))
                .max();
            state.next_seq = max_seq.map_or(next_seq, |seq| next_seq.max(seq + 1));
            for stream in streams {
                state.streams.insert(stream.session_id, stream);
            }
        }
        log
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        // A poisoned log only means a panic elsewhere; the data is still append-only.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a session's stream with its `Started` event
    pub fn open_session(&self, registration: SessionRegistration, payload: EventPayload) -> GameEvent {
        let session_id = registration.session_id;
        let event = {
            let mut state = self.lock();
            let seq = state.next_seq;
            state.next_seq += 1;

            let stream = state
                .streams
                .entry(session_id)
                .or_insert_with(|| SessionStream::new(session_id));
            stream.registration = Some(registration);

            let event = new_event(seq, session_id, EventKind::Started, payload);
            stream.events.push(event.clone());
            event
        };

        tracing::debug!(session = %session_id, seq = event.seq, "Session stream opened");
        self.appended.notify_one();
        event
    }

    /// Append an event to a session's stream
    pub fn append(&self, session_id: SessionId, kind: EventKind, payload: EventPayload) -> GameEvent {
        let event = {
            let mut state = self.lock();
            let seq = state.next_seq;
            state.next_seq += 1;

            let event = new_event(seq, session_id, kind, payload);
            state
                .streams
                .entry(session_id)
                .or_insert_with(|| SessionStream::new(session_id))
                .events
                .push(event.clone());
            event
        };

        tracing::debug!(session = %session_id, seq = event.seq, kind = %kind, "Event appended");
        self.appended.notify_one();
        event
    }

    /// Resolves when something was appended since the last call
    pub async fn appended(&self) {
        self.appended.notified().await
    }

    /// Sequence number the next appended event will get
    pub fn next_seq(&self) -> u64 {
        self.lock().next_seq
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.lock()
            .streams
            .values()
            .map(|stream| stream.pending().count())
            .sum()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().streams.values().any(SessionStream::has_pending)
    }

    pub fn events_for(&self, session_id: &SessionId) -> Vec<GameEvent> {
        self.lock()
            .streams
            .get(session_id)
            .map(|stream| stream.events.clone())
            .unwrap_or_default()
    }

    pub fn remote_token(&self, session_id: &SessionId) -> Option<RemoteSessionToken> {
        self.lock()
            .streams
            .get(session_id)
            .and_then(|stream| stream.remote_token.clone())
    }

    /// Streams that still hold undelivered events
    pub fn snapshot_pending(&self) -> Vec<SessionStream> {
        self.lock()
            .streams
            .values()
            .filter(|stream| stream.has_pending())
            .cloned()
            .collect()
    }

    /// Hand the current pending streams and the sequence counter to `write`
    /// while holding the log lock, so concurrent writers always persist the latest state
    pub fn persist_with<F>(&self, write: F) -> Result<(), StorageError>
    where
        F: FnOnce(&[SessionStream], u64) -> Result<(), StorageError>,
    {
        let state = self.lock();
        let pending: Vec<SessionStream> = state
            .streams
            .values()
            .filter(|stream| stream.has_pending())
            .cloned()
            .collect();
        write(&pending, state.next_seq)
    }

    /// Drop fully delivered streams of finished sessions; returns how many were removed
    pub fn compact(&self) -> usize {
        let mut state = self.lock();
        let before = state.streams.len();
        state
            .streams
            .retain(|_, stream| stream.has_pending() || !stream.is_closed());
        before - state.streams.len()
    }

    /// Deliver every unsynced event to `sink`.
    ///
    /// Delivered and dropped events are both marked synced. Returns
    /// immediately with `skipped` set if another flush is running.
    pub async fn flush(&self, sink: &dyn RemoteSink, call_timeout: Duration) -> FlushReport {
        let Ok(_gate) = self.flush_gate.try_lock() else {
            return FlushReport {
                skipped: true,
                ..FlushReport::default()
            };
        };

        let batches: Vec<PendingBatch> = {
            let state = self.lock();
            state
                .streams
                .values()
                .filter(|stream| stream.has_pending())
                .map(|stream| PendingBatch {
                    session_id: stream.session_id,
                    registration: stream.registration.clone(),
                    token: stream.remote_token.clone(),
                    events: stream.pending().cloned().collect(),
                })
                .collect()
        };

        if batches.is_empty() {
            return FlushReport::default();
        }

        let attempted_sessions = batches.len();
        let results = join_all(
            batches
                .into_iter()
                .map(|batch| deliver_batch(sink, batch, call_timeout)),
        )
        .await;

        let mut report = FlushReport {
            attempted_sessions,
            ..FlushReport::default()
        };

        {
            let mut state = self.lock();
            for result in results {
                report.delivered += result.delivered.len();
                report.dropped += result.dropped.len();
                if let Some(ref error) = result.error {
                    report.failed_sessions += 1;
                    tracing::warn!(
                        session = %result.session_id,
                        delivered = result.delivered.len(),
                        "Event delivery stopped: {}",
                        error
                    );
                }

                let Some(stream) = state.streams.get_mut(&result.session_id) else {
                    continue;
                };
                if result.token.is_some() {
                    stream.remote_token = result.token;
                }
                for event in stream.events.iter_mut() {
                    if result.delivered.contains(&event.seq) || result.dropped.contains(&event.seq) {
                        event.synced = true;
                    }
                }
            }
            report.remaining = state
                .streams
                .values()
                .map(|stream| stream.pending().count())
                .sum();
        }

        let was_offline = if report.failed_sessions > 0 {
            !self.offline.swap(true, Ordering::SeqCst)
        } else {
            self.offline.swap(false, Ordering::SeqCst)
        };
        if was_offline {
            if report.failed_sessions > 0 {
                tracing::warn!(remaining = report.remaining, "Remote sink unreachable; switching to offline mode");
            } else {
                tracing::info!("Remote sink reachable again; leaving offline mode");
            }
        }

        tracing::info!(
            sessions = report.attempted_sessions,
            delivered = report.delivered,
            dropped = report.dropped,
            failed = report.failed_sessions,
            remaining = report.remaining,
            "Event flush finished"
        );

        report
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

fn new_event(seq: u64, session_id: SessionId, kind: EventKind, payload: EventPayload) -> GameEvent {
    GameEvent {
        seq,
        session_id,
        kind,
        payload,
        timestamp: Utc::now(),
        synced: false,
    }
}

async fn with_timeout<T, F>(call_timeout: Duration, call: F) -> Result<T, SinkError>
where
    F: std::future::Future<Output = Result<T, SinkError>>,
{
    match tokio::time::timeout(call_timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(call_timeout.as_millis() as u64)),
    }
}

/// Deliver one stream's pending events in order, stopping at the first
/// transient failure and skipping past permanent ones
async fn deliver_batch(sink: &dyn RemoteSink, batch: PendingBatch, call_timeout: Duration) -> BatchResult {
    let mut token = batch.token;
    let mut new_token = None;
    let mut delivered = Vec::with_capacity(batch.events.len());
    let mut dropped = Vec::new();
    let mut error = None;

    for event in &batch.events {
        let outcome = match (event.kind, token.clone()) {
            // registered earlier but the acknowledgement was never recorded
            (EventKind::Started, Some(_)) => Ok(()),
            (EventKind::Started, None) => match batch.registration.as_ref() {
                Some(registration) => {
                    with_timeout(call_timeout, sink.start_session(registration))
                        .await
                        .map(|assigned| {
                            token = Some(assigned.clone());
                            new_token = Some(assigned);
                        })
                }
                None => Err(SinkError::NotRegistered(format!(
                    "session {} has no registration",
                    batch.session_id
                ))),
            },
            (_, Some(current)) => with_timeout(call_timeout, sink.log_event(&current, event)).await,
            (_, None) => Err(SinkError::NotRegistered(format!(
                "session {} was never accepted by the sink",
                batch.session_id
            ))),
        };

        match outcome {
            Ok(()) => delivered.push(event.seq),
            Err(e) if e.is_permanent() => {
                tracing::warn!(
                    session = %batch.session_id,
                    seq = event.seq,
                    kind = %event.kind,
                    "Dropping event rejected by the sink: {}",
                    e
                );
                dropped.push(event.seq);
            }
            Err(e) => {
                error = Some(e);
                break;
            }
        }
    }

    BatchResult {
        session_id: batch.session_id,
        token: new_token,
        delivered,
        dropped,
        error,
    }
}
