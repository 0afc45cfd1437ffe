//! Background delivery of queued session events
//!
//! The worker wakes when the engine appends an event or when the flush
//! interval elapses. After a failed round it stops reacting to wake-ups and
//! retries on an exponential backoff capped at `max_backoff_ms`; the first
//! clean round resets it. Gameplay never waits on any of this.

use crate::common::traits::RemoteSink;
use crate::config::SyncConfig;
use crate::event_log::{EventLog, FlushReport};
use crate::game_store::PlayerStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counters accumulated over the worker's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub rounds: u64,
    pub delivered: u64,
    pub failed_rounds: u64,
}

/// Retry delay that doubles after every failed round, up to a cap
#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial: initial.min(max),
            max,
            current: None,
        }
    }

    /// Delay before the next retry; `None` while rounds succeed
    fn delay(&self) -> Option<Duration> {
        self.current
    }

    fn record_failure(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(current) => current.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

pub struct SyncWorker {
    log: Arc<EventLog>,
    sink: Arc<dyn RemoteSink>,
    store: Option<PlayerStore>,
    config: SyncConfig,
}

impl SyncWorker {
    pub fn new(
        log: Arc<EventLog>,
        sink: Arc<dyn RemoteSink>,
        store: Option<PlayerStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            log,
            sink,
            store,
            config,
        }
    }

    /// One flush round followed by compaction and persistence of what is left
    pub async fn flush_once(&self) -> FlushReport {
        let report = self.log.flush(self.sink.as_ref(), self.config.sink_timeout()).await;
        if report.skipped || report.attempted_sessions == 0 {
            return report;
        }

        self.log.compact();
        if let Some(store) = &self.store {
            if let Err(e) = self.log.persist_with(|streams, next_seq| store.save_pending(streams, next_seq)) {
                tracing::warn!("Failed to persist event queue after flush: {}", e);
            }
        }
        report
    }

    /// Start the background loop on the current tokio runtime
    pub fn spawn(self) -> SyncHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SyncHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> SyncStats {
        let mut stats = SyncStats::default();
        let mut backoff = Backoff::new(self.config.initial_backoff(), self.config.max_backoff());

        tracing::debug!(
            interval_ms = self.config.flush_interval_ms,
            "Event sync worker started"
        );

        loop {
            let retry_in = backoff.delay();
            let wait = retry_in.unwrap_or_else(|| self.config.flush_interval());
            let offline = retry_in.is_some();

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = self.log.appended(), if !offline => {}
                _ = tokio::time::sleep(wait) => {}
            }

            let report = self.flush_once().await;
            if report.skipped || report.attempted_sessions == 0 {
                continue;
            }

            stats.rounds += 1;
            stats.delivered += report.delivered as u64;

            if report.failed_sessions > 0 {
                stats.failed_rounds += 1;
                let delay = backoff.record_failure();
                tracing::debug!(retry_ms = delay.as_millis() as u64, "Sync round failed; backing off");
            } else {
                backoff.reset();
            }
        }

        // last chance to deliver before exit, unless the sink is known to be down
        if !self.log.is_offline() && self.log.has_pending() {
            let report = self.flush_once().await;
            stats.delivered += report.delivered as u64;
        }

        tracing::debug!(
            rounds = stats.rounds,
            delivered = stats.delivered,
            failed_rounds = stats.failed_rounds,
            "Event sync worker stopped"
        );
        stats
    }
}

/// Handle to a running sync worker
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<SyncStats>,
}

impl SyncHandle {
    /// Signal the worker to stop and wait for it
    pub async fn shutdown(self) -> SyncStats {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("Event sync worker ended abnormally: {}", e);
                SyncStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Money, SessionId};
    use crate::games::types::{EventKind, EventPayload, SessionRegistration};
    use crate::sink::MemorySink;
    use crate::storage::MemoryStore;

    fn config() -> SyncConfig {
        SyncConfig {
            enabled: true,
            endpoint: None,
            flush_interval_ms: 50,
            sink_timeout_ms: 100,
            initial_backoff_ms: 20,
            max_backoff_ms: 80,
        }
    }

    fn open(log: &EventLog) -> SessionId {
        let id = SessionId::new();
        log.open_session(
            SessionRegistration {
                session_id: id,
                player_id: "p".to_string(),
                username: "P".to_string(),
                starting_balance: Money::from_units(1_000),
                grid_size: 5,
                bomb_probability: 20.0,
                stake: Money::from_units(10),
            },
            EventPayload::default(),
        );
        id
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_backoff_doubles_up_to_cap_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(20), Duration::from_millis(80));
        assert_eq!(backoff.delay(), None);

        let delays: Vec<u64> = (0..5)
            .map(|_| backoff.record_failure().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![20, 40, 80, 80, 80]);
        assert_eq!(backoff.delay(), Some(Duration::from_millis(80)));

        backoff.reset();
        assert_eq!(backoff.delay(), None);
        assert_eq!(backoff.record_failure(), Duration::from_millis(20));
    }

    #[test]
    fn test_backoff_initial_never_exceeds_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.record_failure(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_worker_flushes_on_append() {
        let log = Arc::new(EventLog::new());
        let sink = Arc::new(MemorySink::new());
        let handle = SyncWorker::new(log.clone(), sink.clone(), None, config()).spawn();

        let id = open(&log);
        log.append(id, EventKind::Flip, EventPayload::default());
        wait_until(|| !log.has_pending()).await;

        assert!(sink.is_registered(&id));
        assert_eq!(sink.delivered_for(&id).len(), 1);

        let stats = handle.shutdown().await;
        assert!(stats.delivered >= 2);
    }

    #[tokio::test]
    async fn test_worker_recovers_after_outage() {
        let log = Arc::new(EventLog::new());
        let sink = Arc::new(MemorySink::new());
        sink.set_available(false);
        let store = PlayerStore::new(Arc::new(MemoryStore::new()), "p");
        let handle = SyncWorker::new(log.clone(), sink.clone(), Some(store.clone()), config()).spawn();

        let id = open(&log);
        wait_until(|| log.is_offline()).await;
        wait_until(|| store.load_pending().map(|streams| streams.len() == 1).unwrap_or(false)).await;

        // gameplay keeps appending while offline
        log.append(id, EventKind::Flip, EventPayload::default());
        log.append(id, EventKind::BombHit, EventPayload::default());

        sink.set_available(true);
        wait_until(|| !log.has_pending()).await;
        assert!(!log.is_offline());

        let kinds: Vec<EventKind> = sink.delivered_for(&id).iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Flip, EventKind::BombHit]);
        wait_until(|| store.load_pending().map(|streams| streams.is_empty()).unwrap_or(false)).await;

        let stats = handle.shutdown().await;
        assert!(stats.failed_rounds >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_with_hung_sink_completes() {
        let log = Arc::new(EventLog::new());
        let sink = Arc::new(MemorySink::new());
        sink.set_latency(Duration::from_secs(30));
        let handle = SyncWorker::new(log.clone(), sink, None, config()).spawn();

        open(&log);
        wait_until(|| log.is_offline()).await;

        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("worker should stop promptly");
        assert!(log.has_pending());
    }
}
