//! Remote sink implementations
//!
//! [`HttpSink`] speaks the JSON API of the session analytics backend.
//! [`MemorySink`] records deliveries in memory and can simulate outages and
//! slow responses.

use crate::common::traits::RemoteSink;
use crate::common::types::SessionId;
use crate::errors::SinkError;
use crate::games::types::{EventKind, GameEvent, RemoteSessionToken, SessionRegistration};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct StartSessionRequest<'a> {
    user_id: &'a str,
    username: &'a str,
    starting_balance: f64,
    grid_size: usize,
    bomb_probability: f64,
    stake: f64,
}

#[derive(Debug, Deserialize)]
struct StartSessionResponse {
    session_id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct LogEventRequest<'a> {
    session_id: &'a str,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cell_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_winnings: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_wallet_balance: Option<f64>,
}

impl<'a> LogEventRequest<'a> {
    fn new(token: &'a RemoteSessionToken, event: &GameEvent) -> Self {
        let payload = &event.payload;
        let (total_winnings, final_wallet_balance) = match event.kind {
            EventKind::CashOut => (
                payload.amount.map(|amount| amount.to_decimal()),
                payload.balance.map(|balance| balance.to_decimal()),
            ),
            EventKind::BombHit => (Some(0.0), payload.balance.map(|balance| balance.to_decimal())),
            EventKind::Started | EventKind::Flip => (None, None),
        };

        Self {
            session_id: &token.0,
            event_type: event.kind.wire_name(),
            amount: payload.amount.map(|amount| amount.to_decimal()),
            balance: payload.balance.map(|balance| balance.to_decimal()),
            multiplier: payload.multiplier.map(|multiplier| multiplier.reported()),
            cell_position: payload.position.map(|position| position.to_string()),
            total_winnings,
            final_wallet_balance,
        }
    }
}

/// HTTP client for the session backend (`POST /game/start/`, `POST /game/event/`)
pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_error(&self, e: reqwest::Error) -> SinkError {
        if e.is_timeout() {
            SinkError::Timeout(self.timeout.as_millis() as u64)
        } else {
            e.into()
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response, SinkError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteSink for HttpSink {
    async fn start_session(
        &self,
        registration: &SessionRegistration,
    ) -> Result<RemoteSessionToken, SinkError> {
        let request = StartSessionRequest {
            user_id: &registration.player_id,
            username: &registration.username,
            starting_balance: registration.starting_balance.to_decimal(),
            grid_size: registration.grid_size,
            bomb_probability: registration.bomb_probability,
            stake: registration.stake.to_decimal(),
        };

        let response: StartSessionResponse = self
            .post("game/start/", &request)
            .await?
            .json()
            .await
            .map_err(|e| self.map_error(e))?;

        tracing::debug!(
            session = %registration.session_id,
            remote = %response.session_id,
            status = ?response.status,
            "Remote session registered"
        );
        Ok(RemoteSessionToken(response.session_id))
    }

    async fn log_event(&self, token: &RemoteSessionToken, event: &GameEvent) -> Result<(), SinkError> {
        // the backend records GAME_STARTED itself when the session is registered
        if event.kind == EventKind::Started {
            return Ok(());
        }
        self.post("game/event/", &LogEventRequest::new(token, event)).await?;
        Ok(())
    }
}

#[derive(Default)]
struct MemorySinkState {
    available: bool,
    /// Calls allowed before the sink goes down
    remaining_calls: Option<usize>,
    latency: Option<Duration>,
    /// Event kinds answered with a fixed error status
    rejections: HashMap<EventKind, u16>,
    next_token: u64,
    registrations: HashMap<SessionId, RemoteSessionToken>,
    delivered: Vec<GameEvent>,
}

/// In-memory sink
pub struct MemorySink {
    state: Mutex<MemorySinkState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemorySinkState {
                available: true,
                ..MemorySinkState::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_available(&self, available: bool) {
        let mut state = self.lock();
        state.available = available;
        state.remaining_calls = None;
    }

    /// Accept `calls` more calls, then behave as unreachable
    pub fn fail_after(&self, calls: usize) {
        let mut state = self.lock();
        state.available = true;
        state.remaining_calls = Some(calls);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Answer every call for `kind` with `status`; `Started` refuses registration
    pub fn reject_kind(&self, kind: EventKind, status: u16) {
        self.lock().rejections.insert(kind, status);
    }

    pub fn clear_rejections(&self) {
        self.lock().rejections.clear();
    }

    pub fn is_registered(&self, session_id: &SessionId) -> bool {
        self.lock().registrations.contains_key(session_id)
    }

    pub fn registration_count(&self) -> usize {
        self.lock().registrations.len()
    }

    /// Events received for a session, in arrival order
    pub fn delivered_for(&self, session_id: &SessionId) -> Vec<GameEvent> {
        self.lock()
            .delivered
            .iter()
            .filter(|event| &event.session_id == session_id)
            .cloned()
            .collect()
    }

    pub fn delivered(&self) -> Vec<GameEvent> {
        self.lock().delivered.clone()
    }

    async fn admit(&self) -> Result<(), SinkError> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        if !state.available {
            return Err(SinkError::Unavailable("memory sink is offline".to_string()));
        }
        match state.remaining_calls {
            Some(0) => {
                state.available = false;
                Err(SinkError::Unavailable("memory sink is offline".to_string()))
            }
            Some(n) => {
                state.remaining_calls = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn check_rejection(state: &MemorySinkState, kind: EventKind) -> Result<(), SinkError> {
        match state.rejections.get(&kind) {
            Some(&status) => Err(SinkError::Rejected {
                status,
                message: format!("{} refused", kind.wire_name()),
            }),
            None => Ok(()),
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSink for MemorySink {
    async fn start_session(
        &self,
        registration: &SessionRegistration,
    ) -> Result<RemoteSessionToken, SinkError> {
        self.admit().await?;

        let mut state = self.lock();
        Self::check_rejection(&state, EventKind::Started)?;
        if let Some(existing) = state.registrations.get(&registration.session_id) {
            return Ok(existing.clone());
        }
        state.next_token += 1;
        let token = RemoteSessionToken(format!("remote-{}", state.next_token));
        state.registrations.insert(registration.session_id, token.clone());
        Ok(token)
    }

    async fn log_event(&self, token: &RemoteSessionToken, event: &GameEvent) -> Result<(), SinkError> {
        self.admit().await?;

        let mut state = self.lock();
        Self::check_rejection(&state, event.kind)?;
        if state.registrations.get(&event.session_id) != Some(token) {
            return Err(SinkError::Rejected {
                status: 404,
                message: format!("unknown session token {}", token),
            });
        }
        state.delivered.push(event.clone());
        Ok(())
    }
}
