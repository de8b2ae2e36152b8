//! Chat session state machine.
//!
//! DESIGN
//! ======
//! `ChatMachine::apply` is the only place session state changes. It takes one
//! `Input` (a caller command, a socket event, a timer expiry or a history
//! result), updates the tagged `Phase`, and returns the `Effect`s the driver
//! must perform. It never touches the network or the clock, which keeps every
//! transition testable without a runtime.
//!
//! Every physical socket and every reconnect timer carries an id. Events
//! tagged with an id that is no longer current are stale and ignored, so a
//! superseded socket or timer can never move the session.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here returns `Err`. Failures become a `SessionError` in the
//! snapshot plus a phase change; unparsable inbound frames are logged and
//! dropped.

use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::chat::backoff::Backoff;
use crate::chat::queue::OutboundQueue;
use crate::config::SessionSettings;
use crate::net::types::{ChatMessage, OutboundMessage};

/// Close code for an intentional shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close codes the chat service uses to reject a token.
pub const AUTH_CLOSE_CODES: RangeInclusive<u16> = 4001..=4002;

// =============================================================================
// IDS
// =============================================================================

/// Identity of one physical socket attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

/// Identity of one scheduled reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Identity of one history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryTicket(pub u64);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

// =============================================================================
// STATUS & ERRORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        })
    }
}

/// Caller-visible session error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("authentication token is required")]
    MissingToken,
    #[error("invalid chat endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("failed to load history: {0}")]
    History(String),
    #[error("connection error")]
    Connection,
    #[error("authentication required")]
    AuthRequired,
}

/// How a close event is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    Normal,
    AuthRejected,
    Abnormal,
}

#[must_use]
pub fn classify_close(code: Option<u16>) -> CloseKind {
    match code {
        Some(CLOSE_NORMAL) => CloseKind::Normal,
        Some(code) if AUTH_CLOSE_CODES.contains(&code) => CloseKind::AuthRejected,
        _ => CloseKind::Abnormal,
    }
}

// =============================================================================
// INPUTS & EFFECTS
// =============================================================================

/// Where to connect and with which credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub ws_url: String,
    pub history_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Configure(ChatTarget),
    Send(OutboundMessage),
    Retry,
    Dispose,
    Opened { socket: SocketId },
    Frame { socket: SocketId, text: String },
    TransportError { socket: SocketId, detail: String },
    Closed { socket: SocketId, code: Option<u16>, reason: String },
    ConnectFailed { socket: SocketId, rejected: bool, detail: String },
    TimerFired { timer: TimerId },
    HistoryLoaded { ticket: HistoryTicket, result: Result<Vec<ChatMessage>, String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Open { socket: SocketId, url: String },
    Transmit { socket: SocketId, frame: String },
    Close { socket: SocketId, code: u16, reason: &'static str },
    Schedule { timer: TimerId, delay: Duration },
    Cancel { timer: TimerId },
    FetchHistory { ticket: HistoryTicket, url: String, token: String },
}

// =============================================================================
// PHASE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No usable token or endpoint; nothing on the network.
    Unconfigured,
    Connecting { socket: SocketId },
    Connected { socket: SocketId },
    /// Transport reported an error; the close that follows decides what next.
    Faulted { socket: SocketId },
    /// Waiting for a reconnect timer.
    Backoff { timer: TimerId },
    /// Closed normally; quiescent until reconfigured.
    Closed,
    /// Token rejected; no reconnect until reconfigured.
    Rejected,
    Disposed,
}

impl Phase {
    #[must_use]
    pub fn socket(self) -> Option<SocketId> {
        match self {
            Self::Connecting { socket } | Self::Connected { socket } | Self::Faulted { socket } => Some(socket),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(self) -> ConnectionStatus {
        match self {
            Self::Connecting { .. } => ConnectionStatus::Connecting,
            Self::Connected { .. } => ConnectionStatus::Connected,
            Self::Faulted { .. } => ConnectionStatus::Error,
            Self::Unconfigured | Self::Backoff { .. } | Self::Closed | Self::Rejected | Self::Disposed => {
                ConnectionStatus::Disconnected
            }
        }
    }
}

/// What the chat view renders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatSnapshot {
    pub status: ConnectionStatus,
    pub error: Option<SessionError>,
    pub messages: Vec<ChatMessage>,
    pub queued: usize,
    pub attempts: u32,
}

// =============================================================================
// MACHINE
// =============================================================================

#[derive(Debug)]
pub struct ChatMachine {
    phase: Phase,
    target: Option<ChatTarget>,
    socket_url: Option<String>,
    backoff: Backoff,
    queue: OutboundQueue,
    messages: Vec<ChatMessage>,
    error: Option<SessionError>,
    attempts: u32,
    next_socket: u64,
    next_timer: u64,
    history: u64,
}

impl ChatMachine {
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            phase: Phase::Unconfigured,
            target: None,
            socket_url: None,
            backoff: Backoff::new(settings.reconnect_base, settings.reconnect_max),
            queue: OutboundQueue::new(settings.queue_limit),
            messages: Vec::new(),
            error: None,
            attempts: 0,
            next_socket: 0,
            next_timer: 0,
            history: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.phase.status()
    }

    #[must_use]
    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.phase == Phase::Disposed
    }

    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            status: self.status(),
            error: self.error.clone(),
            messages: self.messages.clone(),
            queued: self.queue.len(),
            attempts: self.attempts,
        }
    }

    /// Apply one input and return the effects to perform, in order.
    pub fn apply(&mut self, input: Input) -> Vec<Effect> {
        if self.is_disposed() {
            tracing::debug!(?input, "chat session disposed; input ignored");
            return Vec::new();
        }

        match input {
            Input::Configure(target) => self.configure(target),
            Input::Send(message) => self.send(message),
            Input::Retry => self.retry(),
            Input::Dispose => self.dispose(),
            Input::Opened { socket } => self.opened(socket),
            Input::Frame { socket, text } => {
                self.frame(socket, &text);
                Vec::new()
            }
            Input::TransportError { socket, detail } => {
                self.transport_error(socket, &detail);
                Vec::new()
            }
            Input::Closed { socket, code, reason } => self.closed(socket, code, &reason),
            Input::ConnectFailed { socket, rejected, detail } => self.connect_failed(socket, rejected, &detail),
            Input::TimerFired { timer } => self.timer_fired(timer),
            Input::HistoryLoaded { ticket, result } => {
                self.history_loaded(ticket, result);
                Vec::new()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Caller commands
    // -------------------------------------------------------------------------

    fn configure(&mut self, target: ChatTarget) -> Vec<Effect> {
        let mut effects = self.release("reconfigure");
        self.attempts = 0;
        self.socket_url = None;
        // Any in-flight history request belongs to the previous target.
        self.history += 1;

        let token = target.token.as_deref().map(str::trim).filter(|t| !t.is_empty()).map(ToOwned::to_owned);
        let Some(token) = token else {
            tracing::warn!("chat session configured without a token");
            self.target = Some(target);
            self.phase = Phase::Unconfigured;
            self.error = Some(SessionError::MissingToken);
            return effects;
        };

        let socket_url = match socket_url(&target.ws_url, &token) {
            Ok(url) => url,
            Err(detail) => {
                tracing::warn!(url = %target.ws_url, %detail, "invalid chat endpoint");
                self.target = Some(target);
                self.phase = Phase::Unconfigured;
                self.error = Some(SessionError::InvalidEndpoint(detail));
                return effects;
            }
        };

        self.error = None;
        self.socket_url = Some(socket_url);
        effects.push(Effect::FetchHistory {
            ticket: HistoryTicket(self.history),
            url: target.history_url.clone(),
            token: token.clone(),
        });
        self.target = Some(ChatTarget { token: Some(token), ..target });
        effects.push(self.open_socket());
        effects
    }

    fn send(&mut self, message: OutboundMessage) -> Vec<Effect> {
        if let Phase::Connected { socket } = self.phase {
            return transmit(socket, &message).into_iter().collect();
        }

        if let Some(evicted) = self.queue.push(message) {
            tracing::warn!(
                capacity = self.queue.capacity(),
                timestamp = %evicted.timestamp,
                "outbound queue full; dropped oldest message"
            );
        }
        tracing::debug!(queued = self.queue.len(), status = %self.status(), "message queued until connected");
        Vec::new()
    }

    fn retry(&mut self) -> Vec<Effect> {
        let Some(ChatTarget { history_url, token: Some(token), .. }) = &self.target else {
            self.error = Some(SessionError::MissingToken);
            return Vec::new();
        };
        let effect = Effect::FetchHistory { ticket: HistoryTicket(self.history + 1), url: history_url.clone(), token: token.clone() };
        self.history += 1;
        vec![effect]
    }

    fn dispose(&mut self) -> Vec<Effect> {
        let effects = self.release("dispose");
        self.phase = Phase::Disposed;
        self.attempts = 0;
        self.queue.clear();
        self.target = None;
        self.socket_url = None;
        self.history += 1;
        tracing::info!("chat session disposed");
        effects
    }

    /// Close the live socket or cancel the pending timer, whichever exists.
    fn release(&mut self, reason: &'static str) -> Vec<Effect> {
        match self.phase {
            Phase::Connecting { socket } | Phase::Connected { socket } | Phase::Faulted { socket } => {
                vec![Effect::Close { socket, code: CLOSE_NORMAL, reason }]
            }
            Phase::Backoff { timer } => vec![Effect::Cancel { timer }],
            _ => Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Socket events
    // -------------------------------------------------------------------------

    fn open_socket(&mut self) -> Effect {
        self.next_socket += 1;
        let socket = SocketId(self.next_socket);
        self.phase = Phase::Connecting { socket };
        let url = self.socket_url.clone().unwrap_or_default();
        tracing::info!(%socket, attempt = self.attempts, "opening chat socket");
        Effect::Open { socket, url }
    }

    fn is_current(&self, socket: SocketId) -> bool {
        self.phase.socket() == Some(socket)
    }

    fn opened(&mut self, socket: SocketId) -> Vec<Effect> {
        if self.phase != (Phase::Connecting { socket }) {
            tracing::debug!(%socket, "stale socket opened; closing it");
            return vec![Effect::Close { socket, code: CLOSE_NORMAL, reason: "superseded" }];
        }

        self.phase = Phase::Connected { socket };
        self.attempts = 0;
        self.error = None;
        let effects: Vec<Effect> = self.queue.drain().filter_map(|m| transmit(socket, &m)).collect();
        tracing::info!(%socket, flushed = effects.len(), "chat socket connected");
        effects
    }

    fn frame(&mut self, socket: SocketId, text: &str) {
        if !self.is_current(socket) {
            tracing::debug!(%socket, "frame from stale socket ignored");
            return;
        }
        match serde_json::from_str::<ChatMessage>(text) {
            Ok(message) => self.messages.push(message),
            Err(e) => tracing::warn!(%socket, error = %e, "dropping unparsable chat frame"),
        }
    }

    fn transport_error(&mut self, socket: SocketId, detail: &str) {
        match self.phase {
            Phase::Connecting { socket: s } | Phase::Connected { socket: s } if s == socket => {
                tracing::warn!(%socket, %detail, "chat socket transport error");
                self.phase = Phase::Faulted { socket };
                self.error = Some(SessionError::Connection);
            }
            _ => tracing::debug!(%socket, %detail, "transport error from stale socket ignored"),
        }
    }

    fn closed(&mut self, socket: SocketId, code: Option<u16>, reason: &str) -> Vec<Effect> {
        if !self.is_current(socket) {
            tracing::debug!(%socket, ?code, "close from stale socket ignored");
            return Vec::new();
        }

        tracing::info!(%socket, ?code, %reason, "chat socket closed");
        match classify_close(code) {
            CloseKind::Normal => {
                self.phase = Phase::Closed;
                Vec::new()
            }
            CloseKind::AuthRejected => {
                self.reject();
                Vec::new()
            }
            CloseKind::Abnormal => vec![self.schedule_reconnect()],
        }
    }

    fn connect_failed(&mut self, socket: SocketId, rejected: bool, detail: &str) -> Vec<Effect> {
        if self.phase != (Phase::Connecting { socket }) {
            tracing::debug!(%socket, %detail, "handshake failure from stale socket ignored");
            return Vec::new();
        }

        tracing::warn!(%socket, rejected, %detail, "chat socket handshake failed");
        if rejected {
            self.reject();
            return Vec::new();
        }
        self.error = Some(SessionError::Connection);
        vec![self.schedule_reconnect()]
    }

    fn reject(&mut self) {
        self.phase = Phase::Rejected;
        self.error = Some(SessionError::AuthRequired);
    }

    fn schedule_reconnect(&mut self) -> Effect {
        let delay = self.backoff.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        self.next_timer += 1;
        let timer = TimerId(self.next_timer);
        self.phase = Phase::Backoff { timer };
        tracing::info!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), attempts = self.attempts, "reconnect scheduled");
        Effect::Schedule { timer, delay }
    }

    fn timer_fired(&mut self, timer: TimerId) -> Vec<Effect> {
        if self.phase != (Phase::Backoff { timer }) {
            tracing::debug!(timer = timer.0, "stale reconnect timer ignored");
            return Vec::new();
        }
        vec![self.open_socket()]
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    fn history_loaded(&mut self, ticket: HistoryTicket, result: Result<Vec<ChatMessage>, String>) {
        if ticket.0 != self.history {
            tracing::debug!(ticket = ticket.0, current = self.history, "superseded history result ignored");
            return;
        }
        match result {
            Ok(messages) => {
                tracing::info!(count = messages.len(), "chat history loaded");
                self.messages = messages;
                if matches!(self.error, Some(SessionError::History(_))) {
                    self.error = None;
                }
            }
            Err(detail) => {
                tracing::warn!(%detail, "chat history load failed");
                self.error = Some(SessionError::History(detail));
            }
        }
    }
}

fn transmit(socket: SocketId, message: &OutboundMessage) -> Option<Effect> {
    match serde_json::to_string(message) {
        Ok(frame) => Some(Effect::Transmit { socket, frame }),
        Err(e) => {
            tracing::warn!(%socket, error = %e, "outbound message not serializable; dropped");
            None
        }
    }
}

/// Attach the token as the `token` query parameter the chat service reads
/// during the handshake.
fn socket_url(base: &str, token: &str) -> Result<String, String> {
    let mut url = reqwest::Url::parse(base).map_err(|e| format!("{base}: {e}"))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(format!("{base}: expected ws:// or wss://"));
    }
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;
