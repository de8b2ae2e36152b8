//! Chat session driver: one task per session, one input at a time.
//!
//! ARCHITECTURE
//! ============
//! `spawn_chat_session` starts a task that owns a `ChatMachine`. Caller
//! commands (from `ChatHandle`) and runtime events (socket frames, timer
//! expiry, history results) all arrive on a single channel, so the machine
//! sees them in arrival order and never needs a lock. After each input the
//! driver performs the returned effects and publishes a `ChatSnapshot` on a
//! `watch` channel.
//!
//! Physical sockets, reconnect timers and history requests run as spawned
//! tasks. The driver keeps their abort handles, which is how pending timers,
//! in-flight handshakes and superseded history requests are cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};

use crate::chat::machine::{
    CLOSE_NORMAL, ChatMachine, ChatSnapshot, ChatTarget, Effect, HistoryTicket, Input, SocketId, TimerId,
};
use crate::config::SessionSettings;
use crate::net::api::HistorySource;
use crate::net::socket::{Connector, Incoming, Link, Outgoing};
use crate::net::types::{ChatDraft, OutboundMessage};

/// How long a closing socket may take to acknowledge the close.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// HANDLE
// =============================================================================

/// Caller-side handle to a running chat session. Dropping it disposes the
/// session.
#[derive(Debug)]
pub struct ChatHandle {
    inputs: mpsc::UnboundedSender<Input>,
    snapshot: watch::Receiver<ChatSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl ChatHandle {
    /// Point the session at an endpoint pair with the given token. Replaces any
    /// previous configuration, tearing down its socket first.
    pub fn configure(&self, ws_url: impl Into<String>, history_url: impl Into<String>, token: Option<String>) {
        self.submit(Input::Configure(ChatTarget { ws_url: ws_url.into(), history_url: history_url.into(), token }));
    }

    /// Send now if connected, otherwise queue until the next open.
    pub fn send(&self, draft: ChatDraft) {
        self.submit(Input::Send(OutboundMessage::stamp(draft)));
    }

    /// Reload history.
    pub fn retry(&self) {
        self.submit(Input::Retry);
    }

    /// Stop the session. Calling it more than once has no further effect.
    pub fn dispose(&self) {
        self.submit(Input::Dispose);
    }

    #[must_use]
    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot.clone()
    }

    /// Dispose and wait for the session task to finish.
    pub async fn shutdown(mut self) {
        self.dispose();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "chat session task failed");
            }
        }
    }

    fn submit(&self, input: Input) {
        if self.inputs.send(input).is_err() {
            tracing::debug!("chat session already stopped");
        }
    }
}

impl Drop for ChatHandle {
    fn drop(&mut self) {
        self.submit(Input::Dispose);
    }
}

/// Start a chat session task. Call [`ChatHandle::configure`] to connect.
#[must_use]
pub fn spawn_chat_session(
    settings: SessionSettings,
    connector: Arc<dyn Connector>,
    history: Arc<dyn HistorySource>,
) -> ChatHandle {
    let machine = ChatMachine::new(settings);
    let (published, snapshot) = watch::channel(machine.snapshot());
    let (inputs, rx) = mpsc::unbounded_channel();

    let driver = Driver {
        machine,
        connector,
        history,
        inputs: inputs.clone(),
        sockets: HashMap::new(),
        timer: None,
        history_task: None,
        published,
    };
    let task = tokio::spawn(driver.run(rx));

    ChatHandle { inputs, snapshot, task: Some(task) }
}

// =============================================================================
// DRIVER
// =============================================================================

struct SocketTask {
    outbound: mpsc::UnboundedSender<Outgoing>,
    task: AbortHandle,
    opened: bool,
}

struct Driver {
    machine: ChatMachine,
    connector: Arc<dyn Connector>,
    history: Arc<dyn HistorySource>,
    inputs: mpsc::UnboundedSender<Input>,
    sockets: HashMap<SocketId, SocketTask>,
    timer: Option<(TimerId, AbortHandle)>,
    history_task: Option<AbortHandle>,
    published: watch::Sender<ChatSnapshot>,
}

impl Driver {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        while let Some(input) = rx.recv().await {
            self.observe(&input);
            for effect in self.machine.apply(input) {
                self.perform(effect);
            }
            self.publish();
            if self.machine.is_disposed() {
                break;
            }
        }
        self.teardown();
    }

    /// Runtime bookkeeping that depends on the raw event, not on the machine.
    fn observe(&mut self, input: &Input) {
        match input {
            Input::Opened { socket } => {
                if let Some(entry) = self.sockets.get_mut(socket) {
                    entry.opened = true;
                }
            }
            Input::Closed { socket, .. } | Input::ConnectFailed { socket, .. } => {
                self.sockets.remove(socket);
            }
            Input::TimerFired { timer } => {
                if self.timer.as_ref().is_some_and(|(id, _)| id == timer) {
                    self.timer = None;
                }
            }
            _ => {}
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Open { socket, url } => self.open(socket, url),
            Effect::Transmit { socket, frame } => {
                let sent = self.sockets.get(&socket).is_some_and(|s| s.outbound.send(Outgoing::Text(frame)).is_ok());
                if !sent {
                    tracing::warn!(%socket, "transmit on a socket that is gone");
                }
            }
            Effect::Close { socket, code, reason } => self.close(socket, code, reason),
            Effect::Schedule { timer, delay } => {
                if let Some((_, previous)) = self.timer.take() {
                    previous.abort();
                }
                let inputs = self.inputs.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if inputs.send(Input::TimerFired { timer }).is_err() {
                        tracing::debug!(timer = timer.0, "timer fired after session stopped");
                    }
                });
                self.timer = Some((timer, task.abort_handle()));
            }
            Effect::Cancel { timer } => {
                if let Some((id, task)) = self.timer.take() {
                    if id == timer {
                        task.abort();
                    } else {
                        self.timer = Some((id, task));
                    }
                }
            }
            Effect::FetchHistory { ticket, url, token } => self.fetch_history(ticket, url, token),
        }
    }

    fn open(&mut self, socket: SocketId, url: String) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(Arc::clone(&self.connector), url, socket, outbound_rx, self.inputs.clone()));
        self.sockets.insert(socket, SocketTask { outbound, task: task.abort_handle(), opened: false });
    }

    fn close(&mut self, socket: SocketId, code: u16, reason: &'static str) {
        let Some(entry) = self.sockets.remove(&socket) else {
            return;
        };
        if entry.opened {
            if entry.outbound.send(Outgoing::Close { code, reason: reason.to_owned() }).is_err() {
                tracing::debug!(%socket, "socket task already finished");
            }
        } else {
            tracing::debug!(%socket, "aborting in-flight handshake");
            entry.task.abort();
        }
    }

    fn fetch_history(&mut self, ticket: HistoryTicket, url: String, token: String) {
        if let Some(previous) = self.history_task.take() {
            previous.abort();
        }
        let source = Arc::clone(&self.history);
        let inputs = self.inputs.clone();
        let task = tokio::spawn(async move {
            let result = source.fetch_history(&url, &token).await.map_err(|e| e.to_string());
            if inputs.send(Input::HistoryLoaded { ticket, result }).is_err() {
                tracing::debug!("history arrived after session stopped");
            }
        });
        self.history_task = Some(task.abort_handle());
    }

    fn publish(&self) {
        let next = self.machine.snapshot();
        self.published.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn teardown(&mut self) {
        if let Some((_, timer)) = self.timer.take() {
            timer.abort();
        }
        if let Some(history) = self.history_task.take() {
            history.abort();
        }
        for (socket, entry) in self.sockets.drain() {
            tracing::debug!(%socket, "releasing socket on teardown");
            let closing = entry.opened
                && entry.outbound.send(Outgoing::Close { code: CLOSE_NORMAL, reason: String::new() }).is_ok();
            if !closing {
                entry.task.abort();
            }
        }
    }
}

// =============================================================================
// SOCKET TASK
// =============================================================================

/// Connect, then pump frames between the driver and the link until it closes.
async fn run_socket(
    connector: Arc<dyn Connector>,
    url: String,
    socket: SocketId,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
    inputs: mpsc::UnboundedSender<Input>,
) {
    let mut link = match connector.connect(&url).await {
        Ok(link) => link,
        Err(err) => {
            let failed = Input::ConnectFailed { socket, rejected: err.is_rejection(), detail: err.to_string() };
            if inputs.send(failed).is_err() {
                tracing::debug!(%socket, error = %err, "connect failed after session stopped");
            }
            return;
        }
    };
    if inputs.send(Input::Opened { socket }).is_err() {
        return;
    }

    loop {
        tokio::select! {
            out = outbound.recv() => {
                let close = match out {
                    Some(Outgoing::Text(text)) => {
                        if link.outgoing.send(Outgoing::Text(text)).is_err() {
                            tracing::warn!(%socket, "frame dropped: link writer is gone");
                        }
                        continue;
                    }
                    Some(close @ Outgoing::Close { .. }) => close,
                    None => Outgoing::Close { code: CLOSE_NORMAL, reason: String::new() },
                };
                if link.outgoing.send(close).is_err() {
                    tracing::debug!(%socket, "link writer gone before close");
                    return;
                }
                if tokio::time::timeout(CLOSE_GRACE, forward_until_closed(&mut link, socket, &inputs)).await.is_err() {
                    tracing::debug!(%socket, "close not acknowledged in time");
                }
                return;
            }
            incoming = link.incoming.recv() => {
                if !forward(incoming, socket, &inputs) {
                    return;
                }
            }
        }
    }
}

async fn forward_until_closed(link: &mut Link, socket: SocketId, inputs: &mpsc::UnboundedSender<Input>) {
    while forward(link.incoming.recv().await, socket, inputs) {}
}

/// Relay one link event to the driver. Returns `false` once the link is closed.
fn forward(incoming: Option<Incoming>, socket: SocketId, inputs: &mpsc::UnboundedSender<Input>) -> bool {
    let input = match incoming {
        Some(Incoming::Text(text)) => Input::Frame { socket, text },
        Some(Incoming::Error(detail)) => Input::TransportError { socket, detail },
        Some(Incoming::Closed { code, reason }) => Input::Closed { socket, code, reason },
        None => Input::Closed { socket, code: None, reason: "link dropped".to_owned() },
    };
    let open = !matches!(input, Input::Closed { .. });
    inputs.send(input).is_ok() && open
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
