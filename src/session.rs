//! Connection session
//!
//! One `Session` per `connect()`. It owns the socket sink (the only send
//! path), tracks the lifecycle state machine and turns inbound frames into
//! listener dispatches.
//!
//! ```text
//! Idle ──> Connecting ──> Open ──> Closing ──> Closed
//!              │           │
//!              └───────────┴──> Failed
//! ```
//!
//! `Closed` and `Failed` are terminal. The state lives in a single atomic and
//! every transition is a compare-and-swap, so exactly one caller wins each
//! terminal transition and only that caller notifies listeners.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::client::ClientConfig;
use crate::codec;
use crate::error::{Error, Result};
use crate::registry::ListenerRegistry;
use crate::transport::WsStream;

/// Write half of the gateway socket
pub type WsSink = SplitSink<WsStream, WsMessage>;

/// How long a caller close waits for the gateway to answer before the socket
/// is dropped
pub const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

// ─────────────────────────────────────────────────────────────────
// Session State
// ─────────────────────────────────────────────────────────────────

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SessionState {
    /// Created, no connection requested yet
    #[default]
    Idle = 0,
    /// Socket open request in flight
    Connecting = 1,
    /// Socket open, heartbeat running
    Open = 2,
    /// Caller asked to close; close frame in flight
    Closing = 3,
    /// Closed by the caller, socket released
    Closed = 4,
    /// Ended by the transport (peer close, I/O error, protocol violation)
    Failed = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Open,
            3 => SessionState::Closing,
            4 => SessionState::Closed,
            _ => SessionState::Failed,
        }
    }

    /// No further operations are accepted in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Close Reason
// ─────────────────────────────────────────────────────────────────

/// Why the transport closed, as passed to close listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code, if the peer sent a close frame
    pub code: Option<u16>,
    /// Close reason text (may be empty)
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The stream ended without a close frame
    pub fn stream_ended() -> Self {
        Self::new(None, "stream ended")
    }

    fn from_frame(frame: Option<&CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self::new(Some(u16::from(frame.code)), frame.reason.to_string()),
            None => Self::new(None, ""),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) if self.reason.is_empty() => write!(f, "code {}", code),
            Some(code) => write!(f, "{} (code {})", self.reason, code),
            None if self.reason.is_empty() => f.write_str("no close frame"),
            None => f.write_str(&self.reason),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────

/// One gateway connection and its lifecycle
pub struct Session {
    id: Uuid,
    config: Arc<ClientConfig>,
    listeners: Arc<ListenerRegistry>,
    state: AtomicU8,
    stopped: AtomicBool,
    sequence: AtomicU64,
    sink: AsyncMutex<Option<WsSink>>,
    io_task: Mutex<Option<AbortHandle>>,
    heartbeat_task: Mutex<Option<AbortHandle>>,
    released: watch::Sender<bool>,
    runtime: Handle,
}

impl Session {
    pub fn new(config: Arc<ClientConfig>, listeners: Arc<ListenerRegistry>, runtime: Handle) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            listeners,
            state: AtomicU8::new(SessionState::Idle as u8),
            stopped: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            sink: AsyncMutex::new(None),
            io_task: Mutex::new(None),
            heartbeat_task: Mutex::new(None),
            released: watch::channel(false).0,
            runtime,
        }
    }

    /// Identifier used in log records
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Set once the session has been closed by either side
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Id of the most recent heartbeat, 0 before the first one
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// CAS from any of `from` to `to`; returns the replaced state
    fn transition(&self, from: &[SessionState], to: SessionState) -> Option<SessionState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(&SessionState::from_u8(current)).then_some(to as u8)
            })
            .ok()
            .map(SessionState::from_u8)
    }

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Idle → Connecting
    pub(crate) fn begin_connect(&self) -> Result<()> {
        match self.transition(&[SessionState::Idle], SessionState::Connecting) {
            Some(_) => Ok(()),
            None => Err(Error::NotOpen { state: self.state() }),
        }
    }

    /// Remember the I/O task so a pending open or an unanswered close can
    /// be cancelled
    pub(crate) fn attach_io_task(&self, handle: AbortHandle) {
        *self.io_task.lock() = Some(handle);
    }

    pub(crate) fn attach_heartbeat(&self, handle: AbortHandle) {
        *self.heartbeat_task.lock() = Some(handle);
    }

    fn stop_heartbeat(&self) {
        if let Some(handle) = self.heartbeat_task.lock().take() {
            handle.abort();
        }
    }

    /// Resolves once the session no longer holds a socket
    pub async fn released(&self) {
        let mut released = self.released.subscribe();
        let _ = released.wait_for(|done| *done).await;
    }

    /// Connecting → Open, taking ownership of the socket sink
    ///
    /// Returns false if the session was stopped while the socket was opening;
    /// the sink is dropped in that case.
    pub(crate) async fn mark_open(&self, sink: WsSink) -> bool {
        let mut slot = self.sink.lock().await;
        if self
            .transition(&[SessionState::Connecting], SessionState::Open)
            .is_none()
        {
            return false;
        }
        *slot = Some(sink);
        info!(session = %self.id, url = %self.config.url(), "Session open");
        true
    }

    /// Caller-initiated close; idempotent
    ///
    /// Does not wait for the close handshake; the session reaches `Closed`
    /// once the socket is released (see [`Session::released`]). Close
    /// listeners are not invoked.
    pub fn close(self: &Arc<Self>) {
        self.stopped.store(true, Ordering::Release);

        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match SessionState::from_u8(current) {
                    SessionState::Idle | SessionState::Connecting => Some(SessionState::Closed as u8),
                    SessionState::Open => Some(SessionState::Closing as u8),
                    _ => None,
                }
            })
            .map(SessionState::from_u8);

        match previous {
            Ok(SessionState::Connecting) => {
                if let Some(handle) = self.io_task.lock().take() {
                    handle.abort();
                }
                self.released.send_replace(true);
                info!(session = %self.id, "Pending connection cancelled");
            }
            Ok(SessionState::Open) => {
                info!(session = %self.id, "Session closing");
                let session = Arc::clone(self);
                self.runtime.spawn(async move {
                    session.send_close_frame().await;
                });
            }
            Ok(_) => {
                self.released.send_replace(true);
                debug!(session = %self.id, "Session closed before connecting");
            }
            Err(state) => {
                debug!(session = %self.id, state = %SessionState::from_u8(state), "Close ignored, session already stopped");
            }
        }
    }

    /// Best-effort close frame (1000, empty reason), then wait for the I/O
    /// task to release the socket
    ///
    /// If the gateway does not answer within [`CLOSE_HANDSHAKE_TIMEOUT`] the
    /// I/O task is aborted and the socket dropped here.
    async fn send_close_frame(&self) {
        {
            let mut slot = self.sink.lock().await;
            if let Some(sink) = slot.as_mut() {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                let sent = tokio::time::timeout(
                    CLOSE_HANDSHAKE_TIMEOUT,
                    sink.send(WsMessage::Close(Some(frame))),
                )
                .await;
                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(session = %self.id, error = %e, "Close frame not sent"),
                    Err(_) => debug!(session = %self.id, "Close frame send timed out"),
                }
            }
        }

        let answered = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, self.released())
            .await
            .is_ok();
        if answered {
            return;
        }

        debug!(session = %self.id, "No close reply from gateway, dropping socket");
        if let Some(handle) = self.io_task.lock().take() {
            handle.abort();
        }
        self.stop_heartbeat();
        drop(self.sink.lock().await.take());
        self.finish_close();
        self.released.send_replace(true);
    }

    fn finish_close(&self) {
        if self
            .transition(&[SessionState::Closing], SessionState::Closed)
            .is_some()
        {
            info!(session = %self.id, "Session closed");
        }
    }

    /// Transport-initiated close: notifies close listeners once
    pub(crate) fn closed_by_peer(&self, reason: CloseReason) {
        self.stopped.store(true, Ordering::Release);

        if self
            .transition(&[SessionState::Connecting, SessionState::Open], SessionState::Failed)
            .is_some()
        {
            info!(session = %self.id, reason = %reason, "Connection closed by gateway");
            self.listeners.dispatch_close(&reason);
        } else {
            debug!(session = %self.id, reason = %reason, "Close after stop ignored");
        }
    }

    /// Transport failure or protocol violation: notifies failure listeners once
    pub(crate) fn fail(&self, error: Error) {
        self.stopped.store(true, Ordering::Release);

        if self
            .transition(&[SessionState::Connecting, SessionState::Open], SessionState::Failed)
            .is_some()
        {
            warn!(session = %self.id, error = %error.format_for_log(), "Session failed");
            self.listeners.dispatch_fail(&error);
        } else {
            debug!(session = %self.id, error = %error, "Failure after stop ignored");
        }
    }

    /// Drop the socket once the I/O task is done with it
    pub(crate) async fn release(&self) {
        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                trace!(session = %self.id, error = %e, "Socket close after release");
            }
        }
        self.io_task.lock().take();
        self.stop_heartbeat();
        self.finish_close();
        self.released.send_replace(true);
        debug!(session = %self.id, state = %self.state(), "Socket released");
    }

    // ─────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────

    /// Send one text frame through the session's socket
    ///
    /// Refused once the session is stopped, so nothing is written after
    /// `close()` has returned.
    pub async fn send_text(&self, text: String) -> Result<()> {
        let mut slot = self.sink.lock().await;
        if self.is_stopped() {
            return Err(Error::NotOpen { state: self.state() });
        }
        let sink = slot.as_mut().ok_or_else(|| Error::TransportClosed {
            code: None,
            reason: "socket released".to_string(),
        })?;
        sink.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    /// Encode and send the next heartbeat; returns its id
    pub(crate) async fn send_heartbeat(&self) -> Result<u64> {
        let id = self.next_sequence();
        let frame = codec::encode_heartbeat(self.config.codec(), id)?;
        self.send_text(frame).await?;
        trace!(session = %self.id, id, "Heartbeat sent");
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────

    /// Handle one inbound message; `Break` ends the read loop
    pub(crate) fn handle_frame(&self, message: WsMessage) -> ControlFlow<()> {
        if self.is_stopped() {
            trace!(session = %self.id, "Frame after stop ignored");
            return match message {
                WsMessage::Close(_) => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            };
        }

        match message {
            WsMessage::Text(text) => {
                self.deliver(&text);
                ControlFlow::Continue(())
            }
            WsMessage::Binary(data) => {
                self.fail(Error::protocol_violation(format!(
                    "unexpected binary frame ({} bytes)",
                    data.len()
                )));
                ControlFlow::Break(())
            }
            WsMessage::Close(frame) => {
                self.closed_by_peer(CloseReason::from_frame(frame.as_ref()));
                ControlFlow::Break(())
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
                trace!(session = %self.id, "Control frame");
                ControlFlow::Continue(())
            }
        }
    }

    /// Decode a text frame and dispatch it by its discriminator
    fn deliver(&self, text: &str) {
        let document = match self.config.codec().decode(text) {
            Ok(document) => document,
            Err(e) => {
                warn!(session = %self.id, error = %e.format_for_log(), "Dropping undecodable frame");
                return;
            }
        };

        let Some(event_type) = codec::extract_type(&document) else {
            debug!(session = %self.id, frame = %text, "Frame without type, not routed");
            return;
        };

        if event_type == HEARTBEAT_PONG {
            trace!(session = %self.id, frame = %text, "Gateway pong");
        } else {
            debug!(session = %self.id, event_type = %event_type, frame = %text, "Gateway message");
        }

        let invoked = self.listeners.dispatch(event_type, &document);
        trace!(session = %self.id, event_type = %event_type, invoked, "Dispatched");
    }
}

/// Reply type the gateway uses for heartbeats; logged quietly
const HEARTBEAT_PONG: &str = "pong";

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("stopped", &self.is_stopped())
            .field("last_sequence", &self.last_sequence())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
