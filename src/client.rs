//! Real-time messaging client
//!
//! Provides the public entry point with:
//! - Interest-based listener registration by event type
//! - Non-blocking `connect()` that spawns the session's I/O task
//! - Idempotent `close()`, also run when the client is dropped
//!
//! A connection loss is terminal for its session. Reconnecting is up to the
//! caller: call `connect()` again with a fresh URL once the old session has
//! stopped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info};
use url::Url;

use crate::codec::{Document, DocumentCodec, JsonCodec};
use crate::error::{Error, Result};
use crate::heartbeat;
use crate::registry::{HandlerResult, ListenerRegistry};
use crate::session::{CloseReason, Session, SessionState};
use crate::transport::{self, ProxyConfig};

/// Default delay between heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(3000);

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Connection parameters, immutable once the client is built
#[derive(Clone)]
pub struct ClientConfig {
    url: String,
    proxy: Option<ProxyConfig>,
    heartbeat_interval: Duration,
    codec: Arc<dyn DocumentCodec>,
}

impl ClientConfig {
    /// Configuration for the gateway at `url` (a `ws://` or `wss://` URL)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            proxy: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            codec: Arc::new(JsonCodec),
        }
    }

    /// Tunnel the connection through an HTTP proxy
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Replace the default JSON codec
    pub fn with_codec(mut self, codec: Arc<dyn DocumentCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn codec(&self) -> &dyn DocumentCodec {
        self.codec.as_ref()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("proxy", &self.proxy)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("codec", &self.codec)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────

/// WebSocket client for a real-time messaging gateway
pub struct RtmClient {
    config: Arc<ClientConfig>,
    listeners: Arc<ListenerRegistry>,
    session: Mutex<Option<Arc<Session>>>,
}

impl RtmClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            listeners: Arc::new(ListenerRegistry::new()),
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register a handler for frames whose `type` is `event_type`
    ///
    /// Accepts a string or an [`Event`](crate::Event). Handlers run in
    /// registration order on the connection's I/O task.
    pub fn add_listener<F>(&self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(&Document) -> HandlerResult + Send + Sync + 'static,
    {
        self.listeners.register(event_type, handler);
    }

    /// Register a handler for a close initiated by the gateway
    pub fn add_close_listener<F>(&self, handler: F)
    where
        F: Fn(&CloseReason) -> HandlerResult + Send + Sync + 'static,
    {
        self.listeners.register_close(handler);
    }

    /// Register a handler for transport failures and protocol violations
    pub fn add_failure_listener<F>(&self, handler: F)
    where
        F: Fn(&Error) -> HandlerResult + Send + Sync + 'static,
    {
        self.listeners.register_fail(handler);
    }

    /// The client's listener registry
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// The current (or most recent) session
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    /// State of the current session, `Idle` if none was started
    pub fn state(&self) -> SessionState {
        self.session
            .lock()
            .as_ref()
            .map_or(SessionState::Idle, |session| session.state())
    }

    /// Start a new session
    ///
    /// Returns once the open request has been issued; listeners report how
    /// it goes from there. Must be called from within a tokio runtime.
    pub fn connect(&self) -> Result<()> {
        let mut current = self.session.lock();
        if current.as_ref().is_some_and(|session| !session.is_stopped()) {
            return Err(Error::AlreadyConnected);
        }

        let prepared = Handle::try_current()
            .map_err(|e| Error::Internal(format!("No tokio runtime available: {}", e)))
            .and_then(|runtime| Ok((runtime, self.gateway_url()?)));

        let (runtime, url) = match prepared {
            Ok(prepared) => prepared,
            Err(cause) => {
                drop(current);
                self.close();
                return Err(Error::setup(cause));
            }
        };

        let session = Arc::new(Session::new(
            Arc::clone(&self.config),
            Arc::clone(&self.listeners),
            runtime.clone(),
        ));
        session.begin_connect()?;

        info!(session = %session.id(), url = %url, proxy = ?self.config.proxy(), "Connecting to gateway");

        let task = runtime.spawn(run_session(Arc::clone(&session), url));
        session.attach_io_task(task.abort_handle());
        *current = Some(session);

        Ok(())
    }

    /// Stop the current session; a no-op if there is none or it already stopped
    pub fn close(&self) {
        let session = self.session.lock().clone();
        if let Some(session) = session {
            session.close();
        }
    }

    fn gateway_url(&self) -> Result<Url> {
        let raw = self.config.url();
        let url = Url::parse(raw).map_err(|e| Error::invalid_url(raw, e.to_string()))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::invalid_url(
                    raw,
                    format!("unsupported scheme '{}', expected ws or wss", other),
                ))
            }
        }

        if self.config.heartbeat_interval().is_zero() {
            return Err(Error::config_field_invalid(
                "heartbeat_interval",
                "Heartbeat interval must be greater than zero",
            ));
        }

        Ok(url)
    }
}

impl Drop for RtmClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for RtmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtmClient")
            .field("config", &self.config)
            .field("listeners", &self.listeners)
            .field("session", &self.session())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Session Task
// ─────────────────────────────────────────────────────────────────

/// Open the socket, start the heartbeat and read until the session ends
async fn run_session(session: Arc<Session>, url: Url) {
    let stream = match transport::open(&url, session.config().proxy()).await {
        Ok(stream) => stream,
        Err(e) => {
            session.fail(Error::from(e));
            session.release().await;
            return;
        }
    };

    let (sink, mut inbound) = stream.split();
    if !session.mark_open(sink).await {
        debug!(session = %session.id(), "Session stopped while connecting, dropping socket");
        session.release().await;
        return;
    }

    let heartbeat = heartbeat::spawn(Arc::clone(&session), session.config().heartbeat_interval());
    session.attach_heartbeat(heartbeat.abort_handle());

    loop {
        match inbound.next().await {
            Some(Ok(message)) => {
                if session.handle_frame(message).is_break() {
                    break;
                }
            }
            Some(Err(e)) => {
                session.fail(Error::from(e));
                break;
            }
            None => {
                session.closed_by_peer(CloseReason::stream_ended());
                break;
            }
        }
    }

    session.release().await;
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
