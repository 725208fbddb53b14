//! Common test utilities
//!
//! In-process mock gateway and HTTP CONNECT proxy used by the integration
//! tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ─────────────────────────────────────────────────────────────────
// Mock Gateway
// ─────────────────────────────────────────────────────────────────

/// WebSocket server that records what the client sends and lets the test
/// push frames to the most recent connection
pub struct MockGateway {
    addr: SocketAddr,
    received: Arc<RwLock<Vec<String>>>,
    close_codes: Arc<RwLock<Vec<Option<u16>>>>,
    connections: Arc<AtomicUsize>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<WsMessage>>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let received = Arc::new(RwLock::new(Vec::new()));
        let close_codes = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let outbound = Arc::new(Mutex::new(None));

        let state = (received.clone(), close_codes.clone(), connections.clone(), outbound.clone());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        if let Ok((stream, _)) = accept_result {
                            let (received, close_codes, connections, outbound) = state.clone();
                            tokio::spawn(async move {
                                if let Ok(ws_stream) = accept_async(stream).await {
                                    let (tx, rx) = mpsc::unbounded_channel();
                                    *outbound.lock() = Some(tx);
                                    connections.fetch_add(1, Ordering::SeqCst);
                                    handle_connection(ws_stream, rx, received, close_codes).await;
                                }
                            });
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Self {
            addr,
            received,
            close_codes,
            connections,
            outbound,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/websocket", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Text frames received from the client, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.read().clone()
    }

    /// Received frames that decode as heartbeats, as their ids
    pub fn heartbeat_ids(&self) -> Vec<u64> {
        self.received()
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|doc| doc["type"] == "ping")
            .filter_map(|doc| doc["id"].as_u64())
            .collect()
    }

    /// Close codes sent by the client (None for a close frame without payload)
    pub fn close_codes(&self) -> Vec<Option<u16>> {
        self.close_codes.read().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_connections(&self, count: usize) -> bool {
        eventually(Duration::from_secs(5), || self.connection_count() >= count).await
    }

    /// Send a frame on the latest connection
    pub fn push(&self, message: WsMessage) {
        if let Some(tx) = self.outbound.lock().as_ref() {
            let _ = tx.send(message);
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push(WsMessage::Text(text.into()));
    }

    /// Close the latest connection from the gateway side
    pub fn close_with(&self, code: CloseCode, reason: &str) {
        self.push(WsMessage::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })));
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

async fn handle_connection<S>(
    ws_stream: S,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    received: Arc<RwLock<Vec<String>>>,
    close_codes: Arc<RwLock<Vec<Option<u16>>>>,
) where
    S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + SinkExt<WsMessage>
        + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => received.write().push(text),
                Some(Ok(WsMessage::Close(frame))) => {
                    close_codes.write().push(frame.map(|f| u16::from(f.code)));
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            Some(message) = outbound.recv() => {
                if write.send(message).await.is_err() {
                    break;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Proxy
// ─────────────────────────────────────────────────────────────────

/// HTTP proxy that accepts CONNECT and relays bytes to the target
pub struct MockProxy {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<String>>>,
}

impl MockProxy {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(RwLock::new(Vec::new()));
        let requests_clone = requests.clone();

        tokio::spawn(async move {
            while let Ok((client, _)) = listener.accept().await {
                let requests = requests_clone.clone();
                tokio::spawn(async move {
                    let _ = tunnel(client, requests).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Request lines of the CONNECT requests received so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.read().clone()
    }
}

async fn tunnel(mut client: TcpStream, requests: Arc<RwLock<Vec<String>>>) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if client.read(&mut byte).await? == 0 {
            return Ok(());
        }
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head).to_string();
    let request_line = head.lines().next().unwrap_or_default().to_string();
    requests.write().push(request_line.clone());

    let target = request_line.split_whitespace().nth(1).unwrap_or_default().to_string();
    let mut upstream = match TcpStream::connect(&target).await {
        Ok(upstream) => upstream,
        Err(_) => {
            client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await?;
            return Ok(());
        }
    };

    client.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n").await?;
    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}
