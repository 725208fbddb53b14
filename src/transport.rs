//! Socket establishment
//!
//! Opens the gateway WebSocket either directly or through an HTTP proxy
//! using a `CONNECT` tunnel. No connect, read or write timeout is applied;
//! liveness is left to the heartbeat.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{client_async_tls, connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

/// The stream type produced by both connection paths
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the proxy's CONNECT response head
const MAX_PROXY_RESPONSE: usize = 8 * 1024;

/// HTTP proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Open a WebSocket to `url`, tunnelling through `proxy` when given
pub async fn open(url: &Url, proxy: Option<&ProxyConfig>) -> Result<WsStream, WsError> {
    match proxy {
        None => {
            let (stream, response) = connect_async(url.as_str()).await?;
            debug!(status = %response.status(), "WebSocket handshake complete");
            Ok(stream)
        }
        Some(proxy) => {
            let authority = target_authority(url)?;
            debug!(proxy_host = %proxy.host, proxy_port = proxy.port, target = %authority, "Opening proxy tunnel");

            let mut tcp = TcpStream::connect((proxy.host.as_str(), proxy.port)).await?;
            establish_tunnel(&mut tcp, &authority).await?;

            let (stream, response) = client_async_tls(url.as_str(), tcp).await?;
            debug!(status = %response.status(), "WebSocket handshake complete through proxy");
            Ok(stream)
        }
    }
}

/// `host:port` of the gateway, with the scheme's default port filled in
fn target_authority(url: &Url) -> Result<String, WsError> {
    let host = url
        .host_str()
        .ok_or_else(|| invalid_input(format!("URL has no host: {}", url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid_input(format!("URL has no port: {}", url)))?;
    Ok(format!("{}:{}", host, port))
}

/// Issue `CONNECT` and wait for a 2xx response head
async fn establish_tunnel(tcp: &mut TcpStream, authority: &str) -> Result<(), WsError> {
    let request = format!(
        "CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
    );
    tcp.write_all(request.as_bytes()).await?;

    // Read byte-wise so nothing past the response head is consumed.
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_PROXY_RESPONSE {
            return Err(invalid_data("proxy response head too large".to_string()));
        }
        if tcp.read(&mut byte).await? == 0 {
            return Err(WsError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed the connection during CONNECT",
            )));
        }
        head.push(byte[0]);
    }

    let status_line = String::from_utf8_lossy(&head)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    let status = parse_status(&status_line)
        .ok_or_else(|| invalid_data(format!("malformed proxy response: {}", status_line)))?;

    if !(200..300).contains(&status) {
        return Err(WsError::Io(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("proxy refused CONNECT: {}", status_line),
        )));
    }

    debug!(status, "Proxy tunnel established");
    Ok(())
}

/// Status code of an `HTTP/1.x NNN reason` line
fn parse_status(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

fn invalid_input(message: String) -> WsError {
    WsError::Io(io::Error::new(io::ErrorKind::InvalidInput, message))
}

fn invalid_data(message: String) -> WsError {
    WsError::Io(io::Error::new(io::ErrorKind::InvalidData, message))
}
