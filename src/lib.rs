//! Real-time messaging client
//!
//! Holds one long-lived WebSocket connection to a messaging gateway, keeps it
//! alive with periodic `ping` heartbeats and fans inbound frames out to
//! listeners keyed by the frame's `type` discriminator.
//!
//! ```no_run
//! use rtm_client::{ClientConfig, Event, RtmClient};
//!
//! # async fn example() -> rtm_client::Result<()> {
//! let client = RtmClient::new(ClientConfig::new("wss://gateway.example.com/websocket/abc"));
//! client.add_listener(Event::Message, |document| {
//!     println!("{}", document["text"]);
//!     Ok(())
//! });
//! client.add_close_listener(|reason| {
//!     eprintln!("gateway closed the connection: {}", reason);
//!     Ok(())
//! });
//! client.connect()?;
//! # Ok(())
//! # }
//! ```
//!
//! A lost connection is terminal for its session; reconnecting is up to the
//! caller.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod logging;
pub mod registry;
pub mod session;
pub mod transport;
pub mod version;

pub use client::{ClientConfig, RtmClient, DEFAULT_HEARTBEAT_INTERVAL};
pub use codec::{Document, DocumentCodec, JsonCodec};
pub use error::{Error, ErrorCode, Result};
pub use event::Event;
pub use registry::{HandlerResult, ListenerRegistry};
pub use session::{CloseReason, Session, SessionState};
pub use transport::ProxyConfig;
