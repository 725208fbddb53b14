//! Heartbeat driver
//!
//! Keeps an open session alive by sending `{"id": n, "type": "ping"}` every
//! interval. The driver owns no socket; it writes through the session's send
//! path and stops as soon as the session's `stopped` flag is observed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::Session;

/// Spawn the heartbeat task for an open session
pub fn spawn(session: Arc<Session>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(run(session, interval))
}

async fn run(session: Arc<Session>, interval: Duration) {
    debug!(session = %session.id(), interval_ms = interval.as_millis() as u64, "Heartbeat started");

    tokio::time::sleep(interval).await;

    while !session.is_stopped() {
        if let Err(e) = session.send_heartbeat().await {
            if session.is_stopped() {
                break;
            }
            warn!(session = %session.id(), error = %e.format_for_log(), "Heartbeat failed, closing session");
            session.close();
            break;
        }

        tokio::time::sleep(interval).await;
    }

    debug!(
        session = %session.id(),
        last_id = session.last_sequence(),
        "Heartbeat stopped"
    );
}
