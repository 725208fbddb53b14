//! Listener registry
//!
//! Maps event type discriminators to ordered handler lists, plus separate
//! lists for close and failure notifications. Dispatch runs every handler in
//! registration order on the calling task; a handler that returns an error
//! or panics is logged and skipped so its siblings still run.
//!
//! Listeners are expected to be registered before `connect()`. Registering
//! later is safe: dispatch works on a snapshot of the handler list, so a new
//! listener sees frames from the next dispatch on.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::codec::Document;
use crate::error::Error;
use crate::session::CloseReason;

/// Return type of every listener
pub type HandlerResult = anyhow::Result<()>;

/// Handler for one event type
pub type EventHandler = Arc<dyn Fn(&Document) -> HandlerResult + Send + Sync>;

/// Handler for a transport-initiated close
pub type CloseHandler = Arc<dyn Fn(&CloseReason) -> HandlerResult + Send + Sync>;

/// Handler for a transport failure or protocol violation
pub type FailureHandler = Arc<dyn Fn(&Error) -> HandlerResult + Send + Sync>;

#[derive(Default)]
struct Listeners {
    events: HashMap<String, Vec<EventHandler>>,
    close: Vec<CloseHandler>,
    failure: Vec<FailureHandler>,
}

/// Registered listeners of one client
#[derive(Default)]
pub struct ListenerRegistry {
    inner: RwLock<Listeners>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event_type`
    pub fn register<F>(&self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(&Document) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner
            .write()
            .events
            .entry(event_type.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Append a close handler
    pub fn register_close<F>(&self, handler: F)
    where
        F: Fn(&CloseReason) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.write().close.push(Arc::new(handler));
    }

    /// Append a failure handler
    pub fn register_fail<F>(&self, handler: F)
    where
        F: Fn(&Error) -> HandlerResult + Send + Sync + 'static,
    {
        self.inner.write().failure.push(Arc::new(handler));
    }

    /// Number of handlers registered for `event_type`
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner.read().events.get(event_type).map_or(0, Vec::len)
    }

    pub fn close_listener_count(&self) -> usize {
        self.inner.read().close.len()
    }

    pub fn failure_listener_count(&self) -> usize {
        self.inner.read().failure.len()
    }

    /// Invoke every handler registered for `event_type`
    ///
    /// Returns the number of handlers invoked, failed ones included.
    pub fn dispatch(&self, event_type: &str, document: &Document) -> usize {
        let handlers = self
            .inner
            .read()
            .events
            .get(event_type)
            .cloned()
            .unwrap_or_default();

        invoke_all("event", event_type, &handlers, |handler| handler(document))
    }

    /// Invoke every close handler
    pub fn dispatch_close(&self, reason: &CloseReason) -> usize {
        let handlers = self.inner.read().close.clone();
        invoke_all("close", "close", &handlers, |handler| handler(reason))
    }

    /// Invoke every failure handler
    pub fn dispatch_fail(&self, error: &Error) -> usize {
        let handlers = self.inner.read().failure.clone();
        invoke_all("failure", "failure", &handlers, |handler| handler(error))
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let mut event_types: Vec<&str> = inner.events.keys().map(String::as_str).collect();
        event_types.sort_unstable();

        f.debug_struct("ListenerRegistry")
            .field("event_types", &event_types)
            .field("close", &inner.close.len())
            .field("failure", &inner.failure.len())
            .finish()
    }
}

/// Run each handler, containing errors and panics
fn invoke_all<H>(
    listener: &str,
    event_type: &str,
    handlers: &[H],
    call: impl Fn(&H) -> HandlerResult,
) -> usize {
    for (index, handler) in handlers.iter().enumerate() {
        let message = match panic::catch_unwind(AssertUnwindSafe(|| call(handler))) {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => format!("{:#}", e),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        let err = Error::handler(listener, message);
        warn!(
            event_type = %event_type,
            index,
            error = %err.format_for_log(),
            "Listener failed, continuing with remaining listeners"
        );
    }

    handlers.len()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
