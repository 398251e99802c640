//! Event surfaces: places a capture-phase handler can be connected to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::bail;
use tracing::debug;

use crate::event::{EventResponse, InputEvent};

/// Capture-phase handler. Returning [`EventResponse::Stop`] consumes the event.
pub type EventHandler = Box<dyn Fn(&InputEvent) -> EventResponse + Send + Sync>;

/// Handle returned by [`EventSurface::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub trait EventSurface: Send + Sync {
    fn name(&self) -> &str;

    fn connect(&self, handler: EventHandler) -> anyhow::Result<SubscriptionId>;

    /// Remove a handler. Once this returns the handler is never called again.
    fn disconnect(&self, id: SubscriptionId) -> anyhow::Result<()>;
}

/// In-process dispatcher that an input backend feeds events into.
///
/// Handlers run in connection order; the first `Stop` ends dispatch.
/// Handlers must not connect or disconnect on the same stage from inside a
/// callback.
pub struct CaptureStage {
    name: String,
    next_id: AtomicU64,
    handlers: RwLock<Vec<(SubscriptionId, EventHandler)>>,
}

impl CaptureStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Deliver one event to the connected handlers.
    pub fn dispatch(&self, event: &InputEvent) -> EventResponse {
        // The read guard is held across the calls so `disconnect` waits for
        // any dispatch in flight.
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        for (_, handler) in handlers.iter() {
            if handler(event) == EventResponse::Stop {
                return EventResponse::Stop;
            }
        }
        EventResponse::Propagate
    }

    #[cfg(test)]
    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl EventSurface for CaptureStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self, handler: EventHandler) -> anyhow::Result<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, handler));
        debug!(surface = %self.name, ?id, "Handler connected");
        Ok(id)
    }

    fn disconnect(&self, id: SubscriptionId) -> anyhow::Result<()> {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let before = handlers.len();
        handlers.retain(|(hid, _)| *hid != id);
        if handlers.len() == before {
            bail!("{}: no handler with id {:?}", self.name, id);
        }
        debug!(surface = %self.name, ?id, "Handler disconnected");
        Ok(())
    }
}
