use crate::event::Event;
use mio::Interest;
use std::sync::Arc;

/// Callback invoked by the event loop when a registered source becomes ready.
///
/// Handlers run on worker threads from the loop's thread pool and may be
/// invoked concurrently for different sources, so implementations must be
/// `Send + Sync`.
pub trait EventHandler {
    fn handle_event(&self, event: &Event);
}

pub struct HandlerEntry {
    // Arc rather than Box: dispatch clones the handler out of the registry so
    // it never calls user code while holding the registry lock.
    pub handler: Arc<dyn EventHandler + Send + Sync>,
    pub interest: Interest,
}

impl HandlerEntry {
    pub fn new<H>(handler: H, interest: Interest) -> Self
    where
        H: EventHandler + Send + Sync + 'static,
    {
        HandlerEntry {
            handler: Arc::new(handler),
            interest,
        }
    }
}
