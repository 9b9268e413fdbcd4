use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use mio::{Events, Interest, Poll, Token, Waker};

use crate::error::Result;
use crate::handler::{EventHandler, HandlerEntry};
use crate::net::errors::NetworkError;

/// Token reserved for the loop waker. User registrations start above it.
pub(crate) const WAKER_TOKEN: Token = Token(0);

pub struct PollHandle {
    // The Poll itself is only needed by the polling thread; registration goes
    // through an owned Registry clone so handlers can register new sources
    // while a poll is in flight.
    poller: Mutex<Poll>,
    poll_registry: mio::Registry,
    handlers: Arc<RwLock<HashMap<Token, HandlerEntry>>>,
    waker: Arc<Waker>,
}

impl PollHandle {
    pub fn new() -> Result<Self> {
        let poller = Poll::new()?;
        let poll_registry = poller.registry().try_clone()?;
        let waker = Waker::new(poller.registry(), WAKER_TOKEN)?;
        Ok(PollHandle {
            poller: Mutex::new(poller),
            poll_registry,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            waker: Arc::new(waker),
        })
    }

    pub fn register<H, S>(
        &self,
        src: &mut S,
        token: Token,
        interest: Interest,
        handler: H,
    ) -> Result<()>
    where
        H: EventHandler + Send + Sync + 'static,
        S: mio::event::Source + ?Sized,
    {
        let mut handlers = self.handlers.write().unwrap();
        if token == WAKER_TOKEN || handlers.contains_key(&token) {
            return Err(NetworkError::TokenInUse(token).into());
        }
        src.register(&self.poll_registry, token, interest)?;
        handlers.insert(token, HandlerEntry::new(handler, interest));
        Ok(())
    }

    pub fn deregister<S>(&self, src: &mut S, token: Token) -> Result<()>
    where
        S: mio::event::Source + ?Sized,
    {
        src.deregister(&self.poll_registry)?;
        let drained = {
            let mut handlers = self.handlers.write().unwrap();
            handlers.remove(&token);
            handlers.is_empty()
        };
        if drained {
            // Let the loop notice it has nothing left to wait on.
            let _ = self.waker.wake();
        }
        Ok(())
    }

    pub fn poll(&self, events: &mut Events, timeout: Option<Duration>) -> Result<usize> {
        self.poller.lock().unwrap().poll(events, timeout)?;
        Ok(events.iter().count())
    }

    pub fn wake(&self) -> Result<()> {
        Ok(self.waker.wake()?)
    }

    /// Number of registered sources (the waker does not count).
    pub fn registered(&self) -> usize {
        self.handlers.read().unwrap().len()
    }

    pub(crate) fn handler_for(
        &self,
        token: Token,
    ) -> Option<(Arc<dyn EventHandler + Send + Sync>, Interest)> {
        let handlers = self.handlers.read().unwrap();
        handlers
            .get(&token)
            .map(|entry| (Arc::clone(&entry.handler), entry.interest))
    }

    pub(crate) fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    struct NoopHandler;
    impl EventHandler for NoopHandler {
        fn handle_event(&self, _event: &Event) {}
    }

    #[test]
    fn poll_returns_on_timeout() {
        let poller = PollHandle::new().unwrap();
        let mut events = Events::with_capacity(16);
        let n = poller
            .poll(&mut events, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn waker_token_is_reserved() {
        let poller = PollHandle::new().unwrap();
        let mut listener =
            mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = poller.register(&mut listener, WAKER_TOKEN, Interest::READABLE, NoopHandler);
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_token_is_rejected() {
        let poller = PollHandle::new().unwrap();
        let mut a = mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut b = mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        poller
            .register(&mut a, Token(1), Interest::READABLE, NoopHandler)
            .unwrap();
        assert!(poller
            .register(&mut b, Token(1), Interest::READABLE, NoopHandler)
            .is_err());
        assert_eq!(poller.registered(), 1);
    }

    #[test]
    fn deregister_clears_the_entry() {
        let poller = PollHandle::new().unwrap();
        let mut listener =
            mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        poller
            .register(&mut listener, Token(1), Interest::READABLE, NoopHandler)
            .unwrap();
        assert_eq!(poller.registered(), 1);
        poller.deregister(&mut listener, Token(1)).unwrap();
        assert_eq!(poller.registered(), 0);
    }
}
