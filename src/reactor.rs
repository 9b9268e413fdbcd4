use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use mio::Events;

use crate::{
    error::Result,
    event::Event,
    poll::{PollHandle, WAKER_TOKEN},
    thread_pool::ThreadPool,
};

pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 150;

/// Core poll-and-dispatch loop.
///
/// The reactor polls for readiness, snapshots each event and hands it to the
/// thread pool, where the handler registered for the event's token runs. The
/// loop keeps going until it is stopped or until nothing is registered any
/// more; a loop with no sources has no work left to wait for.
pub struct Reactor {
    pub(crate) poll_handle: PollHandle,
    pool: ThreadPool,
    running: Arc<AtomicBool>,
    events_capacity: usize,
    poll_timeout: Duration,
}

impl Reactor {
    pub fn new(pool_size: usize, events_capacity: usize, poll_timeout_ms: u64) -> Result<Self> {
        Ok(Self {
            poll_handle: PollHandle::new()?,
            pool: ThreadPool::new(pool_size),
            running: Arc::new(AtomicBool::new(false)),
            events_capacity,
            poll_timeout: Duration::from_millis(poll_timeout_ms),
        })
    }

    pub fn run(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);

        let mut events = Events::with_capacity(self.events_capacity);
        while self.running.load(Ordering::SeqCst) {
            if self.poll_handle.registered() == 0 {
                break;
            }

            self.poll_handle.poll(&mut events, Some(self.poll_timeout))?;

            for event in events.iter() {
                if event.token() == WAKER_TOKEN {
                    continue;
                }
                self.dispatch(Event::from(event))?;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn dispatch(&self, event: Event) -> Result<()> {
        // The source may have been deregistered between poll and dispatch.
        let Some((handler, interest)) = self.poll_handle.handler_for(event.token()) else {
            return Ok(());
        };

        if (interest.is_readable() && event.is_readable())
            || (interest.is_writable() && event.is_writable())
        {
            self.pool.exec(move || handler.handle_event(&event))?;
        }
        Ok(())
    }

    pub fn get_shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            waker: self.poll_handle.waker(),
        }
    }
}

/// Thread-safe stop signal for a running reactor.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    waker: Arc<mio::Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Wake failure only means the loop notices on its next timeout.
        let _ = self.waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EventHandler;
    use mio::{Interest, Token};
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    struct CountingHandler {
        counter: Arc<AtomicUsize>,
    }

    impl EventHandler for CountingHandler {
        fn handle_event(&self, _event: &Event) {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn reactor_creation() {
        assert!(Reactor::new(4, 1024, 100).is_ok());
    }

    #[test]
    fn run_returns_when_nothing_is_registered() {
        let reactor = Reactor::new(2, 64, 10).unwrap();
        reactor.run().unwrap();
    }

    #[test]
    fn event_dispatch_reaches_the_handler() {
        let reactor = Reactor::new(2, 64, 10).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut listener =
            mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        reactor
            .poll_handle
            .register(
                &mut listener,
                Token(1),
                Interest::READABLE,
                CountingHandler {
                    counter: counter.clone(),
                },
            )
            .unwrap();

        reactor
            .dispatch(Event::new(Token(1), true, false))
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_filters_on_registered_interest() {
        let reactor = Reactor::new(2, 64, 10).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut listener =
            mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        reactor
            .poll_handle
            .register(
                &mut listener,
                Token(1),
                Interest::READABLE,
                CountingHandler {
                    counter: counter.clone(),
                },
            )
            .unwrap();

        // Writable-only readiness must not reach a READABLE registration,
        // and unknown tokens are ignored.
        reactor
            .dispatch(Event::new(Token(1), false, true))
            .unwrap();
        reactor
            .dispatch(Event::new(Token(9), true, false))
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_stops_a_running_reactor() {
        let reactor = Arc::new(Reactor::new(2, 64, 50).unwrap());
        let mut listener =
            mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        // Keep something registered so the loop does not exit on its own.
        reactor
            .poll_handle
            .register(
                &mut listener,
                Token(1),
                Interest::READABLE,
                CountingHandler {
                    counter: Arc::new(AtomicUsize::new(0)),
                },
            )
            .unwrap();

        let shutdown = reactor.get_shutdown_handle();
        let runner = Arc::clone(&reactor);
        let handle = std::thread::spawn(move || runner.run().unwrap());

        std::thread::sleep(Duration::from_millis(100));
        shutdown.shutdown();
        handle.join().unwrap();
    }
}
