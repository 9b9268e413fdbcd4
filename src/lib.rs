//! # weir-io
//!
//! Callback-driven TCP endpoints on a small reactor-based event loop, built
//! on top of [`mio`] with no async runtime underneath.
//!
//! The surface is the classic evented-I/O shape: construct an endpoint,
//! register callbacks, then hand control to a blocking run call that drives
//! them.
//!
//! ```rust,no_run
//! use weir_io::net::tcp::Tcp;
//!
//! fn main() -> weir_io::error::Result<()> {
//!     let server = Tcp::new()?;
//!     server.listen(8080, |client| {
//!         println!("connected!");
//!         let res = client.write(b"HTTP/1.0 500 OK\r\n\r\nHello world!", || {
//!             println!("written!");
//!         });
//!         if let Err(e) = res {
//!             eprintln!("write failed: {e}");
//!         }
//!     })?;
//!
//!     // Blocks until every registered handle is gone or the loop is stopped.
//!     weir_io::run()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌─────────────┐
//! │ EventLoop   │───▶│   Reactor    │───▶│ PollHandle  │
//! └─────────────┘    └──────────────┘    └─────────────┘
//!                            │
//!                            ▼
//!                    ┌──────────────┐    ┌─────────────┐
//!                    │ ThreadPool   │───▶│   Workers   │
//!                    └──────────────┘    └─────────────┘
//! ```
//!
//! The reactor polls for readiness and dispatches each event to a worker
//! thread, which runs the handler registered for the event's token. The
//! [`net::tcp`] module layers listen/connect/write-with-completion callbacks
//! on top of that machinery.
//!
//! - [`EventLoop`]: registration surface and the blocking `run`
//! - [`net::tcp::Tcp`]: TCP endpoints with closure callbacks
//! - [`default_loop`] / [`run`]: the process-wide loop most programs use

use std::result::Result as StdResult;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, LazyLock,
};

use mio::{Interest, Token};

pub mod buffer_pool;
pub mod error;
pub mod event;
pub mod handler;
pub mod net;
pub mod poll;
pub mod reactor;
pub mod thread_pool;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use event::Event;
pub use handler::EventHandler;

use crate::{
    error::Result,
    net::errors::NetworkError,
    reactor::{DEFAULT_EVENTS_CAPACITY, DEFAULT_POLL_TIMEOUT_MS},
    thread_pool::DEFAULT_POOL_CAPACITY,
};

/// Re-exports of the items most programs need.
pub mod prelude {
    pub use crate::error::Result;
    pub use crate::net::tcp::config::TcpConfig;
    pub use crate::net::tcp::traits::{ConnectionId, LogLevel, Logger};
    pub use crate::net::tcp::{Connection, Tcp};
    pub use crate::{default_loop, run, EventLoop};
}

/// The event loop: registration surface plus the blocking poll/dispatch run.
///
/// Registered sources are identified by [`Token`]s handed out by
/// [`next_token`](Self::next_token). `run` blocks until [`stop`](Self::stop)
/// is called or the last source is deregistered; a loop that has nothing
/// registered returns immediately, so registration comes first, then `run`.
pub struct EventLoop {
    reactor: reactor::Reactor,
    next_token: AtomicUsize,
}

impl Default for EventLoop {
    /// Default configuration: 4 workers, 1024 events per poll, 150 ms poll
    /// timeout.
    ///
    /// # Panics
    ///
    /// Panics if the OS poller cannot be initialized.
    fn default() -> Self {
        Self::new(
            DEFAULT_POOL_CAPACITY,
            DEFAULT_EVENTS_CAPACITY,
            DEFAULT_POLL_TIMEOUT_MS,
        )
        .expect("failed to initialize default event loop")
    }
}

impl EventLoop {
    /// Creates an event loop with `workers` dispatch threads, room for
    /// `events_capacity` events per poll and the given poll timeout.
    pub fn new(workers: usize, events_capacity: usize, poll_timeout_ms: u64) -> Result<Self> {
        let reactor = reactor::Reactor::new(workers, events_capacity, poll_timeout_ms)?;
        Ok(Self {
            reactor,
            // Token(0) is the waker.
            next_token: AtomicUsize::new(1),
        })
    }

    /// Hands out a loop-unique token for registering a source.
    pub fn next_token(&self) -> Token {
        Token(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers an I/O source; `handler` runs on a worker thread whenever
    /// the source is ready for one of `interests`.
    ///
    /// Fails if the token is already in use.
    pub fn register<H, S>(
        &self,
        source: &mut S,
        token: Token,
        interests: Interest,
        handler: H,
    ) -> Result<()>
    where
        H: EventHandler + Send + Sync + 'static,
        S: mio::event::Source + ?Sized,
    {
        self.reactor
            .poll_handle
            .register(source, token, interests, handler)
    }

    /// Removes a source; no more events are delivered for it. Deregistering
    /// the last source lets `run` return.
    pub fn deregister<S>(&self, source: &mut S, token: Token) -> Result<()>
    where
        S: mio::event::Source + ?Sized,
    {
        self.reactor.poll_handle.deregister(source, token)
    }

    /// Number of currently registered sources.
    pub fn registered(&self) -> usize {
        self.reactor.poll_handle.registered()
    }

    /// Runs the loop on the calling thread, blocking until [`stop`](Self::stop)
    /// is called or nothing is registered any more.
    pub fn run(&self) -> Result<()> {
        self.reactor.run()
    }

    /// Signals the loop to stop after its current polling cycle. Safe to call
    /// from any thread, including handlers.
    pub fn stop(&self) {
        self.reactor.get_shutdown_handle().shutdown();
    }
}

// The init error is kept as a string because the error type behind the crate
// Result alias is not Sync.
static DEFAULT_LOOP: LazyLock<StdResult<Arc<EventLoop>, String>> = LazyLock::new(|| {
    EventLoop::new(
        DEFAULT_POOL_CAPACITY,
        DEFAULT_EVENTS_CAPACITY,
        DEFAULT_POLL_TIMEOUT_MS,
    )
    .map(Arc::new)
    .map_err(|e| e.to_string())
});

/// The process-wide default loop. Endpoints created with
/// [`net::tcp::Tcp::new`] register here.
pub fn default_loop() -> Result<Arc<EventLoop>> {
    match &*DEFAULT_LOOP {
        Ok(event_loop) => Ok(Arc::clone(event_loop)),
        Err(e) => Err(NetworkError::Other(e.clone()).into()),
    }
}

/// Runs the default loop, blocking until everything registered on it is gone
/// or it is stopped.
pub fn run() -> Result<()> {
    default_loop()?.run()
}
