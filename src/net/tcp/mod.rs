//! Callback-driven TCP endpoints with lockfree connection management.
//!
//! A [`Tcp`] endpoint is bound to an event loop and hands out [`Connection`]
//! handles through its callbacks. Each connection gets a loop-unique id; its
//! state lives in a lockfree map so worker threads can reach it without
//! blocking each other.
//!
//! ```text
//! Connection storage:
//!   LockfreeMap<u64, ConnState>
//!        │
//!        ├──> id 1 ──> ConnState { stream, token, write queue, callbacks }
//!        ├──> id 2 ──> ConnState { stream, token, write queue, callbacks }
//!        └──> id N ──> ConnState { stream, token, write queue, callbacks }
//! ```
//!
//! ## Event pipeline
//!
//! ```text
//! 1. Listener readiness:
//!    accept() until WouldBlock ──> insert ConnState ──> register stream
//!        ──> invoke the listen callback with a Connection handle
//!
//! 2. Connection readiness:
//!    writable ──> finish a pending connect (take_error checked), then
//!                 flush the write queue, firing completions in FIFO order
//!    readable ──> read into pooled buffers until WouldBlock and feed each
//!                 chunk to the read_start callback; EOF tears down
//!
//! 3. Teardown (EOF, I/O error, close()):
//!    remove from map ──> deregister ──> run the close callback
//! ```
//!
//! ## Write completion
//!
//! `Connection::write(data, on_complete)` follows the usual completion-
//! callback contract: bytes the socket accepts immediately are written on the
//! caller's thread; the remainder is queued and flushed on writable readiness.
//! The completion closure runs exactly once, after the last byte of that write
//! has been handed to the kernel.
//!
//! ## Example
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
//!     weir_io::run()
//! }
//! ```

pub mod config;
pub mod traits;

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex};

use lockfree::map::Map as LockfreeMap;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Token};

use crate::buffer_pool::BufferPool;
use crate::error::Result;
use crate::event::Event;
use crate::net::errors::NetworkError;
use crate::{default_loop, EventHandler, EventLoop};
use config::TcpConfig;
use traits::{ConnectionId, LogLevel, Logger};

type ConnectCallback = Box<dyn FnOnce(Connection) + Send>;
type WriteCallback = Box<dyn FnOnce() + Send>;
type CloseCallback = Box<dyn FnOnce() + Send>;
type ReadCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// A TCP endpoint bound to an event loop.
///
/// One endpoint can listen and open outbound connections; everything it
/// creates shares its config, buffer pool and logger.
pub struct Tcp {
    shared: Arc<Shared>,
}

impl Tcp {
    /// Endpoint on the process-wide default loop with default config.
    pub fn new() -> Result<Self> {
        Ok(Self::with_loop_and_config(
            default_loop()?,
            TcpConfig::default(),
        ))
    }

    /// Endpoint on the process-wide default loop with the given config.
    pub fn with_config(config: TcpConfig) -> Result<Self> {
        Ok(Self::with_loop_and_config(default_loop()?, config))
    }

    /// Endpoint on an explicit loop with default config.
    pub fn with_loop(event_loop: Arc<EventLoop>) -> Self {
        Self::with_loop_and_config(event_loop, TcpConfig::default())
    }

    pub fn with_loop_and_config(event_loop: Arc<EventLoop>, config: TcpConfig) -> Self {
        let buffer_pool = BufferPool::new(20, config.buffer_size);
        let logger = config.logger.clone();
        Tcp {
            shared: Arc::new(Shared {
                event_loop,
                connections: LockfreeMap::new(),
                buffer_pool,
                logger,
                config,
            }),
        }
    }

    /// Binds `config.bind_addr:port` and invokes `on_connect` with a handle
    /// for every accepted connection.
    ///
    /// Returns the actual local address, so `port` 0 picks a free port. The
    /// callback runs on worker threads and may fire concurrently for
    /// different connections.
    pub fn listen<F>(&self, port: u16, on_connect: F) -> Result<SocketAddr>
    where
        F: Fn(Connection) + Send + Sync + 'static,
    {
        let addr = SocketAddr::new(self.shared.config.bind_addr, port);
        let listener = TcpListener::bind(addr).map_err(NetworkError::Accept)?;
        let local_addr = listener.local_addr()?;
        let listener = Arc::new(Mutex::new(listener));

        let token = self.shared.event_loop.next_token();
        let handler = ListenerHandler {
            listener: Arc::clone(&listener),
            shared: Arc::clone(&self.shared),
            on_connect: Arc::new(on_connect),
        };

        self.shared.event_loop.register(
            &mut *listener.lock().unwrap(),
            token,
            Interest::READABLE,
            handler,
        )?;

        self.shared
            .logger
            .log(LogLevel::Info, &format!("Listening on {}", local_addr));
        Ok(local_addr)
    }

    /// Opens a non-blocking connection to `host:port`; `on_connect` fires
    /// once the connection is established.
    ///
    /// On connection failure (e.g. refused) the callback never fires and the
    /// error is reported through the logger, matching the fire-and-observe
    /// shape of the listen side.
    pub fn connect<F>(&self, host: &str, port: u16, on_connect: F) -> Result<()>
    where
        F: FnOnce(Connection) + Send + 'static,
    {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(NetworkError::Connect)?
            .next()
            .ok_or_else(|| {
                NetworkError::Configuration(format!("no usable address for {host}:{port}"))
            })?;

        let stream = TcpStream::connect(addr).map_err(NetworkError::Connect)?;
        let token = self.shared.event_loop.next_token();
        let id = token.0 as u64;

        self.shared
            .connections
            .insert(id, ConnState::connecting(stream, token, Box::new(on_connect)));

        if let Err(e) = self.shared.register_conn(id, token) {
            self.shared.connections.remove(&id);
            return Err(e);
        }

        self.shared
            .logger
            .log(LogLevel::Debug, &format!("Connecting to {addr} (id {id})"));
        Ok(())
    }

    /// Number of live connections created by this endpoint.
    pub fn connection_count(&self) -> usize {
        self.shared.connections.iter().count()
    }
}

/// Cloneable handle to one established connection.
///
/// This is what the listen and connect callbacks receive. Handles stay valid
/// after the `Tcp` that created them is dropped; operations on a torn-down
/// connection return [`NetworkError::ConnectionClosed`].
#[derive(Clone)]
pub struct Connection {
    id: u64,
    shared: Arc<Shared>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        ConnectionId::new(self.id)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        let guard = self.shared.connections.get(&self.id)?;
        let addr = *guard.val().peer_addr.lock().unwrap();
        addr
    }

    pub fn is_open(&self) -> bool {
        self.shared.connections.get(&self.id).is_some()
    }

    /// Writes `data`, invoking `on_complete` exactly once when every byte has
    /// been handed to the kernel.
    ///
    /// Whatever the socket accepts immediately is written on the calling
    /// thread; the rest is queued and flushed on writable readiness.
    /// Completions fire in submission order.
    pub fn write<F>(&self, data: &[u8], on_complete: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.write(self.id, data, Box::new(on_complete))
    }

    /// Fire-and-forget write.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        self.shared.write(self.id, data, Box::new(|| {}))
    }

    /// Installs the data callback and starts reading.
    ///
    /// Until this is called no reads are issued; bytes that arrived earlier
    /// are drained immediately, since readiness for them will not fire again.
    pub fn read_start<F>(&self, on_data: F) -> Result<()>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        {
            let Some(guard) = self.shared.connections.get(&self.id) else {
                return Err(NetworkError::ConnectionClosed(self.id()).into());
            };
            *guard.val().read_cb.lock().unwrap() = Some(Arc::new(on_data));
        }
        self.shared.handle_readable(self.id);
        Ok(())
    }

    /// Registers a callback that fires once when the connection is torn down,
    /// whether by EOF, an I/O error or [`close`](Self::close).
    pub fn on_close<F>(&self, on_close: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(guard) = self.shared.connections.get(&self.id) else {
            return Err(NetworkError::ConnectionClosed(self.id()).into());
        };
        *guard.val().close_cb.lock().unwrap() = Some(Box::new(on_close));
        Ok(())
    }

    /// Tears the connection down. Queued writes that were not yet flushed are
    /// discarded and their completions never fire.
    pub fn close(&self) {
        self.shared.teardown(self.id);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr())
            .field("open", &self.is_open())
            .finish()
    }
}

/// State shared by an endpoint, its handlers and its connection handles.
struct Shared {
    event_loop: Arc<EventLoop>,
    connections: LockfreeMap<u64, ConnState>,
    buffer_pool: BufferPool,
    logger: Arc<dyn Logger>,
    config: TcpConfig,
}

/// Per-connection state stored in the lockfree map.
struct ConnState {
    stream: Mutex<TcpStream>,
    token: Token,
    peer_addr: Mutex<Option<SocketAddr>>,
    write_queue: Mutex<VecDeque<PendingWrite>>,
    read_cb: Mutex<Option<ReadCallback>>,
    // Held across a whole readable drain so chunks stay in stream order.
    read_lock: Mutex<()>,
    close_cb: Mutex<Option<CloseCallback>>,
    // Present while a non-blocking connect is still in flight.
    pending_connect: Mutex<Option<ConnectCallback>>,
}

impl ConnState {
    fn accepted(stream: TcpStream, token: Token, peer_addr: SocketAddr) -> Self {
        Self {
            stream: Mutex::new(stream),
            token,
            peer_addr: Mutex::new(Some(peer_addr)),
            write_queue: Mutex::new(VecDeque::new()),
            read_cb: Mutex::new(None),
            read_lock: Mutex::new(()),
            close_cb: Mutex::new(None),
            pending_connect: Mutex::new(None),
        }
    }

    fn connecting(stream: TcpStream, token: Token, on_connect: ConnectCallback) -> Self {
        Self {
            stream: Mutex::new(stream),
            token,
            peer_addr: Mutex::new(None),
            write_queue: Mutex::new(VecDeque::new()),
            read_cb: Mutex::new(None),
            read_lock: Mutex::new(()),
            close_cb: Mutex::new(None),
            pending_connect: Mutex::new(Some(on_connect)),
        }
    }
}

struct PendingWrite {
    data: Vec<u8>,
    pos: usize,
    on_complete: Option<WriteCallback>,
}

impl Shared {
    /// Registers an already-inserted connection with the loop.
    fn register_conn(self: &Arc<Self>, id: u64, token: Token) -> Result<()> {
        let Some(guard) = self.connections.get(&id) else {
            return Err(NetworkError::ConnectionClosed(ConnectionId::new(id)).into());
        };
        let result = self.event_loop.register(
            &mut *guard.val().stream.lock().unwrap(),
            token,
            Interest::READABLE | Interest::WRITABLE,
            ConnHandler {
                id,
                shared: Arc::clone(self),
            },
        );
        result
    }

    fn write(&self, id: u64, data: &[u8], on_complete: WriteCallback) -> Result<()> {
        let mut on_complete = Some(on_complete);
        let mut fire_now = false;

        {
            let Some(guard) = self.connections.get(&id) else {
                return Err(NetworkError::ConnectionClosed(ConnectionId::new(id)).into());
            };
            let conn = guard.val();
            let mut queue = conn.write_queue.lock().unwrap();

            if queue.is_empty() {
                // Fast path: hand the socket as much as it takes right now.
                let mut stream = conn.stream.lock().unwrap();
                let mut pos = 0;
                loop {
                    if pos == data.len() {
                        fire_now = true;
                        break;
                    }
                    match stream.write(&data[pos..]) {
                        Ok(0) => {
                            return Err(NetworkError::Io(io::Error::new(
                                io::ErrorKind::WriteZero,
                                "socket accepted zero bytes",
                            ))
                            .into());
                        }
                        Ok(n) => pos += n,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            queue.push_back(PendingWrite {
                                data: data[pos..].to_vec(),
                                pos: 0,
                                on_complete: on_complete.take(),
                            });
                            break;
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(NetworkError::Io(e).into()),
                    }
                }
            } else {
                // Earlier writes are still queued; keep FIFO order.
                queue.push_back(PendingWrite {
                    data: data.to_vec(),
                    pos: 0,
                    on_complete: on_complete.take(),
                });
            }
        }

        if fire_now {
            if let Some(cb) = on_complete.take() {
                cb();
            }
        }
        Ok(())
    }

    fn handle_writable(self: &Arc<Self>, id: u64) {
        if let Some(cb) = self.take_pending_connect(id) {
            match self.finish_connect(id) {
                ConnectProgress::Established(addr) => {
                    self.logger
                        .log(LogLevel::Info, &format!("Connected to {addr} (id {id})"));
                    cb(Connection {
                        id,
                        shared: Arc::clone(self),
                    });
                }
                ConnectProgress::StillPending => {
                    // Spurious wakeup; put the callback back and wait.
                    if let Some(guard) = self.connections.get(&id) {
                        *guard.val().pending_connect.lock().unwrap() = Some(cb);
                    }
                    return;
                }
                ConnectProgress::Failed(e) => {
                    self.logger
                        .log(LogLevel::Error, &format!("Connect failed (id {id}): {e}"));
                    self.teardown(id);
                    return;
                }
            }
        }

        self.flush_writes(id);
    }

    fn take_pending_connect(&self, id: u64) -> Option<ConnectCallback> {
        let guard = self.connections.get(&id)?;
        let cb = guard.val().pending_connect.lock().unwrap().take();
        cb
    }

    fn finish_connect(&self, id: u64) -> ConnectProgress {
        let Some(guard) = self.connections.get(&id) else {
            return ConnectProgress::Failed(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection disappeared before establishing",
            ));
        };
        let conn = guard.val();
        let stream = conn.stream.lock().unwrap();

        match stream.take_error() {
            Ok(Some(e)) | Err(e) => return ConnectProgress::Failed(e),
            Ok(None) => {}
        }

        match stream.peer_addr() {
            Ok(addr) => {
                *conn.peer_addr.lock().unwrap() = Some(addr);
                if let Err(e) = stream.set_nodelay(self.config.no_delay) {
                    self.logger
                        .log(LogLevel::Error, &format!("Failed to set TCP_NODELAY: {e}"));
                }
                ConnectProgress::Established(addr)
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => ConnectProgress::StillPending,
            Err(e) => ConnectProgress::Failed(e),
        }
    }

    /// Drains the write queue as far as the socket allows, then runs the
    /// completion callbacks of fully flushed writes outside every lock.
    fn flush_writes(&self, id: u64) {
        let mut completed: Vec<WriteCallback> = Vec::new();
        let mut failed: Option<io::Error> = None;

        {
            let Some(guard) = self.connections.get(&id) else {
                return;
            };
            let conn = guard.val();
            let mut queue = conn.write_queue.lock().unwrap();
            let mut stream = conn.stream.lock().unwrap();

            loop {
                let write_result = {
                    let Some(front) = queue.front_mut() else { break };
                    stream.write(&front.data[front.pos..])
                };

                match write_result {
                    Ok(0) => {
                        failed = Some(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "socket accepted zero bytes",
                        ));
                        break;
                    }
                    Ok(n) => {
                        let finished = {
                            let front = queue.front_mut().expect("queue checked above");
                            front.pos += n;
                            front.pos == front.data.len()
                        };
                        if finished {
                            let done = queue.pop_front().expect("queue checked above");
                            if let Some(cb) = done.on_complete {
                                completed.push(cb);
                            }
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        failed = Some(e);
                        break;
                    }
                }
            }
        }

        for cb in completed {
            cb();
        }

        if let Some(e) = failed {
            self.logger
                .log(LogLevel::Error, &format!("Write error (id {id}): {e}"));
            self.teardown(id);
        }
    }

    /// Reads until `WouldBlock`, feeding each chunk to the data callback.
    /// No callback installed means no reads are issued at all.
    fn handle_readable(&self, id: u64) {
        let Some(guard) = self.connections.get(&id) else {
            return;
        };
        let conn = guard.val();
        // One drain at a time per connection: a second readable edge landing
        // on another worker must not interleave its chunks with this one's,
        // or the data callback would see the stream out of order.
        let _drain = conn.read_lock.lock().unwrap();

        loop {
            // Torn down mid-drain by the callback or another thread.
            if self.connections.get(&id).is_none() {
                return;
            }
            let read_cb = conn.read_cb.lock().unwrap().clone();
            let Some(read_cb) = read_cb else {
                return;
            };

            let mut buffer = self.buffer_pool.acquire();
            let read_result = conn.stream.lock().unwrap().read(&mut buffer);

            match read_result {
                Ok(0) => {
                    // EOF
                    self.teardown(id);
                    return;
                }
                Ok(n) => read_cb(&buffer[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.logger
                        .log(LogLevel::Error, &format!("Read error (id {id}): {e}"));
                    self.teardown(id);
                    return;
                }
            }
        }
    }

    fn teardown(&self, id: u64) {
        if let Some(removed) = self.connections.remove(&id) {
            let conn = removed.val();
            let _ = self
                .event_loop
                .deregister(&mut *conn.stream.lock().unwrap(), conn.token);
            let close_cb = conn.close_cb.lock().unwrap().take();

            self.logger
                .log(LogLevel::Info, &format!("Connection closed (id {id})"));

            if let Some(cb) = close_cb {
                cb();
            }
        }
    }
}

enum ConnectProgress {
    Established(SocketAddr),
    StillPending,
    Failed(io::Error),
}

/// Accept handler registered for a listening socket.
struct ListenerHandler {
    listener: Arc<Mutex<TcpListener>>,
    shared: Arc<Shared>,
    on_connect: Arc<dyn Fn(Connection) + Send + Sync>,
}

impl EventHandler for ListenerHandler {
    fn handle_event(&self, event: &Event) {
        if !event.is_readable() {
            return;
        }

        loop {
            match self.listener.lock().unwrap().accept() {
                Ok((stream, peer_addr)) => self.accept_one(stream, peer_addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.shared
                        .logger
                        .log(LogLevel::Error, &format!("Accept error: {e}"));
                    break;
                }
            }
        }
    }
}

impl ListenerHandler {
    fn accept_one(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let shared = &self.shared;

        if let Some(max) = shared.config.max_connections {
            if shared.connections.iter().count() >= max {
                let err = NetworkError::MaxConnectionsReached(peer_addr);
                shared.logger.log(LogLevel::Warn, &err.to_string());
                // Dropping the stream closes it.
                return;
            }
        }

        if let Err(e) = stream.set_nodelay(shared.config.no_delay) {
            shared
                .logger
                .log(LogLevel::Error, &format!("Failed to set TCP_NODELAY: {e}"));
        }

        let token = shared.event_loop.next_token();
        let id = token.0 as u64;

        shared
            .connections
            .insert(id, ConnState::accepted(stream, token, peer_addr));

        if let Err(e) = shared.register_conn(id, token) {
            shared
                .logger
                .log(LogLevel::Error, &format!("Failed to register connection: {e}"));
            shared.connections.remove(&id);
            return;
        }

        shared.logger.log(
            LogLevel::Info,
            &format!("New connection: {peer_addr} (id {id})"),
        );

        (self.on_connect)(Connection {
            id,
            shared: Arc::clone(shared),
        });
    }
}

/// Readiness handler for one connection.
struct ConnHandler {
    id: u64,
    shared: Arc<Shared>,
}

impl EventHandler for ConnHandler {
    fn handle_event(&self, event: &Event) {
        if event.is_writable() {
            self.shared.handle_writable(self.id);
        }
        if event.is_readable() {
            self.shared.handle_readable(self.id);
        }
    }
}
