/// Unique identifier for connections.
///
/// Every accepted or established connection gets an id derived from its poll
/// token, so ids are unique for the lifetime of the event loop. Handles carry
/// the id; user code can use it as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        ConnectionId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Log levels for network events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger trait for network events
///
/// Library users can implement this trait to handle logging however they
/// prefer; the library itself stays uncoupled from any logging framework.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Default no-op logger that discards all messages
#[derive(Default, Clone)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&self, _level: LogLevel, _message: &str) {
        // Do nothing
    }
}

/// Logger that prints warnings and errors to stderr, info to stdout.
#[derive(Default, Clone)]
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Warn | LogLevel::Error => eprintln!("[{:?}] {}", level, message),
            _ => println!("[{:?}] {}", level, message),
        }
    }
}
