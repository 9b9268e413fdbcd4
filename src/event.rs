use mio::Token;
use std::fmt;

/// Owned snapshot of a [`mio::event::Event`].
///
/// mio's event type borrows from the poll buffer and cannot be cloned, so the
/// reactor copies the fields it dispatches on into this struct before handing
/// the event to a worker thread.
#[derive(Clone, Copy)]
pub struct Event {
    token: Token,
    readable: bool,
    writable: bool,
}

impl Event {
    pub fn new(token: Token, readable: bool, writable: bool) -> Self {
        Self {
            token,
            readable,
            writable,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("token", &self.token)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish()
    }
}

impl From<&mio::event::Event> for Event {
    fn from(event: &mio::event::Event) -> Self {
        Self {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
        }
    }
}
