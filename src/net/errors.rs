use crate::net::tcp::traits::ConnectionId;
use mio::Token;
use std::fmt;
use std::io;
use std::net::SocketAddr;

#[derive(Debug)]
pub enum NetworkError {
    Io(io::Error),
    Accept(io::Error),
    Connect(io::Error),
    ConnectionClosed(ConnectionId),
    TokenInUse(Token),
    MaxConnectionsReached(SocketAddr),
    Configuration(String),
    Other(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Io(e) => write!(f, "IO Error: {}", e),
            NetworkError::Accept(e) => write!(f, "Accept Error: {}", e),
            NetworkError::Connect(e) => write!(f, "Connect Error: {}", e),
            NetworkError::ConnectionClosed(id) => {
                write!(f, "Connection {:?} is closed", id)
            }
            NetworkError::TokenInUse(token) => {
                write!(f, "Token {:?} is reserved or already registered", token)
            }
            NetworkError::MaxConnectionsReached(addr) => {
                write!(f, "Max connections reached, rejecting {}", addr)
            }
            NetworkError::Configuration(msg) => write!(f, "Configuration Error: {}", msg),
            NetworkError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetworkError::Io(e) | NetworkError::Accept(e) | NetworkError::Connect(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for NetworkError {
    fn from(err: io::Error) -> Self {
        NetworkError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_message_names_the_peer() {
        let addr: SocketAddr = "10.0.0.1:9999".parse().unwrap();
        let msg = NetworkError::MaxConnectionsReached(addr).to_string();
        assert!(msg.contains("10.0.0.1:9999"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = NetworkError::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
