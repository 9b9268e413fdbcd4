use std::{net::IpAddr, net::Ipv4Addr, sync::Arc};

use crate::net::tcp::traits::{Logger, NoOpLogger};

/// Configuration for TCP endpoints.
///
/// Controls bind host, buffer sizes, connection limits and socket options for
/// endpoints created from this config. Use TcpConfig::builder() for ergonomic
/// construction.
///
/// ## Socket Options
///
/// - no_delay: When enabled (default), disables Nagle's algorithm for lower latency
///
/// ## Resource Limits
///
/// - buffer_size: Size of read buffers borrowed from the pool
/// - max_connections: Hard limit on concurrent connections (None for unlimited)
#[derive(Clone)]
pub struct TcpConfig {
    /// Host address `listen` binds to; the port comes from the `listen` call
    pub bind_addr: IpAddr,
    /// Size of connection read buffers
    pub buffer_size: usize,
    /// Maximum number of concurrent connections
    pub max_connections: Option<usize>,
    /// Enable TCP_NODELAY
    pub no_delay: bool,
    /// Logger for network events
    pub logger: Arc<dyn Logger>,
}

impl TcpConfig {
    /// Create a new builder for TcpConfig
    pub fn builder() -> TcpConfigBuilder {
        TcpConfigBuilder::new()
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            buffer_size: 8192,
            max_connections: None,
            no_delay: true,
            logger: Arc::new(NoOpLogger),
        }
    }
}

/// Builder for TcpConfig.
///
/// All fields are optional and fall back to TcpConfig::default() values.
pub struct TcpConfigBuilder {
    bind_addr: Option<IpAddr>,
    buffer_size: Option<usize>,
    max_connections: Option<usize>,
    no_delay: Option<bool>,
    logger: Option<Arc<dyn Logger>>,
}

impl TcpConfigBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: None,
            buffer_size: None,
            max_connections: None,
            no_delay: None,
            logger: None,
        }
    }

    /// Set the host address `listen` binds to
    pub fn bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Set the read buffer size for connections
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = Some(enabled);
        self
    }

    /// Set the logger implementation
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Build the TcpConfig
    pub fn build(self) -> TcpConfig {
        let default = TcpConfig::default();
        TcpConfig {
            bind_addr: self.bind_addr.unwrap_or(default.bind_addr),
            buffer_size: self.buffer_size.unwrap_or(default.buffer_size),
            max_connections: self.max_connections.or(default.max_connections),
            no_delay: self.no_delay.unwrap_or(default.no_delay),
            logger: self.logger.unwrap_or(default.logger),
        }
    }
}

impl Default for TcpConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_falls_back_to_defaults() {
        let config = TcpConfig::builder().build();
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.buffer_size, 8192);
        assert!(config.max_connections.is_none());
        assert!(config.no_delay);
    }

    #[test]
    fn builder_overrides_stick() {
        let config = TcpConfig::builder()
            .bind_addr(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .buffer_size(16384)
            .max_connections(100)
            .no_delay(false)
            .build();
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.buffer_size, 16384);
        assert_eq!(config.max_connections, Some(100));
        assert!(!config.no_delay);
    }
}
