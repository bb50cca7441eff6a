//! Server configuration.

use crate::server::error::Error;

/// Pending connections the OS queues before `accept` picks them up.
pub const DEFAULT_BACKLOG: u32 = 20;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to, as `"ip:port"` with a dotted-decimal IPv4 address.
    pub addr: String,
    /// The listen backlog.
    pub backlog: u32,
    /// Size of each read from a connection.
    pub read_buffer_size: usize,
    /// Upper bound on the bytes buffered for a single request.
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            backlog: DEFAULT_BACKLOG,
            read_buffer_size: 5 * 1024,
            max_request_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Create a configuration for the given `"ip:port"` address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Self::default()
        }
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_max_request_size(mut self, size: usize) -> Self {
        self.max_request_size = size;
        self
    }

    /// Split the configured address into its host and port parts.
    ///
    /// The host is returned unvalidated; [`Socket::bind`](crate::server::Socket::bind)
    /// checks that it is a dotted-decimal IPv4 address.
    pub fn host_port(&self) -> Result<(&str, u16), Error> {
        let parts: Vec<&str> = self.addr.split(':').collect();
        let &[host, port] = parts.as_slice() else {
            return Err(Error::InvalidAddress(format!(
                "{addr}: expected ip:port, eg 0.0.0.0:8080",
                addr = self.addr
            )));
        };

        let port = port
            .parse::<u16>()
            .map_err(|e| Error::InvalidAddress(format!("{addr}: invalid port: {e}", addr = self.addr)))?;

        Ok((host, port))
    }
}
