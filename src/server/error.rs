//! Error types for the HTTP server.

use std::net::SocketAddrV4;

use thiserror::Error;

use crate::parser::Error as ParserError;

/// Errors that can occur during HTTP server operation.
#[derive(Debug, Error)]
pub enum Error {
    /// The bind address is empty, malformed, or not an IPv4 address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The OS refused to create a socket.
    #[error("Socket creation error: {0}")]
    SocketCreationError(#[source] std::io::Error),

    /// Binding the socket to its address failed.
    #[error("Bind error on {addr}: {source}")]
    BindError {
        addr: SocketAddrV4,
        #[source]
        source: std::io::Error,
    },

    /// Marking the socket as listening failed.
    #[error("Listen error: {0}")]
    ListenError(#[source] std::io::Error),

    /// Accepting a connection failed.
    #[error("Accept error: {0}")]
    AcceptError(#[source] std::io::Error),

    /// The listener was closed. This is how a deliberate shutdown surfaces
    /// from `accept`.
    #[error("Listener closed")]
    ListenerClosed,

    /// Shutdown was requested while the server was not listening.
    #[error("Server is not listening")]
    NotListening,

    /// Reading a request from a connection failed.
    #[error("Read error: {0}")]
    ReadError(#[source] std::io::Error),

    /// The request grew past the configured maximum size.
    #[error("Request exceeds {0} bytes")]
    RequestTooLarge(usize),

    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// Writing the response failed.
    #[error("Write error: {0}")]
    WriteError(#[source] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
