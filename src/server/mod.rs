//! HTTP server implementation for rawhttp.
//!
//! This module provides the socket layer, the response builder, the exact
//! path router and the accept loop that ties them to the parser.

mod response;
mod config;
mod error;
mod handler;
mod http_server;
mod registry;
mod socket;
mod tests;

// Re-export public items
pub use response::{ResponseBuilder, StatusCode};
pub use config::{ServerConfig, DEFAULT_BACKLOG};
pub use error::Error;
pub use handler::{Handler, Router};
pub use http_server::{HttpServer, ServerState, ShutdownHandle};
pub use registry::ActiveConnections;
pub use socket::{Connection, ConnectionId, Listener, ListenerCloser, Socket};
