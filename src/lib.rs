//! A minimal HTTP/1.x server built directly on TCP sockets.
//!
//! rawhttp owns every byte between the socket and the handler: it accepts
//! connections, parses requests with a small hand-written parser, dispatches
//! them by exact path and serializes responses itself. Each connection
//! carries exactly one request.
//!
//! # Deliberate simplifications
//!
//! - Header lines are split on whitespace, so `Accept: a, b` has the value
//!   tokens `a,` and `b`.
//! - Only the exact header names `Content-Length` and `host` are interpreted.
//! - Responses carry no automatic `Content-Length`; closing the connection
//!   marks the end of the body.
//! - A request that cannot be parsed is dropped without a response.
//! - No TLS, HTTP/2, keep-alive or chunked encoding.
//!
//! # Examples
//!
//! ## Parsing a request
//!
//! ```
//! use rawhttp::parse_request;
//!
//! let request = parse_request(b"GET /index.html HTTP/1.1\r\nAccept: text/html, */*\r\n\r\n").unwrap();
//!
//! assert_eq!(request.method.to_string(), "GET");
//! assert_eq!(request.path, "/index.html");
//! assert_eq!(request.version.to_string(), "HTTP/1.1");
//! assert_eq!(request.headers["Accept"], vec!["text/html,", "*/*"]);
//! ```
//!
//! ## Building a response
//!
//! ```
//! use rawhttp::ResponseBuilder;
//!
//! let mut response = ResponseBuilder::new();
//! response.version("HTTP/1.1");
//! response.write_header(200u16);
//! response.header().insert("X".to_string(), vec!["a".to_string(), "b".to_string()]);
//! response.write(b"ok");
//!
//! assert_eq!(response.marshal(), b"HTTP/1.1 200\r\nX:a,b\r\n\r\nok");
//! ```
//!
//! ## Running a server
//!
//! ```no_run
//! use rawhttp::{HttpRequest, HttpServer, ResponseBuilder, Router, ServerConfig};
//!
//! # async fn run() -> Result<(), rawhttp::ServerError> {
//! let mut router = Router::new();
//! router.handle_fn("/", |response: &mut ResponseBuilder, _request: &HttpRequest| {
//!     response.write(b"home page");
//! });
//!
//! let server = HttpServer::bind(ServerConfig::new("127.0.0.1:8080"), router)?;
//! let shutdown = server.shutdown_handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     let _ = shutdown.shutdown();
//! });
//! server.serve().await
//! # }
//! ```

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, is_complete, parse_request, Framing, RequestFramer};
pub use server::{
    Error as ServerError, Handler, HttpServer, ResponseBuilder, Router, ServerConfig, ServerState,
    ShutdownHandle, StatusCode,
};
