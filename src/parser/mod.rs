//! Simplified HTTP/1.x request parser.
//!
//! This parser intentionally implements a small, non-compliant subset of the
//! HTTP/1.x message syntax. Header lines are split on whitespace rather than
//! on the first colon, only the exact names `Content-Length` and `host` are
//! interpreted, and the body is everything after the first blank line. The
//! quirks are locked in by the tests in this module so that any move towards
//! RFC compliance is an explicit change.

mod request;
mod method;
mod version;
mod error;

// Re-export public items
pub use request::{HttpRequest, Headers};
pub use method::Method;
pub use version::HttpVersion;
pub use error::Error;

// Re-export the parsing entry points
pub use request::{is_complete, parse_request, Framing, RequestFramer};
