//! HTTP protocol versions.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// The protocol version declared on the request line.
///
/// Responses echo the client's version, so any token that is not a known
/// HTTP/1.x version is preserved byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
    Other(String),
}

impl FromStr for HttpVersion {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "HTTP/1.0" => HttpVersion::Http10,
            "HTTP/1.1" => HttpVersion::Http11,
            other => HttpVersion::Other(other.to_string()),
        })
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::Http10 => write!(f, "HTTP/1.0"),
            HttpVersion::Http11 => write!(f, "HTTP/1.1"),
            HttpVersion::Other(token) => f.write_str(token),
        }
    }
}
