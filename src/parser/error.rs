//! Error types for the HTTP parser.

use thiserror::Error;

/// Errors that can occur during HTTP request parsing.
#[derive(Debug, Error)]
pub enum Error {
    /// The request is empty or its request line is blank.
    #[error("Empty request")]
    EmptyRequest,

    /// The request line does not have exactly three whitespace-separated fields.
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// A required header is missing from the request.
    #[error("Required header is missing: {0}")]
    MissingHeader(String),

    /// Error parsing JSON.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}
