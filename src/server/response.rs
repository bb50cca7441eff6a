//! HTTP response building and serialization.

use std::collections::HashMap;
use std::io;
use serde::Serialize;

use crate::server::error::Error;

/// HTTP status codes with their standard reason phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Get the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> Self {
        status.as_u16()
    }
}

/// Response sink handed to handlers.
///
/// Handlers set the status, fill in headers and append to the body in any
/// order; nothing is sent until the server calls [`marshal`](Self::marshal).
///
/// The wire format is deliberately loose:
///
/// * the status line is `<version> <code><message>`. The message is written
///   exactly as set, with no separator added, so it carries its own leading
///   space (as the one set by [`write_status`](Self::write_status) does);
/// * each header is written as `<name>:<values joined by ",">` with no space
///   after the colon, the name as given, in unspecified order;
/// * no `Content-Length` is added. Every connection is closed after one
///   response, which is the only framing the peer gets.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    version: String,
    status: u16,
    message: Option<String>,
    headers: HashMap<String, Vec<String>>,
    body: Vec<u8>,
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status: StatusCode::Ok.as_u16(),
            message: None,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the body. Returns the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.body.extend_from_slice(data);
        data.len()
    }

    /// Set the status code. Can be called any number of times; the last
    /// call wins.
    pub fn write_header(&mut self, status: impl Into<u16>) {
        self.status = status.into();
    }

    /// Set the status code together with its reason phrase as the message,
    /// giving a status line such as `HTTP/1.1 404 Not Found`.
    pub fn write_status(&mut self, status: StatusCode) {
        self.status = status.as_u16();
        self.message = Some(format!(" {}", status.reason_phrase()));
    }

    /// Set or clear the text written right after the status code.
    pub fn set_message(&mut self, message: Option<String>) {
        self.message = message;
    }

    /// Set the protocol version written on the status line.
    pub fn version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Mutable access to the header mapping.
    pub fn header(&mut self) -> &mut HashMap<String, Vec<String>> {
        &mut self.headers
    }

    /// Append a value to a header.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.entry(name.into()).or_default().push(value.into());
    }

    /// Serialize `value` as the body and mark it as JSON.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<usize, Error> {
        let json = serde_json::to_vec(value)?;
        self.headers
            .insert("Content-Type".to_string(), vec!["application/json".to_string()]);
        Ok(self.write(&json))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Convert the response to wire bytes.
    pub fn marshal(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + self.body.len());

        // Status line
        bytes.extend_from_slice(self.version.as_bytes());
        bytes.push(b' ');
        bytes.extend_from_slice(self.status.to_string().as_bytes());
        if let Some(message) = &self.message {
            bytes.extend_from_slice(message.as_bytes());
        }
        bytes.extend_from_slice(b"\r\n");

        for (name, values) in &self.headers {
            bytes.extend_from_slice(name.as_bytes());
            bytes.push(b':');
            bytes.extend_from_slice(values.join(",").as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }

        // Add the empty line that separates headers from body
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&self.body);

        bytes
    }
}

impl io::Write for ResponseBuilder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(ResponseBuilder::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
