//! HTTP request parsing and representation.

use std::borrow::Cow;
use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;
use serde::de::DeserializeOwned;

use crate::parser::error::Error;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// Header mapping: name as sent, to its whitespace-separated value tokens.
pub type Headers = HashMap<String, Vec<String>>;

/// Represents an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The request path, exactly as it appeared on the request line
    pub path: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers
    pub headers: Headers,
    /// The request body
    pub body: Vec<u8>,
    /// The declared `Content-Length`, or 0 when absent or unparsable
    pub content_length: usize,
    /// The value of the lowercase `host` header, if one was sent
    pub host: String,
    /// Dotted-decimal address of the peer, filled in by the server
    pub remote_addr: String,
    /// The raw request-target
    pub request_uri: String,
    /// Query parameters parsed from the path
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a new HTTP request with an empty body and no headers.
    pub fn new(method: Method, path: impl Into<String>, version: HttpVersion) -> Self {
        let path = path.into();

        // Parse query parameters from the path
        let query_params: HashMap<String, String> = path
            .split_once('?')
            .map(|(_, query)| query
                .split('&')
                .filter(|s| !s.is_empty())
                .map(|pair| {
                    if let Some((k, v)) = pair.split_once('=') {
                        (k.to_string(), v.to_string())
                    } else {
                        (pair.to_string(), String::new())
                    }
                })
                .collect())
            .unwrap_or_default();

        Self {
            method,
            request_uri: path.clone(),
            path,
            version,
            headers: Headers::new(),
            body: Vec::new(),
            content_length: 0,
            host: String::new(),
            remote_addr: String::new(),
            query_params,
        }
    }

    /// Get the value tokens of a header, ignoring the case of its name.
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                Some(v.as_slice())
            } else {
                None
            }
        })
    }

    /// Check if a header exists.
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Parse the request body as JSON.
    ///
    /// # Returns
    ///
    /// The parsed JSON value, or an error if the request is not marked as
    /// JSON or the body is not valid JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is_json() {
            return Err(Error::MissingHeader("Content-Type: application/json".to_string()));
        }

        let json = serde_json::from_slice(&self.body)?;
        Ok(json)
    }

    /// Check if the request has a JSON body.
    pub fn is_json(&self) -> bool {
        self.header("Content-Type")
            .and_then(|values| values.first())
            .is_some_and(|value| value.starts_with("application/json"))
    }

    /// Get a query parameter value.
    pub fn get_query_param(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }
}

/// Line iterator over raw bytes.
///
/// Yields each line without its `\n` terminator (and without a `\r` before
/// it) together with the offset just past the line. A final line with no
/// terminator is yielded as is.
struct Lines<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (&'a [u8], usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.input.len() {
            return None;
        }

        let rest = &self.input[self.pos..];
        let line = match rest.iter().position(|&b| b == b'\n') {
            Some(i) => {
                self.pos += i + 1;
                let line = &rest[..i];
                line.strip_suffix(b"\r").unwrap_or(line)
            }
            None => {
                self.pos = self.input.len();
                rest
            }
        };

        Some((line, self.pos))
    }
}

/// The request line and header block of a message.
struct Head<'a> {
    request_line: Cow<'a, str>,
    headers: Headers,
    content_length: usize,
    host: String,
    /// Offset of the first body byte, once the blank line has been seen.
    body_start: Option<usize>,
}

fn scan_head(input: &[u8]) -> Head<'_> {
    let mut lines = Lines::new(input);
    let request_line = lines
        .next()
        .map(|(line, _)| String::from_utf8_lossy(line))
        .unwrap_or_default();

    let mut head = Head {
        request_line,
        headers: Headers::new(),
        content_length: 0,
        host: String::new(),
        body_start: None,
    };

    for (line, end) in lines {
        // Empty line indicates the end of headers
        if line.is_empty() {
            head.body_start = Some(end);
            break;
        }

        let Some((name, values)) = split_header(line) else {
            continue;
        };

        if let Some(first) = values.first() {
            // Only the exact spellings are recognised.
            if name == "Content-Length" {
                head.content_length = parse_content_length(first);
            }
            if name == "host" {
                head.host = first.clone();
            }
        }

        head.headers.insert(name, values);
    }

    head
}

/// Split a header line into its name, minus one trailing `:`, and its value
/// tokens. `None` for a line that is only whitespace.
fn split_header(line: &[u8]) -> Option<(String, Vec<String>)> {
    let line = String::from_utf8_lossy(line);
    let mut tokens = line.split_whitespace();
    let name = tokens.next()?;
    let name = name.strip_suffix(':').unwrap_or(name).to_string();
    Some((name, tokens.map(str::to_string).collect()))
}

fn parse_content_length(value: &str) -> usize {
    value.parse().unwrap_or(0)
}

fn request_line_is_valid(line: &[u8]) -> bool {
    String::from_utf8_lossy(line).split_whitespace().count() == 3
}

/// Outcome of feeding more input to a [`RequestFramer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// More input is needed.
    Incomplete,
    /// The header block and the declared body have arrived.
    Complete,
    /// The request line is blank or does not have three tokens. Reading
    /// further cannot make the request parse.
    Malformed,
}

/// Tracks how much of a request has arrived as it is read in chunks.
///
/// Every call to [`advance`](Self::advance) takes the whole buffer read so
/// far, but only the lines that arrived since the previous call are
/// examined.
#[derive(Debug, Default)]
pub struct RequestFramer {
    /// Offset of the first line not examined yet.
    scanned: usize,
    request_line_seen: bool,
    content_length: usize,
    body_start: Option<usize>,
}

impl RequestFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leading bytes already examined.
    pub fn consumed(&self) -> usize {
        self.scanned
    }

    /// Examine `input`, which must extend the input of the previous call.
    pub fn advance(&mut self, input: &[u8]) -> Framing {
        while self.body_start.is_none() {
            let rest = &input[self.scanned..];
            let Some(i) = rest.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line = &rest[..i];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            // A bad request line is not consumed, so it is reported again.
            if !self.request_line_seen && !request_line_is_valid(line) {
                return Framing::Malformed;
            }
            self.scanned += i + 1;

            if !self.request_line_seen {
                self.request_line_seen = true;
            } else if line.is_empty() {
                self.body_start = Some(self.scanned);
            } else if let Some((name, values)) = split_header(line) {
                if let (Some(first), "Content-Length") = (values.first(), name.as_str()) {
                    self.content_length = parse_content_length(first);
                }
            }
        }

        match self.body_start {
            Some(start) if input.len() - start >= self.content_length => Framing::Complete,
            _ => Framing::Incomplete,
        }
    }
}

/// Check whether reading can stop for `input`.
///
/// True once the blank line ending the header block has arrived and at
/// least `Content-Length` body bytes follow it, or as soon as the first
/// line turns out not to be a usable request line.
pub fn is_complete(input: &[u8]) -> bool {
    RequestFramer::new().advance(input) != Framing::Incomplete
}

/// Parse an HTTP request from a byte slice.
///
/// # Arguments
///
/// * `input` - A byte slice containing the HTTP request to parse
///
/// # Returns
///
/// The parsed HTTP request, or an error if the request line is missing or
/// does not have exactly three fields
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    let head = scan_head(input);

    let request_line = head.request_line.trim();
    if request_line.is_empty() {
        return Err(Error::EmptyRequest);
    }

    // Split the request line into method, path, and version
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let &[method, path, version] = parts.as_slice() else {
        return Err(Error::MalformedRequestLine(request_line.to_string()));
    };

    let method = parse_infallible::<Method>(method);
    let version = parse_infallible::<HttpVersion>(version);

    let mut request = HttpRequest::new(method, path, version);
    request.headers = head.headers;
    request.content_length = head.content_length;
    request.host = head.host;
    // The declared length is not used to trim the body.
    if let Some(start) = head.body_start {
        request.body = input[start..].to_vec();
    }

    Ok(request)
}

fn parse_infallible<T: FromStr<Err = Infallible>>(token: &str) -> T {
    match token.parse() {
        Ok(value) => value,
        Err(never) => match never {},
    }
}
