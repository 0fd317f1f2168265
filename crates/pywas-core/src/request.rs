use std::fmt;

use crate::body::InputStream;
use crate::header::HeaderMap;
use crate::http::{Method, Scheme};

/// A request target, kept raw and split at the first `?` on access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uri {
    raw: Vec<u8>,
    query_start: Option<usize>,
}

impl Uri {
    /// Wrap a raw request target. The query is everything after the first `?`.
    pub fn parse(raw: impl Into<Vec<u8>>) -> Self {
        let raw = raw.into();
        let query_start = raw.iter().position(|&b| b == b'?');
        Self { raw, query_start }
    }

    /// Build a target from an already separated path and query.
    pub fn from_parts(path: &[u8], query: &[u8]) -> Self {
        let mut raw = path.to_vec();
        let query_start = if query.is_empty() {
            None
        } else {
            let start = raw.len();
            raw.push(b'?');
            raw.extend_from_slice(query);
            Some(start)
        };
        Self { raw, query_start }
    }

    pub fn path(&self) -> &[u8] {
        match self.query_start {
            Some(q) => &self.raw[..q],
            None => &self.raw,
        }
    }

    /// The query string without the leading `?`.
    pub fn query(&self) -> &[u8] {
        match self.query_start {
            Some(q) => &self.raw[q + 1..],
            None => &[],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// One incoming exchange, built by the driver and consumed once by a handler.
pub struct Request {
    pub remote_addr: Vec<u8>,
    /// Mount prefix of the application.
    pub script_name: Vec<u8>,
    pub server_name: Vec<u8>,
    pub server_port: Vec<u8>,
    /// e.g. `HTTP/1.1`
    pub protocol: String,
    pub scheme: Scheme,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Option<Box<dyn InputStream>>,
}

impl Request {
    /// A request with defaults for everything but method and target.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            remote_addr: Vec::new(),
            script_name: Vec::new(),
            server_name: b"localhost".to_vec(),
            server_port: b"80".to_vec(),
            protocol: "HTTP/1.1".to_string(),
            scheme: Scheme::Http,
            method,
            uri,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// First header value matching `name` (ASCII case-insensitive).
    pub fn find_header(&self, name: &str) -> Option<&[u8]> {
        self.headers.get(name)
    }

    /// Take ownership of the body stream, leaving `None` behind.
    pub fn take_body(&mut self) -> Option<Box<dyn InputStream>> {
        self.body.take()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &String::from_utf8_lossy(self.uri.as_bytes()))
            .field("scheme", &self.scheme)
            .field("headers", &self.headers.len())
            .field("body", &self.body.is_some())
            .finish()
    }
}
