use crate::error::ResponseError;
use crate::header::{header_match, HeaderMap};

/// A mutable response accumulator.
///
/// `status == 0` means "not set yet". `Content-Length` is never stored as a
/// regular header: [`add_header`](Response::add_header) extracts it into
/// [`content_length`](Response::content_length).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    headers: HeaderMap,
    pub content_length: Option<u64>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn is_status_set(&self) -> bool {
        self.status != 0
    }

    /// Append a header, extracting `Content-Length` into its own field.
    pub fn add_header(
        &mut self,
        name: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), ResponseError> {
        let name = name.into();
        let value = value.into();
        if header_match(&name, b"Content-Length") {
            self.content_length = Some(parse_content_length(&value)?);
            return Ok(());
        }
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Parse a decimal `Content-Length` value.
pub fn parse_content_length(value: &[u8]) -> Result<u64, ResponseError> {
    let invalid = || ResponseError::InvalidContentLength(String::from_utf8_lossy(value).into_owned());
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(invalid)
}
