//! HTTP vocabulary: methods, schemes, status codes and header-token rules.

use std::fmt;

/// Request method as reported by the transport.
///
/// `Invalid` is the sentinel for anything the transport could not map to a
/// known verb; the driver answers such exchanges with `405` without invoking
/// the handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Head,
    Get,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Propfind,
    Proppatch,
    Mkcol,
    Copy,
    Move,
    Lock,
    Unlock,
    Patch,
    Report,
    Invalid,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Propfind => "PROPFIND",
            Method::Proppatch => "PROPPATCH",
            Method::Mkcol => "MKCOL",
            Method::Copy => "COPY",
            Method::Move => "MOVE",
            Method::Lock => "LOCK",
            Method::Unlock => "UNLOCK",
            Method::Patch => "PATCH",
            Method::Report => "REPORT",
            Method::Invalid => "INVALID",
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Method::Invalid)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL scheme of the original client request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status code 204, sent when an exchange ends before any status was set.
pub const STATUS_NO_CONTENT: u16 = 204;

/// Status code 405, sent by the driver for unknown methods.
pub const STATUS_METHOD_NOT_ALLOWED: u16 = 405;

/// Status code 500, sent by transports that abort before any status went out.
pub const STATUS_INTERNAL_SERVER_ERROR: u16 = 500;

/// Whether `status` lies in the standard three-digit status-code range.
///
/// `0` is the "not yet set" sentinel of [`Response`](crate::Response) and is
/// never valid.
pub fn is_valid_status(status: u16) -> bool {
    (100..=599).contains(&status)
}

// ── Header token rules ──────────────────────────────────────────────

/// Byte classes for header names: `token` from RFC 2616 §2.2
/// (any CHAR except CTLs or separators).
const fn header_name_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 33;
    while i < 127 {
        table[i] = true;
        i += 1;
    }
    let separators = b"()<>@,;:\\\"/[]?={} \t";
    let mut j = 0;
    while j < separators.len() {
        table[separators[j] as usize] = false;
        j += 1;
    }
    table
}

/// Byte classes for header values: `field-vchar` / SP / HTAB from
/// RFC 7230 §3.2, without obs-fold.
const fn header_value_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0x21;
    while i <= 0x7E {
        table[i] = true;
        i += 1;
    }
    let mut k = 0x80;
    while k <= 0xFF {
        table[k] = true;
        k += 1;
    }
    table[0x20] = true;
    table[0x09] = true;
    table
}

static HEADER_NAME_BYTES: [bool; 256] = header_name_table();
static HEADER_VALUE_BYTES: [bool; 256] = header_value_table();

pub fn is_valid_header_name(name: &[u8]) -> bool {
    !name.is_empty() && name.iter().all(|&b| HEADER_NAME_BYTES[b as usize])
}

pub fn is_valid_header_value(value: &[u8]) -> bool {
    value.iter().all(|&b| HEADER_VALUE_BYTES[b as usize])
}

/// Connection-scoped headers an application must not set.
///
/// `Content-Length` is listed because the transport owns framing; the
/// calling-convention layer lets it through and extracts it instead.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

pub fn is_hop_by_hop(name: &[u8]) -> bool {
    HOP_BY_HOP
        .iter()
        .any(|candidate| candidate.as_bytes().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Propfind.to_string(), "PROPFIND");
        assert!(!Method::Invalid.is_valid());
        assert!(Method::Put.is_valid());
    }

    #[test]
    fn scheme_default_is_http() {
        assert_eq!(Scheme::default(), Scheme::Http);
        assert_eq!(Scheme::Https.as_str(), "https");
    }

    #[test]
    fn status_range() {
        assert!(!is_valid_status(0));
        assert!(!is_valid_status(99));
        assert!(is_valid_status(100));
        assert!(is_valid_status(200));
        assert!(is_valid_status(599));
        assert!(!is_valid_status(600));
    }

    #[test]
    fn header_name_rejects_separators_and_controls() {
        assert!(is_valid_header_name(b"Content-Type"));
        assert!(is_valid_header_name(b"X-Custom_Header.1"));
        assert!(!is_valid_header_name(b""));
        assert!(!is_valid_header_name(b"Bad Name"));
        assert!(!is_valid_header_name(b"Bad:Name"));
        assert!(!is_valid_header_name(b"Bad\x7fName"));
        assert!(!is_valid_header_name(b"caf\xe9"));
    }

    #[test]
    fn header_value_allows_obs_text_but_not_newlines() {
        assert!(is_valid_header_value(b"text/html; charset=utf-8"));
        assert!(is_valid_header_value(b"tab\there"));
        assert!(is_valid_header_value(b"caf\xe9"));
        assert!(is_valid_header_value(b""));
        assert!(!is_valid_header_value(b"split\r\nInjected: yes"));
        assert!(!is_valid_header_value(b"nul\0"));
    }

    #[test]
    fn hop_by_hop_is_case_insensitive() {
        assert!(is_hop_by_hop(b"Connection"));
        assert!(is_hop_by_hop(b"TRANSFER-ENCODING"));
        assert!(is_hop_by_hop(b"content-length"));
        assert!(!is_hop_by_hop(b"Content-Type"));
        assert!(!is_hop_by_hop(b"X-Upgrade"));
    }
}
