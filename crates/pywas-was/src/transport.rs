use pywas_core::{HeaderMap, Method};

use crate::error::TransportError;

/// One side of a request/response protocol connection, one exchange at a
/// time.
///
/// Request accessors describe the exchange most recently returned by
/// [`accept`](Transport::accept). Response calls must come in protocol
/// order: status, headers, optional length, body, then `end` or `abort`.
pub trait Transport {
    /// Block until the next exchange and return its raw request target.
    /// `Ok(None)` means the peer has closed the connection.
    fn accept(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    fn method(&self) -> Method;

    fn script_name(&self) -> Option<&[u8]>;

    fn path_info(&self) -> Option<&[u8]>;

    fn query_string(&self) -> Option<&[u8]>;

    fn remote_host(&self) -> Option<&[u8]>;

    fn headers(&self) -> &HeaderMap;

    fn has_body(&self) -> bool;

    /// Request body bytes not yet read, if the peer announced a length.
    fn input_remaining(&mut self) -> Option<u64>;

    /// Read request body bytes. `Ok(0)` only once the whole body was read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn set_status(&mut self, status: u16) -> Result<(), TransportError>;

    fn set_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), TransportError>;

    /// Announce the response body length. `0` means no body.
    fn set_length(&mut self, length: u64) -> Result<(), TransportError>;

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Finish the exchange normally.
    fn end(&mut self) -> Result<(), TransportError>;

    /// Finish the exchange, telling the peer the response is incomplete.
    fn abort(&mut self) -> Result<(), TransportError>;
}
