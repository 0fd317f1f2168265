//! Request body streams.
//!
//! An [`InputStream`] is a pull-based, single-pass byte source. `read`
//! returns `0` only at end of stream. The declared length is advisory: it is
//! `None` for sources whose size is not known up front.

use bytes::{Buf, Bytes};

use crate::error::InputError;

/// Read buffer size used when a caller asks for "everything".
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// A blocking, owned source of request body bytes.
pub trait InputStream {
    /// Read up to `buf.len()` bytes. Returns `0` only at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, InputError>;

    /// Total body length, if the source declared one.
    fn content_length(&self) -> Option<u64>;

    /// Read until end of stream.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, InputError> {
        let mut chunk = [0u8; DEFAULT_CHUNK_SIZE];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }
}

/// The body of a request that has none.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyInput;

impl InputStream for EmptyInput {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, InputError> {
        Ok(0)
    }

    fn content_length(&self) -> Option<u64> {
        Some(0)
    }
}

/// A body held entirely in memory.
#[derive(Debug, Clone)]
pub struct BufferedInput {
    data: Bytes,
    length: u64,
}

impl BufferedInput {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let length = data.len() as u64;
        Self { data, length }
    }
}

impl InputStream for BufferedInput {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, InputError> {
        let n = buf.len().min(self.data.remaining());
        self.data.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }
}
