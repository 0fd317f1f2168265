//! Response sink that forwards a committed response onto a [`Transport`].

use std::cell::RefCell;
use std::rc::Rc;

use pywas_core::http::{is_hop_by_hop, is_valid_status};
use pywas_core::{OutputSink, Response, SinkError};

use crate::error::TransportError;
use crate::transport::Transport;

/// One per exchange.
pub struct WasResponder<T> {
    transport: Rc<RefCell<T>>,
    committed: bool,
    content_length_left: Option<u64>,
}

impl<T: Transport> WasResponder<T> {
    pub fn new(transport: Rc<RefCell<T>>) -> Self {
        Self {
            transport,
            committed: false,
            content_length_left: None,
        }
    }

    /// Bytes still owed under the announced `Content-Length`.
    pub fn content_length_left(&self) -> Option<u64> {
        self.content_length_left
    }
}

fn transport_error(err: TransportError) -> SinkError {
    SinkError::Transport(err.to_string())
}

fn is_chunked(response: &Response) -> bool {
    response.headers().get_all("Transfer-Encoding").iter().any(|value| {
        value
            .split(|&b| b == b',')
            .any(|coding| coding.trim_ascii().eq_ignore_ascii_case(b"chunked"))
    })
}

impl<T: Transport> OutputSink for WasResponder<T> {
    fn commit_headers(&mut self, response: Response) -> Result<(), SinkError> {
        if self.committed {
            return Err(SinkError::AlreadyCommitted);
        }
        if !is_valid_status(response.status) {
            return Err(SinkError::InvalidStatus(response.status));
        }
        if is_chunked(&response) {
            return Err(SinkError::ChunkedTransfer);
        }

        let mut transport = self.transport.borrow_mut();
        transport.set_status(response.status).map_err(transport_error)?;
        for header in response.headers().iter() {
            if is_hop_by_hop(&header.name) {
                tracing::debug!(name = %String::from_utf8_lossy(&header.name), "dropping hop-by-hop response header");
                continue;
            }
            transport
                .set_header(&header.name, &header.value)
                .map_err(transport_error)?;
        }
        if let Some(length) = response.content_length {
            transport.set_length(length).map_err(transport_error)?;
        }

        self.content_length_left = response.content_length;
        self.committed = true;
        Ok(())
    }

    fn write_body(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if !self.committed {
            return Err(SinkError::NotCommitted);
        }
        let Some(left) = self.content_length_left else {
            return self.transport.borrow_mut().write(data).map_err(transport_error);
        };

        let attempted = data.len() as u64;
        let n = attempted.min(left);
        if n > 0 {
            self.transport
                .borrow_mut()
                .write(&data[..n as usize])
                .map_err(transport_error)?;
        }
        self.content_length_left = Some(left - n);
        if attempted > left {
            return Err(SinkError::Overflow {
                attempted,
                remaining: left,
                excess: attempted - left,
            });
        }
        Ok(())
    }

    fn headers_committed(&self) -> bool {
        self.committed
    }
}
