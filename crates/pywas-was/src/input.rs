use std::cell::RefCell;
use std::rc::Rc;

use pywas_core::{InputError, InputStream};

use crate::transport::Transport;

/// The request body of the current exchange, read through the transport.
pub struct WasInput<T> {
    transport: Rc<RefCell<T>>,
    length: Option<u64>,
}

impl<T: Transport> WasInput<T> {
    pub fn new(transport: Rc<RefCell<T>>, length: Option<u64>) -> Self {
        Self { transport, length }
    }
}

impl<T: Transport> InputStream for WasInput<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, InputError> {
        self.transport
            .borrow_mut()
            .read(buf)
            .map_err(|e| InputError::Transport(e.to_string()))
    }

    fn content_length(&self) -> Option<u64> {
        self.length
    }
}
