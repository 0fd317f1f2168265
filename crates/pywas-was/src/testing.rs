//! Recording transport for unit tests.

use std::collections::VecDeque;

use pywas_core::{HeaderMap, Method};

use crate::error::TransportError;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Status(u16),
    Header(Vec<u8>, Vec<u8>),
    Length(u64),
    Write(Vec<u8>),
    End,
    Abort,
}

#[derive(Debug, Clone)]
pub struct MockExchange {
    pub uri: Vec<u8>,
    pub method: Method,
    pub script_name: Option<Vec<u8>>,
    pub path_info: Option<Vec<u8>>,
    pub query_string: Option<Vec<u8>>,
    pub remote_host: Option<Vec<u8>>,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Whether the body length is announced.
    pub length_known: bool,
}

impl MockExchange {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            uri: uri.as_bytes().to_vec(),
            method,
            script_name: None,
            path_info: None,
            query_string: None,
            remote_host: None,
            headers: HeaderMap::new(),
            body: None,
            length_known: true,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = Some(body.to_vec());
        self
    }
}

#[derive(Default)]
pub struct MockTransport {
    pub pending: VecDeque<MockExchange>,
    pub current: Option<MockExchange>,
    pub read_pos: usize,
    pub calls: Vec<Call>,
    /// Fail `accept` once the queue is empty instead of returning `None`.
    pub fail_accept: bool,
    /// Fail every `write`.
    pub fail_write: bool,
}

impl MockTransport {
    pub fn with(exchanges: impl IntoIterator<Item = MockExchange>) -> Self {
        Self {
            pending: exchanges.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Start an exchange directly, bypassing `accept`.
    pub fn begin(exchange: MockExchange) -> Self {
        Self {
            current: Some(exchange),
            ..Self::default()
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Write(data) => Some(data.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    fn exchange(&self) -> &MockExchange {
        self.current.as_ref().expect("no exchange in progress")
    }
}

impl Transport for MockTransport {
    fn accept(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        self.read_pos = 0;
        match self.pending.pop_front() {
            Some(exchange) => {
                let uri = exchange.uri.clone();
                self.current = Some(exchange);
                Ok(Some(uri))
            }
            None if self.fail_accept => Err(TransportError::Io(std::io::Error::other("control channel broken"))),
            None => Ok(None),
        }
    }

    fn method(&self) -> Method {
        self.exchange().method
    }

    fn script_name(&self) -> Option<&[u8]> {
        self.exchange().script_name.as_deref()
    }

    fn path_info(&self) -> Option<&[u8]> {
        self.exchange().path_info.as_deref()
    }

    fn query_string(&self) -> Option<&[u8]> {
        self.exchange().query_string.as_deref()
    }

    fn remote_host(&self) -> Option<&[u8]> {
        self.exchange().remote_host.as_deref()
    }

    fn headers(&self) -> &HeaderMap {
        &self.exchange().headers
    }

    fn has_body(&self) -> bool {
        self.exchange().body.is_some()
    }

    fn input_remaining(&mut self) -> Option<u64> {
        let exchange = self.exchange();
        match &exchange.body {
            Some(body) if exchange.length_known => Some((body.len() - self.read_pos) as u64),
            _ => None,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let pos = self.read_pos;
        let body = self.exchange().body.as_deref().unwrap_or_default();
        let n = buf.len().min(body.len() - pos);
        buf[..n].copy_from_slice(&body[pos..pos + n]);
        self.read_pos += n;
        Ok(n)
    }

    fn set_status(&mut self, status: u16) -> Result<(), TransportError> {
        self.calls.push(Call::Status(status));
        Ok(())
    }

    fn set_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), TransportError> {
        self.calls.push(Call::Header(name.to_vec(), value.to_vec()));
        Ok(())
    }

    fn set_length(&mut self, length: u64) -> Result<(), TransportError> {
        self.calls.push(Call::Length(length));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_write {
            return Err(TransportError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)));
        }
        self.calls.push(Call::Write(data.to_vec()));
        Ok(())
    }

    fn end(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::End);
        Ok(())
    }

    fn abort(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Abort);
        Ok(())
    }
}
