//! The accept loop.
//!
//! One exchange at a time: accept, build a [`Request`], hand it to the
//! handler with a [`WasResponder`], then `end` or `abort`. Nothing that
//! goes wrong inside an exchange stops the loop; only the transport
//! refusing to accept does.

use std::cell::RefCell;
use std::rc::Rc;

use pywas_core::config::ServerConfig;
use pywas_core::http::STATUS_METHOD_NOT_ALLOWED;
use pywas_core::{Header, Method, Request, RequestHandler, Scheme, SharedSink, Uri};

use crate::input::WasInput;
use crate::sink::WasResponder;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed,
    MethodNotAllowed,
    Aborted,
}

pub struct Driver<T> {
    transport: Rc<RefCell<T>>,
    server: ServerConfig,
}

impl<T: Transport + 'static> Driver<T> {
    pub fn new(transport: T, server: ServerConfig) -> Self {
        Self {
            transport: Rc::new(RefCell::new(transport)),
            server,
        }
    }

    pub fn transport(&self) -> &Rc<RefCell<T>> {
        &self.transport
    }

    /// Serve exchanges until the peer goes away. Returns how many were
    /// accepted.
    pub fn run<H: RequestHandler + ?Sized>(&self, handler: &H) -> usize {
        let mut accepted = 0;
        loop {
            let next = self.transport.borrow_mut().accept();
            match next {
                Ok(Some(uri)) => {
                    accepted += 1;
                    self.process_exchange(handler, uri);
                }
                Ok(None) => {
                    tracing::info!(accepted, "connection closed by peer");
                    break;
                }
                Err(err) => {
                    tracing::error!(error = %err, accepted, "accept failed; shutting down");
                    break;
                }
            }
        }
        accepted
    }

    pub fn process_exchange<H: RequestHandler + ?Sized>(&self, handler: &H, uri: Vec<u8>) -> ExchangeOutcome {
        let method = self.transport.borrow().method();
        tracing::debug!(%method, uri = %String::from_utf8_lossy(&uri), "exchange accepted");

        if !method.is_valid() {
            tracing::warn!("invalid request method; answering 405");
            let mut transport = self.transport.borrow_mut();
            if let Err(err) = transport.set_status(STATUS_METHOD_NOT_ALLOWED) {
                tracing::error!(error = %err, "set_status failed");
            }
            if let Err(err) = transport.end() {
                tracing::error!(error = %err, "end failed");
            }
            return ExchangeOutcome::MethodNotAllowed;
        }

        let request = match self.build_request(method, &uri) {
            Some(request) => request,
            None => {
                tracing::warn!("request body of unknown length; chunked transfer is not supported");
                self.abort();
                return ExchangeOutcome::Aborted;
            }
        };

        let responder = Rc::new(RefCell::new(WasResponder::new(self.transport.clone())));
        let sink: SharedSink = responder.clone();
        match handler.process(request, sink) {
            Ok(()) => {
                if let Some(missing) = responder.borrow().content_length_left().filter(|&n| n > 0) {
                    tracing::warn!(missing, "response body shorter than its Content-Length");
                }
                if let Err(err) = self.transport.borrow_mut().end() {
                    tracing::error!(error = %err, "end failed");
                }
                ExchangeOutcome::Completed
            }
            Err(err) => {
                tracing::error!(error = %err, "exchange failed; aborting");
                self.abort();
                ExchangeOutcome::Aborted
            }
        }
    }

    /// `None` when the request has a body whose length is unknown.
    fn build_request(&self, method: Method, uri: &[u8]) -> Option<Request> {
        let mut transport = self.transport.borrow_mut();

        let raw = Uri::parse(uri);
        let path = transport.path_info().unwrap_or(raw.path());
        let query = transport.query_string().unwrap_or(raw.query());
        let mut request = Request::new(method, Uri::from_parts(path, query));

        request.script_name = transport.script_name().unwrap_or_default().to_vec();
        request.remote_addr = transport.remote_host().unwrap_or_default().to_vec();
        request.server_name = self.server.host_or_default().as_bytes().to_vec();
        request.server_port = self.server.port_or_default().to_string().into_bytes();

        for header in transport.headers().iter() {
            if is_https_indicator(header) {
                request.scheme = Scheme::Https;
            }
            if header.is("Host") {
                let (name, port) = split_host(&header.value);
                request.server_name = name.to_vec();
                if let Some(port) = port {
                    request.server_port = port.to_vec();
                }
            }
            request.headers.insert(header.name.clone(), header.value.clone());
        }

        if transport.has_body() {
            let remaining = transport.input_remaining()?;
            request.body = Some(Box::new(WasInput::new(self.transport.clone(), Some(remaining))));
        }
        Some(request)
    }

    fn abort(&self) {
        if let Err(err) = self.transport.borrow_mut().abort() {
            tracing::error!(error = %err, "abort failed");
        }
    }
}

/// Headers a TLS-terminating front end uses to mark the original request
/// as HTTPS.
fn is_https_indicator(header: &Header) -> bool {
    (header.is("X-CM4all-HTTPS") && header.value.eq_ignore_ascii_case(b"on"))
        || (header.is("X-Forwarded-Proto") && header.value.eq_ignore_ascii_case(b"https"))
}

/// `example.com:8080` → (`example.com`, `8080`). Bracketed IPv6 literals
/// keep their colons.
fn split_host(value: &[u8]) -> (&[u8], Option<&[u8]>) {
    let split_at = if value.starts_with(b"[") {
        value
            .iter()
            .position(|&b| b == b']')
            .and_then(|end| (value.get(end + 1) == Some(&b':')).then_some(end + 1))
    } else {
        value.iter().position(|&b| b == b':')
    };
    match split_at {
        Some(i) if i + 1 < value.len() => (&value[..i], Some(&value[i + 1..])),
        Some(i) => (&value[..i], None),
        None => (value, None),
    }
}
