//! Terminal mode: feed two canned requests to the handler and print what it
//! answers. Status line and headers go to stderr, the body to stdout.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use pywas_core::config::ServerConfig;
use pywas_core::{
    BufferedInput, Method, OutputSink, Request, RequestHandler, Response, SinkError, Uri,
};

/// Writes a response in HTTP/1.1 wire shape.
pub struct PrintResponder<H: Write, B: Write> {
    head: H,
    body: B,
    committed: bool,
}

impl<H: Write, B: Write> PrintResponder<H, B> {
    pub fn new(head: H, body: B) -> Self {
        Self {
            head,
            body,
            committed: false,
        }
    }

    /// Terminate the body with a newline and flush both writers.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.committed {
            self.body.write_all(b"\n")?;
        }
        self.body.flush()?;
        self.head.flush()
    }

    pub fn into_parts(self) -> (H, B) {
        (self.head, self.body)
    }
}

impl<H: Write, B: Write> OutputSink for PrintResponder<H, B> {
    fn commit_headers(&mut self, response: Response) -> Result<(), SinkError> {
        if self.committed {
            return Err(SinkError::AlreadyCommitted);
        }
        if !pywas_core::http::is_valid_status(response.status) {
            return Err(SinkError::InvalidStatus(response.status));
        }
        self.committed = true;

        writeln!(self.head, "HTTP/1.1 {}", response.status)?;
        for header in response.headers().iter() {
            self.head.write_all(&header.name)?;
            self.head.write_all(b": ")?;
            self.head.write_all(&header.value)?;
            self.head.write_all(b"\n")?;
        }
        if let Some(length) = response.content_length {
            writeln!(self.head, "Content-Length: {length}")?;
        }
        writeln!(self.head)?;
        Ok(())
    }

    fn write_body(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if !self.committed {
            return Err(SinkError::NotCommitted);
        }
        self.body.write_all(data)?;
        Ok(())
    }

    fn headers_committed(&self) -> bool {
        self.committed
    }
}

/// `GET /`, then `PUT /` with a small JSON document.
pub fn canned_requests(server: &ServerConfig) -> Vec<Request> {
    let stamp = |mut request: Request| {
        request.remote_addr = b"127.0.0.1".to_vec();
        request.server_name = server.host_or_default().as_bytes().to_vec();
        request.server_port = server.port_or_default().to_string().into_bytes();
        request
    };

    let get = stamp(Request::new(Method::Get, Uri::parse("/")));

    let document = serde_json::json!({ "key": "value" }).to_string();
    let mut put = stamp(Request::new(Method::Put, Uri::parse("/")));
    put.headers.insert("Content-Type", "application/json");
    put.headers
        .insert("Content-Length", document.len().to_string());
    put.body = Some(Box::new(BufferedInput::new(document.into_bytes())));

    vec![get, put]
}

pub fn run<H: RequestHandler + ?Sized>(handler: &H, server: &ServerConfig) -> anyhow::Result<()> {
    for request in canned_requests(server) {
        let sink = Rc::new(RefCell::new(PrintResponder::new(io::stderr(), io::stdout())));
        exchange(handler, request, &sink)?;
    }
    Ok(())
}

fn exchange<H, W1, W2>(
    handler: &H,
    request: Request,
    sink: &Rc<RefCell<PrintResponder<W1, W2>>>,
) -> io::Result<()>
where
    H: RequestHandler + ?Sized,
    W1: Write + 'static,
    W2: Write + 'static,
{
    tracing::info!(
        method = %request.method,
        uri = %String::from_utf8_lossy(request.uri.as_bytes()),
        "interactive request"
    );
    if let Err(err) = handler.process(request, sink.clone()) {
        tracing::error!(error = %err, "request failed");
    }
    sink.borrow_mut().finish()
}
